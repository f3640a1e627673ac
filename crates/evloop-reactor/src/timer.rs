//! Timer queue.
//!
//! Timers live in a min-heap keyed by absolute deadline. Two timers with
//! the same deadline fire newest-first, and a repeating timer that is
//! rescheduled mid-sweep lands behind already-due peers, so a callback
//! that fires every cycle can never starve the rest of the queue.
//!
//! Removal is lazy: cancelling marks the id and the heap entry is skipped
//! when it surfaces. A repeating timer cancelled from inside its own
//! callback is simply not rescheduled.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use crate::event_loop::LoopHandle;

/// Identifies a scheduled timer. Ids start at 1 and are never reused
/// while the timer is alive; 0 is not a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, then the id becomes invalid.
    OneShot,
    /// Fires every interval until removed. The next deadline is measured
    /// from the moment the callback started, not from the previous
    /// deadline, so intervals never compress under load.
    Repeating,
}

/// Timer callback. Runs on the reactor thread that owns the timer.
pub type TimerProc = Box<dyn FnMut(&LoopHandle, TimerId) + Send>;

pub(crate) struct TimerEntry {
    pub(crate) id: TimerId,
    pub(crate) kind: TimerKind,
    pub(crate) interval: Duration,
    pub(crate) callback: TimerProc,
    deadline: Instant,
    seq: u64,
}

struct HeapSlot(TimerEntry);

impl PartialEq for HeapSlot {
    fn eq(&self, other: &HeapSlot) -> bool {
        self.0.deadline == other.0.deadline && self.0.seq == other.0.seq
    }
}

impl Eq for HeapSlot {}

impl PartialOrd for HeapSlot {
    fn partial_cmp(&self, other: &HeapSlot) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapSlot {
    // BinaryHeap pops the greatest element, so "greatest" means earliest
    // deadline, ties broken toward the higher (newer) sequence number.
    fn cmp(&self, other: &HeapSlot) -> Ordering {
        other
            .0
            .deadline
            .cmp(&self.0.deadline)
            .then(self.0.seq.cmp(&other.0.seq))
    }
}

pub(crate) struct TimerQueue {
    heap: BinaryHeap<HeapSlot>,
    alive: HashSet<u64>,
    cancelled: HashSet<u64>,
    next_id: u64,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn new() -> TimerQueue {
        TimerQueue {
            heap: BinaryHeap::new(),
            alive: HashSet::new(),
            cancelled: HashSet::new(),
            next_id: 0,
            next_seq: 0,
        }
    }

    /// Schedule a timer whose first deadline is `now + interval`.
    pub(crate) fn add(
        &mut self,
        interval: Duration,
        kind: TimerKind,
        callback: TimerProc,
        now: Instant,
    ) -> TimerId {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = TimerId(self.next_id);
        self.alive.insert(id.raw());
        self.next_seq += 1;
        self.heap.push(HeapSlot(TimerEntry {
            id,
            kind,
            interval,
            callback,
            deadline: now + interval,
            seq: self.next_seq,
        }));
        id
    }

    /// Cancel a timer. Returns false when the id is unknown, already
    /// fired (one-shot) or already cancelled.
    pub(crate) fn remove(&mut self, id: TimerId) -> bool {
        if !self.alive.remove(&id.raw()) {
            return false;
        }
        self.cancelled.insert(id.raw());
        true
    }

    /// Move every timer due at `now` into `out`, earliest first. One-shot
    /// ids become invalid the moment they leave the queue.
    pub(crate) fn pop_due(&mut self, now: Instant, out: &mut Vec<TimerEntry>) {
        while let Some(top) = self.heap.peek() {
            if top.0.deadline > now {
                break;
            }
            let Some(slot) = self.heap.pop() else { break };
            let entry = slot.0;
            if self.cancelled.remove(&entry.id.raw()) {
                continue;
            }
            if entry.kind == TimerKind::OneShot {
                self.alive.remove(&entry.id.raw());
            }
            out.push(entry);
        }
    }

    /// Put a repeating timer back after its callback ran. `fire_time` is
    /// when the callback started. Returns false when the timer was
    /// cancelled mid-fire, in which case the entry is dropped.
    pub(crate) fn reinsert(&mut self, mut entry: TimerEntry, fire_time: Instant) -> bool {
        if self.cancelled.remove(&entry.id.raw()) {
            return false;
        }
        entry.deadline = fire_time + entry.interval;
        self.next_seq += 1;
        entry.seq = self.next_seq;
        self.heap.push(HeapSlot(entry));
        true
    }

    /// Deadline of the soonest timer, cancelled entries included. A stale
    /// head only causes one early wakeup, never a missed one.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(|slot| slot.0.deadline)
    }

    pub(crate) fn len(&self) -> usize {
        self.alive.len()
    }

    pub(crate) fn clear(&mut self) {
        self.heap.clear();
        self.alive.clear();
        self.cancelled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> TimerProc {
        Box::new(|_handle: &LoopHandle, _id: TimerId| {})
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_fires_in_deadline_order() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let late = q.add(ms(300), TimerKind::OneShot, noop(), now);
        let early = q.add(ms(100), TimerKind::OneShot, noop(), now);
        let mid = q.add(ms(200), TimerKind::OneShot, noop(), now);

        let mut due = Vec::new();
        q.pop_due(now + ms(400), &mut due);
        let order: Vec<_> = due.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![early, mid, late]);
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.add(ms(100), TimerKind::OneShot, noop(), now);

        let mut due = Vec::new();
        q.pop_due(now + ms(99), &mut due);
        assert!(due.is_empty());
        q.pop_due(now + ms(100), &mut due);
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn test_equal_deadlines_newest_first() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let first = q.add(ms(100), TimerKind::OneShot, noop(), now);
        let second = q.add(ms(100), TimerKind::OneShot, noop(), now);
        let third = q.add(ms(100), TimerKind::OneShot, noop(), now);

        let mut due = Vec::new();
        q.pop_due(now + ms(100), &mut due);
        let order: Vec<_> = due.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![third, second, first]);
    }

    #[test]
    fn test_one_shot_id_invalid_after_fire() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.add(ms(10), TimerKind::OneShot, noop(), now);

        let mut due = Vec::new();
        q.pop_due(now + ms(10), &mut due);
        assert_eq!(due.len(), 1);
        assert!(!q.remove(id));
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn test_remove_queued_timer() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.add(ms(10), TimerKind::OneShot, noop(), now);

        assert!(q.remove(id));
        assert!(!q.remove(id));

        let mut due = Vec::new();
        q.pop_due(now + ms(20), &mut due);
        assert!(due.is_empty());
    }

    #[test]
    fn test_repeating_reschedules_from_fire_time() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.add(ms(100), TimerKind::Repeating, noop(), now);

        let mut due = Vec::new();
        // The sweep happens 50ms late. The next deadline must be measured
        // from the sweep, not from the original deadline.
        let fire_time = now + ms(150);
        q.pop_due(fire_time, &mut due);
        assert_eq!(due.len(), 1);
        let entry = due.pop().unwrap();
        assert!(q.reinsert(entry, fire_time));

        assert_eq!(q.next_deadline(), Some(fire_time + ms(100)));
        assert!(q.remove(id));
    }

    #[test]
    fn test_cancel_mid_fire_suppresses_reschedule() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.add(ms(10), TimerKind::Repeating, noop(), now);

        let mut due = Vec::new();
        let fire_time = now + ms(10);
        q.pop_due(fire_time, &mut due);
        let entry = due.pop().unwrap();

        // Cancelled between pop and reinsert, as a callback would do.
        assert!(q.remove(id));
        assert!(!q.reinsert(entry, fire_time));
        assert_eq!(q.len(), 0);

        q.pop_due(fire_time + ms(100), &mut due);
        assert!(due.is_empty());
    }

    #[test]
    fn test_reschedule_ties_behave_like_fresh_inserts() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let fast = q.add(ms(20), TimerKind::Repeating, noop(), now);
        let slow = q.add(ms(40), TimerKind::OneShot, noop(), now);

        let mut due = Vec::new();
        q.pop_due(now + ms(20), &mut due);
        assert_eq!(due.len(), 1);
        let entry = due.pop().unwrap();
        assert_eq!(entry.id, fast);
        // Rescheduled to now+40, colliding with the one-shot. Reinsertion
        // counts as the newer entry, same as a fresh add would.
        q.reinsert(entry, now + ms(20));

        q.pop_due(now + ms(40), &mut due);
        let order: Vec<_> = due.iter().map(|e| e.id).collect();
        assert_eq!(order, vec![fast, slow]);
    }

    #[test]
    fn test_id_wrap_skips_zero() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        q.next_id = u64::MAX - 1;

        let a = q.add(ms(1), TimerKind::OneShot, noop(), now);
        let b = q.add(ms(1), TimerKind::OneShot, noop(), now);
        let c = q.add(ms(1), TimerKind::OneShot, noop(), now);
        assert_eq!(a.raw(), u64::MAX);
        assert_eq!(b.raw(), 1);
        assert_eq!(c.raw(), 2);
    }

    #[test]
    fn test_next_deadline_tracks_head() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        assert!(q.next_deadline().is_none());

        q.add(ms(500), TimerKind::OneShot, noop(), now);
        q.add(ms(100), TimerKind::OneShot, noop(), now);
        assert_eq!(q.next_deadline(), Some(now + ms(100)));
    }

    #[test]
    fn test_clear_drops_everything() {
        let now = Instant::now();
        let mut q = TimerQueue::new();
        let id = q.add(ms(10), TimerKind::Repeating, noop(), now);
        q.clear();

        assert_eq!(q.len(), 0);
        assert!(!q.remove(id));
        let mut due = Vec::new();
        q.pop_due(now + ms(100), &mut due);
        assert!(due.is_empty());
    }
}
