//! Deferred one-shot jobs.
//!
//! A job runs once on the reactor thread, after I/O and timer dispatch of
//! the cycle it was picked up in. Jobs submitted together run in
//! submission order.

use std::collections::VecDeque;

use crate::event_loop::LoopHandle;

/// Job callback. Runs exactly once on the owning reactor thread.
pub type JobProc = Box<dyn FnOnce(&LoopHandle) + Send>;

#[derive(Default)]
pub(crate) struct JobQueue {
    jobs: VecDeque<JobProc>,
}

impl JobQueue {
    pub(crate) fn new() -> JobQueue {
        JobQueue { jobs: VecDeque::new() }
    }

    pub(crate) fn push(&mut self, job: JobProc) {
        self.jobs.push_back(job);
    }

    /// Move every queued job into `out`, oldest first. Jobs queued while
    /// the batch runs wait for the next cycle.
    pub(crate) fn drain_into(&mut self, out: &mut Vec<JobProc>) {
        out.extend(self.jobs.drain(..));
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn clear(&mut self) {
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_drain_moves_all_jobs() {
        let mut q = JobQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let seen = seen.clone();
            q.push(Box::new(move |_| seen.lock().unwrap().push(i)));
        }
        assert_eq!(q.len(), 3);

        let mut batch = Vec::new();
        q.drain_into(&mut batch);
        assert_eq!(q.len(), 0);
        assert_eq!(batch.len(), 3);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_clear_discards_jobs() {
        let mut q = JobQueue::new();
        q.push(Box::new(|_| {}));
        q.push(Box::new(|_| {}));
        q.clear();
        assert_eq!(q.len(), 0);
    }
}
