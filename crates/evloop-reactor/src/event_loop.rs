//! The reactor: one thread multiplexing sockets, timers and jobs.
//!
//! Each `EventLoop` owns a dedicated worker thread running a three-phase
//! cycle:
//!
//! ```text
//!   +-> apply queued (de)registrations, snapshot the registry
//!   |   block in the backend up to the poll timeout
//!   |   dispatch readiness callbacks
//!   |   fire due timers
//!   |   run deferred jobs
//!   +-- check the abort flag
//! ```
//!
//! All mutation funnels through a [`LoopHandle`], which is cheap to clone
//! and safe to use from any thread, including from callbacks running on
//! the loop itself. No lock is ever held while the backend blocks or
//! while a callback runs, which is what makes that reentrancy safe.
//!
//! The poll timeout is the time to the nearest timer deadline, capped at
//! the configured ceiling so cross-thread submissions are picked up
//! promptly even when no timer is near.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use evloop_core::{edebug, eerror, einfo, etrace, ewarn};
use evloop_core::{Channel, ChannelRegistry, FdMask};

use crate::backend::{create_backend, IoEvent, MultiplexBackend};
use crate::config::ReactorConfig;
use crate::error::{ReactorError, ReactorResult};
use crate::job::{JobProc, JobQueue};
use crate::timer::{TimerEntry, TimerId, TimerKind, TimerQueue};

static LOOP_SEQ: AtomicUsize = AtomicUsize::new(1);

/// Registration change queued for the worker. Holding the channel here
/// keeps the descriptor open until the backend has forgotten it, so a
/// just-removed fd cannot be reused while still registered.
enum InterestOp {
    Add(Arc<Channel>),
    Remove(Arc<Channel>),
    Update(Arc<Channel>),
}

struct FdState {
    registry: ChannelRegistry,
    pending: Vec<InterestOp>,
}

struct LoopShared {
    id: usize,
    name: String,
    poll_ceiling: Duration,
    fds: Mutex<FdState>,
    timers: Mutex<TimerQueue>,
    jobs: Mutex<JobQueue>,
    abort: AtomicBool,
}

/// Cloneable reference to a running loop. Every operation is thread-safe
/// and may also be called from callbacks on the loop's own thread.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<LoopShared>,
}

impl LoopHandle {
    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Register a channel. Takes effect before the next blocking wait.
    /// Fails if a channel with the same descriptor is already registered.
    pub fn add_channel(&self, channel: Arc<Channel>) -> ReactorResult<()> {
        let mut fds = self.shared.fds.lock().unwrap();
        fds.registry.add(channel.clone())?;
        edebug!(
            "{}: fd {} registered with {:?}",
            self.name(),
            channel.fd(),
            channel.mask()
        );
        fds.pending.push(InterestOp::Add(channel));
        Ok(())
    }

    /// Deregister a channel. Returns false when it was not registered
    /// here. The descriptor stays open until the worker has retracted it
    /// from the backend.
    pub fn remove_channel(&self, channel: &Arc<Channel>) -> bool {
        let mut fds = self.shared.fds.lock().unwrap();
        if fds.registry.remove(channel.fd()).is_none() {
            return false;
        }
        edebug!("{}: fd {} deregistered", self.name(), channel.fd());
        fds.pending.push(InterestOp::Remove(channel.clone()));
        true
    }

    /// Re-sync the backend with the channel's current interest mask.
    /// Returns false when the channel is not registered here.
    pub fn update_channel(&self, channel: &Arc<Channel>) -> bool {
        let mut fds = self.shared.fds.lock().unwrap();
        if !fds.registry.contains(channel.fd()) {
            return false;
        }
        fds.pending.push(InterestOp::Update(channel.clone()));
        true
    }

    /// Number of channels currently registered.
    pub fn channel_count(&self) -> usize {
        self.shared.fds.lock().unwrap().registry.len()
    }

    /// Schedule a timer. The callback runs on this loop's thread.
    pub fn add_timer(
        &self,
        interval: Duration,
        kind: TimerKind,
        callback: impl FnMut(&LoopHandle, TimerId) + Send + 'static,
    ) -> TimerId {
        let id = self.shared.timers.lock().unwrap().add(
            interval,
            kind,
            Box::new(callback),
            Instant::now(),
        );
        etrace!("{}: {} scheduled every {:?} ({:?})", self.name(), id, interval, kind);
        id
    }

    /// Cancel a timer. Returns false for ids that are unknown, already
    /// fired (one-shot) or already cancelled. A repeating timer removed
    /// from inside its own callback reports true and never fires again.
    pub fn remove_timer(&self, id: TimerId) -> bool {
        self.shared.timers.lock().unwrap().remove(id)
    }

    /// Queue a job to run once on this loop's thread, after I/O and timer
    /// dispatch. Jobs run in submission order.
    pub fn add_job(&self, job: impl FnOnce(&LoopHandle) + Send + 'static) {
        self.shared.jobs.lock().unwrap().push(Box::new(job));
    }

    fn aborted(&self) -> bool {
        self.shared.abort.load(Ordering::Acquire)
    }
}

/// A reactor thread and the handle to it. Dropping joins the thread.
pub struct EventLoop {
    handle: LoopHandle,
    thread: Option<JoinHandle<()>>,
}

impl EventLoop {
    /// Validate `config`, create the backend and spawn the worker thread.
    pub fn new(config: ReactorConfig) -> ReactorResult<EventLoop> {
        config.validate()?;
        let backend = create_backend(config.backend)?;

        let id = LOOP_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{}", config.name_prefix, id);
        let shared = Arc::new(LoopShared {
            id,
            name: name.clone(),
            poll_ceiling: config.poll_ceiling,
            fds: Mutex::new(FdState {
                registry: ChannelRegistry::new(),
                pending: Vec::new(),
            }),
            timers: Mutex::new(TimerQueue::new()),
            jobs: Mutex::new(JobQueue::new()),
            abort: AtomicBool::new(false),
        });
        let handle = LoopHandle { shared };

        let worker = handle.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker_main(worker, backend))
            .map_err(ReactorError::Spawn)?;

        einfo!("{}: started ({} backend)", name, config.backend);
        Ok(EventLoop { handle, thread: Some(thread) })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> usize {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn add_channel(&self, channel: Arc<Channel>) -> ReactorResult<()> {
        self.handle.add_channel(channel)
    }

    pub fn remove_channel(&self, channel: &Arc<Channel>) -> bool {
        self.handle.remove_channel(channel)
    }

    pub fn update_channel(&self, channel: &Arc<Channel>) -> bool {
        self.handle.update_channel(channel)
    }

    pub fn channel_count(&self) -> usize {
        self.handle.channel_count()
    }

    pub fn add_timer(
        &self,
        interval: Duration,
        kind: TimerKind,
        callback: impl FnMut(&LoopHandle, TimerId) + Send + 'static,
    ) -> TimerId {
        self.handle.add_timer(interval, kind, callback)
    }

    pub fn remove_timer(&self, id: TimerId) -> bool {
        self.handle.remove_timer(id)
    }

    pub fn add_job(&self, job: impl FnOnce(&LoopHandle) + Send + 'static) {
        self.handle.add_job(job)
    }

    /// Stop the worker and join it. The current cycle finishes first;
    /// timers and jobs still queued at that point are dropped unrun.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        self.handle.shared.abort.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                eerror!("{}: reactor thread panicked", self.handle.name());
            }
            edebug!("{}: stopped", self.handle.name());
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_main(handle: LoopHandle, mut backend: Box<dyn MultiplexBackend>) {
    edebug!("{}: reactor thread running", handle.name());
    let mut events: Vec<IoEvent> = Vec::with_capacity(64);
    let mut due: Vec<TimerEntry> = Vec::new();
    let mut batch: Vec<JobProc> = Vec::new();

    while !handle.aborted() {
        let timeout = next_timeout(&handle);
        fd_cycle(&handle, backend.as_mut(), timeout, &mut events);
        timer_cycle(&handle, &mut due);
        job_cycle(&handle, &mut batch);
    }

    let timers_left = {
        let mut timers = handle.shared.timers.lock().unwrap();
        let n = timers.len();
        timers.clear();
        n
    };
    let jobs_left = {
        let mut jobs = handle.shared.jobs.lock().unwrap();
        let n = jobs.len();
        jobs.clear();
        n
    };
    if timers_left > 0 || jobs_left > 0 {
        edebug!(
            "{}: dropped {} timers and {} jobs at shutdown",
            handle.name(),
            timers_left,
            jobs_left
        );
    }
    edebug!("{}: reactor thread exiting", handle.name());
}

/// Time to the nearest timer deadline, capped at the poll ceiling.
fn next_timeout(handle: &LoopHandle) -> Duration {
    let ceiling = handle.shared.poll_ceiling;
    match handle.shared.timers.lock().unwrap().next_deadline() {
        Some(deadline) => {
            let now = Instant::now();
            if deadline <= now {
                Duration::ZERO
            } else {
                (deadline - now).min(ceiling)
            }
        }
        None => ceiling,
    }
}

fn fd_cycle(
    handle: &LoopHandle,
    backend: &mut dyn MultiplexBackend,
    timeout: Duration,
    events: &mut Vec<IoEvent>,
) {
    events.clear();

    // Apply queued registration changes and snapshot the registry, then
    // release the lock before blocking.
    let snapshot = {
        let mut fds = handle.shared.fds.lock().unwrap();
        let FdState { registry, pending } = &mut *fds;
        for op in pending.drain(..) {
            apply_interest(handle, backend, op);
        }
        if registry.is_empty() {
            None
        } else {
            Some(registry.clone())
        }
    };

    let Some(registry) = snapshot else {
        // Nothing to watch. Sleep out the slice instead of spinning.
        thread::sleep(timeout);
        return;
    };

    if let Err(e) = backend.poll(&registry, timeout, events) {
        ewarn!("{}: poll failed: {}", handle.name(), e);
        thread::sleep(timeout);
        return;
    }

    for event in events.iter() {
        dispatch_event(handle, event);
    }
}

fn apply_interest(handle: &LoopHandle, backend: &mut dyn MultiplexBackend, op: InterestOp) {
    match op {
        InterestOp::Add(channel) => {
            if let Err(e) = backend.add_interest(&channel) {
                ewarn!("{}: backend rejected fd {}: {}", handle.name(), channel.fd(), e);
            }
        }
        InterestOp::Remove(channel) => {
            retract_fully(handle, backend, &channel);
        }
        InterestOp::Update(channel) => {
            retract_fully(handle, backend, &channel);
            if let Err(e) = backend.add_interest(&channel) {
                ewarn!("{}: backend rejected fd {}: {}", handle.name(), channel.fd(), e);
            }
        }
    }
}

/// Retract every possible registration for the channel, whatever its mask
/// says right now: widen, remove, restore.
fn retract_fully(handle: &LoopHandle, backend: &mut dyn MultiplexBackend, channel: &Arc<Channel>) {
    let current = channel.mask();
    channel.set_mask(FdMask::READ | FdMask::WRITE | FdMask::ERROR);
    if let Err(e) = backend.remove_interest(channel) {
        ewarn!("{}: backend retract failed for fd {}: {}", handle.name(), channel.fd(), e);
    }
    channel.set_mask(current);
}

fn dispatch_event(handle: &LoopHandle, event: &IoEvent) {
    // Look the channel up in the live registry, not the snapshot: an
    // earlier callback this cycle may have removed it.
    let channel = {
        let fds = handle.shared.fds.lock().unwrap();
        fds.registry.find(event.fd).cloned()
    };
    let Some(channel) = channel else { return };

    etrace!("{}: fd {} ready {:?}", handle.name(), event.fd, event.mask);
    if event.mask == FdMask::READ {
        channel.on_read();
    } else if event.mask == FdMask::WRITE {
        channel.on_write();
    } else if event.mask == FdMask::ERROR {
        channel.on_error();
    } else if event.mask == FdMask::CLOSE {
        channel.on_close();
    }
}

fn timer_cycle(handle: &LoopHandle, due: &mut Vec<TimerEntry>) {
    due.clear();
    handle
        .shared
        .timers
        .lock()
        .unwrap()
        .pop_due(Instant::now(), due);

    for mut entry in due.drain(..) {
        let fire_time = Instant::now();
        etrace!("{}: {} fired", handle.name(), entry.id);
        (entry.callback)(handle, entry.id);
        if entry.kind == TimerKind::Repeating {
            handle
                .shared
                .timers
                .lock()
                .unwrap()
                .reinsert(entry, fire_time);
        }
    }
}

fn job_cycle(handle: &LoopHandle, batch: &mut Vec<JobProc>) {
    handle.shared.jobs.lock().unwrap().drain_into(batch);
    for job in batch.drain(..) {
        job(handle);
    }
}
