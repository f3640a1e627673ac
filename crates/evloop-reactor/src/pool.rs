//! Round-robin pool of reactors.
//!
//! The pool spawns every loop up front. Construction is all-or-nothing:
//! if any loop fails to start, the ones already running are shut down
//! before the error is returned.

use std::sync::Mutex;

use evloop_core::einfo;
use evloop_core::env::env_get;

use crate::config::ReactorConfig;
use crate::error::{ReactorError, ReactorResult};
use crate::event_loop::EventLoop;

/// Pool size used when the caller passes 0 and `EVLOOP_LOOPS` is unset.
pub const DEFAULT_POOL_SIZE: usize = 8;
/// Hard upper bound on pool size.
pub const MAX_POOL_SIZE: usize = 1024;

pub struct LoopPool {
    loops: Vec<EventLoop>,
    cursor: Mutex<usize>,
}

impl LoopPool {
    /// Build a pool of `size` loops configured from the environment.
    /// A size of 0 means `EVLOOP_LOOPS`, or [`DEFAULT_POOL_SIZE`].
    pub fn new(size: usize) -> ReactorResult<LoopPool> {
        LoopPool::with_config(size, ReactorConfig::from_env())
    }

    pub fn with_config(size: usize, config: ReactorConfig) -> ReactorResult<LoopPool> {
        let size = if size == 0 {
            env_get("EVLOOP_LOOPS", DEFAULT_POOL_SIZE)
        } else {
            size
        };
        if size == 0 || size > MAX_POOL_SIZE {
            return Err(ReactorError::PoolSize(size));
        }

        let mut loops = Vec::with_capacity(size);
        for _ in 0..size {
            // An error here drops the loops built so far, joining their
            // threads on the way out.
            loops.push(EventLoop::new(config.clone())?);
        }
        einfo!("pool ready with {} loops", size);
        Ok(LoopPool { loops, cursor: Mutex::new(0) })
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// The next loop in rotation. Callers distribute connections by
    /// calling this once per accept.
    pub fn next(&self) -> &EventLoop {
        let mut cursor = self.cursor.lock().unwrap();
        let lp = &self.loops[*cursor];
        *cursor = (*cursor + 1) % self.loops.len();
        lp
    }

    pub fn get(&self, idx: usize) -> Option<&EventLoop> {
        self.loops.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventLoop> {
        self.loops.iter()
    }

    /// Stop every loop and join its thread.
    pub fn shutdown(&mut self) {
        for lp in &mut self.loops {
            lp.shutdown();
        }
    }
}

impl std::fmt::Debug for LoopPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopPool")
            .field("loops", &self.loops.len())
            .finish()
    }
}
