//! # evloop-reactor
//!
//! Threaded reactor built on the evloop-core types. Each [`EventLoop`]
//! runs one worker thread that multiplexes channel readiness (through a
//! pluggable [`MultiplexBackend`]), due timers and deferred jobs.
//! [`LoopPool`] spreads connections across several loops round-robin.
//!
//! ## Usage
//!
//! ```ignore
//! use evloop_reactor::{EventLoop, ReactorConfig, TimerKind};
//! use std::time::Duration;
//!
//! let mut lp = EventLoop::new(ReactorConfig::from_env())?;
//! lp.add_timer(Duration::from_secs(5), TimerKind::Repeating, |handle, id| {
//!     println!("{} tick on {}", id, handle.name());
//! });
//! // ... register channels, queue jobs ...
//! lp.shutdown();
//! ```
//!
//! ## Modules
//!
//! - [`event_loop`]: the reactor thread and its handle
//! - [`backend`]: readiness backend trait and implementations
//! - [`timer`]: deadline-ordered timer queue
//! - [`job`]: deferred one-shot jobs
//! - [`pool`]: round-robin loop pool
//! - [`config`]: reactor configuration
//! - [`error`]: error types

pub mod backend;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod job;
pub mod pool;
pub mod timer;

pub use backend::{create_backend, BackendKind, IoEvent, MultiplexBackend, SelectBackend};
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use backend::KqueueBackend;
pub use config::{ReactorConfig, DEFAULT_POLL_CEILING_MS};
pub use error::{ReactorError, ReactorResult};
pub use event_loop::{EventLoop, LoopHandle};
pub use job::JobProc;
pub use pool::{LoopPool, DEFAULT_POOL_SIZE, MAX_POOL_SIZE};
pub use timer::{TimerId, TimerKind, TimerProc};
