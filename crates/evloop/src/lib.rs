//! # evloop - Threaded Socket Event Loops
//!
//! Multi-threaded reactor library for non-blocking socket servers.
//!
//! ## Features
//!
//! - **Reactor loops**: one thread per loop multiplexing sockets, timers and jobs
//! - **Pluggable readiness**: `select(2)` everywhere, `kqueue(2)` on the BSDs
//! - **Loop pool**: round-robin distribution of connections across loops
//! - **Buffered TCP**: per-connection pipes with write backpressure and requeue
//! - **Timers**: one-shot and repeating, rescheduled from fire time
//! - **Jobs**: closures queued for execution on a loop thread
//!
//! ## Quick Start
//!
//! ```ignore
//! use evloop::{init, ConnectionHandler, LoopPool, ReadOutcome, TcpConnection, TcpServer};
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ConnectionHandler for Echo {
//!     fn on_read(&self, conn: &Arc<TcpConnection>) -> ReadOutcome {
//!         let bytes = {
//!             let mut pipe = conn.channel().recv_pipe().lock().unwrap();
//!             let bytes = pipe.as_slice().to_vec();
//!             pipe.clear();
//!             bytes
//!         };
//!         if conn.send(&bytes).is_err() {
//!             return ReadOutcome::Error;
//!         }
//!         ReadOutcome::Continue
//!     }
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init();
//!     let pool = Arc::new(LoopPool::new(0)?); // 0 = default size
//!     let server = TcpServer::open(Ipv4Addr::UNSPECIFIED, 9000, 1000)?;
//!     // wire server.into_channel() to an accept callback, attach
//!     // accepted fds with TcpConnection::attach(fd, &pool.next().handle(), ...)
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        ConnectionHandler, timers, jobs, send()              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       LoopPool                              │
//! │              round-robin connection placement               │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │ EventLoop │      │ EventLoop │      │ EventLoop │
//!    │  thread   │      │  thread   │      │  thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//!          │                   │                   │
//!          └───────────────────┼───────────────────┘
//!                              ▼
//!    ┌─────────────────────────────────────────────────────────┐
//!    │                 MultiplexBackend                        │
//!    │            select(2) / kqueue(2) readiness              │
//!    └─────────────────────────────────────────────────────────┘
//! ```

// Re-export core types
pub use evloop_core::{
    BytePipe,
    Channel,
    ChannelProc,
    ChannelRegistry,
    CoreError,
    CoreResult,
    FdMask,
    UserData,
    BUCKET_LEN,
    UNHANDLED,
};

// Re-export logging macros and controls
pub use evloop_core::{edebug, eerror, einfo, etrace, ewarn};
pub use evloop_core::elog::{self, LogLevel};

// Re-export env utilities
pub use evloop_core::env::{env_get, env_get_bool, env_get_str};

// Re-export reactor types
pub use evloop_reactor::{
    BackendKind,
    EventLoop,
    LoopHandle,
    LoopPool,
    MultiplexBackend,
    ReactorConfig,
    ReactorError,
    ReactorResult,
    TimerId,
    TimerKind,
    DEFAULT_POOL_SIZE,
    MAX_POOL_SIZE,
};

// Re-export networking types
pub use evloop_net::{
    sys,
    ConnectionHandler,
    IoStep,
    NetError,
    NetResult,
    ReadOutcome,
    TcpConnection,
    TcpServer,
};

/// One-call process setup: logging level from `EVLOOP_LOG` and broken-pipe
/// signal handling. Idempotent; call it before opening sockets.
pub fn init() {
    evloop_core::elog::init();
    evloop_net::sys::init();
}
