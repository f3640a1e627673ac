//! Non-blocking TCP plumbing for reactor loops.
//!
//! ## Modules
//!  - `sys`:        thin non-blocking syscall layer (socket, accept, read, write)
//!  - `listener`:   listening socket wrapped as a reactor channel
//!  - `connection`: buffered connection with write backpressure
//!  - `error`:      error type shared by the crate
//!
//! Call [`sys::init`] once at startup so a peer resetting mid-write
//! surfaces as an error return instead of killing the process.

pub mod connection;
pub mod error;
pub mod listener;
pub mod sys;

pub use connection::{ConnectionHandler, ReadOutcome, TcpConnection};
pub use error::{NetError, NetResult};
pub use listener::TcpServer;
pub use sys::IoStep;
