//! # evloop-core
//!
//! Platform-neutral building blocks for the evloop reactor. Nothing in this
//! crate performs I/O or spawns threads; it is the data layer the reactor
//! and socket crates are built on.
//!
//! ## Modules
//!
//! - [`pipe`]: growable FIFO byte buffer with head-requeue support
//! - [`mask`]: interest/event bit masks
//! - [`channel`]: descriptor + callbacks + buffers bundle
//! - [`registry`]: insertion-ordered channel collection
//! - [`elog`]: leveled stderr logging macros
//! - [`env`]: environment variable parsing helpers
//! - [`error`]: error types

pub mod channel;
pub mod elog;
pub mod env;
pub mod error;
pub mod mask;
pub mod pipe;
pub mod registry;

pub use channel::{Channel, ChannelProc, UserData, UNHANDLED};
pub use error::{CoreError, CoreResult};
pub use mask::FdMask;
pub use pipe::{BytePipe, BUCKET_LEN};
pub use registry::ChannelRegistry;
