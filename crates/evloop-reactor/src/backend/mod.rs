//! Readiness backend abstraction.
//!
//! A backend multiplexes many descriptors into one blocking wait. Each
//! reactor thread owns exactly one backend instance and is the only caller
//! of these methods, so implementations need no internal locking.
//!
//! ## Contract
//!
//! - `add_interest` registers a channel's current interest mask. Calling it
//!   again for the same descriptor adds any newly set bits.
//! - `remove_interest` retracts every registration covered by the channel's
//!   current mask. Callers widen the mask first when they want a descriptor
//!   fully forgotten.
//! - `poll` blocks up to `timeout` and appends one event per (descriptor,
//!   condition) pair to `out`, returning how many were appended. Events
//!   carry exactly one mask bit. A backend may report `CLOSE` for peers
//!   that hung up; backends without that signal report `READ` and let the
//!   zero-byte read say the rest.
//!
//! Spurious readiness is allowed. Consumers must treat every event as a
//! hint and reconfirm with a non-blocking call.

use std::fmt;
use std::os::fd::RawFd;
use std::str::FromStr;
use std::time::Duration;

use cfg_if::cfg_if;
use evloop_core::{Channel, ChannelRegistry, FdMask};

use crate::error::{ReactorError, ReactorResult};

mod select;
pub use select::SelectBackend;

#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
mod kqueue;
#[cfg(any(
    target_os = "macos",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use kqueue::KqueueBackend;

/// One readiness condition on one descriptor. `mask` always has exactly
/// one bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoEvent {
    pub fd: RawFd,
    pub mask: FdMask,
}

/// Descriptor multiplexing, implemented per platform facility.
pub trait MultiplexBackend: Send {
    fn add_interest(&mut self, channel: &Channel) -> ReactorResult<()>;

    fn remove_interest(&mut self, channel: &Channel) -> ReactorResult<()>;

    fn poll(
        &mut self,
        registry: &ChannelRegistry,
        timeout: Duration,
        out: &mut Vec<IoEvent>,
    ) -> ReactorResult<usize>;
}

/// Which multiplexing facility to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Portable `select(2)`. Capped at `FD_SETSIZE` descriptors.
    Select,
    /// BSD `kevent(2)`. Only available where the OS provides it.
    Kqueue,
}

impl BackendKind {
    /// The preferred backend for the build target.
    pub fn platform_default() -> BackendKind {
        cfg_if! {
            if #[cfg(any(
                target_os = "macos",
                target_os = "freebsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))] {
                BackendKind::Kqueue
            } else {
                BackendKind::Select
            }
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Select => write!(f, "select"),
            BackendKind::Kqueue => write!(f, "kqueue"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = ReactorError;

    fn from_str(s: &str) -> Result<BackendKind, ReactorError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "select" => Ok(BackendKind::Select),
            "kqueue" => Ok(BackendKind::Kqueue),
            _ => Err(ReactorError::Config("unknown backend name")),
        }
    }
}

/// Instantiate a backend of the given kind. Fails when the kind is not
/// compiled in on this platform.
pub fn create_backend(kind: BackendKind) -> ReactorResult<Box<dyn MultiplexBackend>> {
    match kind {
        BackendKind::Select => Ok(Box::new(SelectBackend::new())),
        BackendKind::Kqueue => {
            cfg_if! {
                if #[cfg(any(
                    target_os = "macos",
                    target_os = "freebsd",
                    target_os = "openbsd",
                    target_os = "dragonfly"
                ))] {
                    Ok(Box::new(KqueueBackend::new()?))
                } else {
                    Err(ReactorError::Config("kqueue backend not available on this platform"))
                }
            }
        }
    }
}
