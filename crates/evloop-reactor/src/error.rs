//! Error types for the reactor crate.

use std::fmt;
use std::io;
use std::os::fd::RawFd;

use evloop_core::CoreError;
use nix::errno::Errno;

/// Result alias used throughout the reactor crate.
pub type ReactorResult<T> = Result<T, ReactorError>;

#[derive(Debug)]
pub enum ReactorError {
    /// Error bubbled up from the core data structures.
    Core(CoreError),
    /// An OS call failed.
    Os(Errno),
    /// Descriptor cannot be watched by the active backend.
    DescriptorRange(RawFd),
    /// The backend has no room for another registration.
    BackendFull,
    /// Requested pool size is out of range.
    PoolSize(usize),
    /// Reactor thread could not be spawned.
    Spawn(io::Error),
    /// Invalid configuration value.
    Config(&'static str),
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Core(e) => write!(f, "core error: {}", e),
            ReactorError::Os(e) => write!(f, "os error: {}", e),
            ReactorError::DescriptorRange(fd) => {
                write!(f, "descriptor {} outside backend range", fd)
            }
            ReactorError::BackendFull => write!(f, "backend registration table is full"),
            ReactorError::PoolSize(n) => write!(f, "pool size {} out of range", n),
            ReactorError::Spawn(e) => write!(f, "failed to spawn reactor thread: {}", e),
            ReactorError::Config(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ReactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReactorError::Core(e) => Some(e),
            ReactorError::Os(e) => Some(e),
            ReactorError::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CoreError> for ReactorError {
    fn from(e: CoreError) -> ReactorError {
        ReactorError::Core(e)
    }
}

impl From<Errno> for ReactorError {
    fn from(e: Errno) -> ReactorError {
        ReactorError::Os(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_source() {
        let e = ReactorError::from(CoreError::DuplicateDescriptor(3));
        assert!(e.to_string().contains("core error"));
        assert!(std::error::Error::source(&e).is_some());

        let e = ReactorError::PoolSize(9999);
        assert!(e.to_string().contains("9999"));
        assert!(std::error::Error::source(&e).is_none());
    }
}
