//! Error types for the core crate.

use std::fmt;
use std::os::fd::RawFd;

/// Result alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the core data structures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A pipe could not grow its backing storage.
    AllocFailed { requested: usize },
    /// A channel with the same descriptor is already registered.
    DuplicateDescriptor(RawFd),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::AllocFailed { requested } => {
                write!(f, "failed to allocate {} bytes for pipe storage", requested)
            }
            CoreError::DuplicateDescriptor(fd) => {
                write!(f, "descriptor {} is already registered", fd)
            }
        }
    }
}

impl std::error::Error for CoreError {}
