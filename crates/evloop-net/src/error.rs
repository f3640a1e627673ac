//! Error types for the socket layer.

use std::fmt;

use evloop_core::CoreError;
use evloop_reactor::ReactorError;
use nix::errno::Errno;

/// Result alias used throughout the socket layer.
pub type NetResult<T> = Result<T, NetError>;

#[derive(Debug)]
pub enum NetError {
    /// An OS call failed.
    Os(Errno),
    /// The remote end closed the stream.
    PeerClosed,
    /// Operation on a connection that was already closed locally.
    ConnectionClosed,
    /// Error bubbled up from the reactor.
    Reactor(ReactorError),
    /// Error bubbled up from the core data structures.
    Core(CoreError),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Os(e) => write!(f, "os error: {}", e),
            NetError::PeerClosed => write!(f, "peer closed the connection"),
            NetError::ConnectionClosed => write!(f, "connection is closed"),
            NetError::Reactor(e) => write!(f, "reactor error: {}", e),
            NetError::Core(e) => write!(f, "core error: {}", e),
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NetError::Os(e) => Some(e),
            NetError::Reactor(e) => Some(e),
            NetError::Core(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Errno> for NetError {
    fn from(e: Errno) -> NetError {
        NetError::Os(e)
    }
}

impl From<ReactorError> for NetError {
    fn from(e: ReactorError) -> NetError {
        NetError::Reactor(e)
    }
}

impl From<CoreError> for NetError {
    fn from(e: CoreError) -> NetError {
        NetError::Core(e)
    }
}
