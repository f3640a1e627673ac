//! TCP listener.

use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

use evloop_core::{Channel, FdMask};

use crate::error::NetResult;
use crate::sys;

/// A bound, listening, non-blocking TCP socket. Not reactor-aware by
/// itself: convert it with [`TcpServer::into_channel`], install an accept
/// callback and register the channel on a loop.
pub struct TcpServer {
    fd: OwnedFd,
}

impl TcpServer {
    pub fn open(addr: Ipv4Addr, port: u16, backlog: i32) -> NetResult<TcpServer> {
        Ok(TcpServer { fd: sys::tcp_listen(addr, port, backlog)? })
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// The port actually bound, useful after asking for port 0.
    pub fn local_port(&self) -> NetResult<u16> {
        sys::local_port(self.fd())
    }

    /// Wrap the listener in a channel with read and error interest set.
    /// The caller installs the accept callback and registers it.
    pub fn into_channel(self) -> Arc<Channel> {
        let ch = Channel::new(self.fd);
        ch.add_mask(FdMask::READ | FdMask::ERROR);
        ch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ephemeral_port() {
        let server = TcpServer::open(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        assert!(server.local_port().unwrap() > 0);
    }

    #[test]
    fn test_into_channel_has_accept_interest() {
        let server = TcpServer::open(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let fd = server.fd();
        let ch = server.into_channel();
        assert_eq!(ch.fd(), fd);
        assert!(ch.has_mask(FdMask::READ));
        assert!(ch.has_mask(FdMask::ERROR));
        assert!(!ch.has_mask(FdMask::WRITE));
    }
}
