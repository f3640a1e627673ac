//! Non-blocking TCP syscalls.
//!
//! Everything here works on raw descriptors and classifies outcomes into
//! [`IoStep`] so callers never look at errno themselves. Interrupted calls
//! are retried on the spot; would-block is a normal result, not an error.

use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use cfg_if::cfg_if;
use evloop_core::{edebug, ewarn};
use nix::errno::Errno;
use nix::sys::signal::{signal, SigHandler, Signal};

use crate::error::{NetError, NetResult};

/// Outcome of one non-blocking read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStep {
    /// This many bytes moved.
    Data(usize),
    /// The descriptor has nothing to offer, or no room, right now.
    WouldBlock,
    /// The stream is finished: EOF on read, a dead peer on write.
    Closed,
}

static INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Process-wide socket setup: ignore SIGPIPE so a write to a dead peer
/// surfaces as an error instead of killing the process. Idempotent; call
/// it once before serving.
pub fn init() {
    if INIT_DONE.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Err(e) = unsafe { signal(Signal::SIGPIPE, SigHandler::SigIgn) } {
        ewarn!("failed to ignore SIGPIPE: {}", e);
    }
}

fn check(rc: libc::c_int) -> NetResult<libc::c_int> {
    if rc < 0 {
        Err(NetError::Os(Errno::last()))
    } else {
        Ok(rc)
    }
}

fn sockaddr_of(addr: Ipv4Addr, port: u16) -> libc::sockaddr_in {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    sa.sin_family = libc::AF_INET as libc::sa_family_t;
    sa.sin_port = port.to_be();
    sa.sin_addr.s_addr = u32::from(addr).to_be();
    sa
}

fn set_sockopt_one(fd: RawFd, level: libc::c_int, opt: libc::c_int) -> NetResult<()> {
    let one: libc::c_int = 1;
    check(unsafe {
        libc::setsockopt(
            fd,
            level,
            opt,
            &one as *const libc::c_int as *const libc::c_void,
            mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

cfg_if! {
    if #[cfg(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))] {
        fn set_nosigpipe(fd: RawFd) -> NetResult<()> {
            set_sockopt_one(fd, libc::SOL_SOCKET, libc::SO_NOSIGPIPE)
        }
    } else {
        fn set_nosigpipe(_fd: RawFd) -> NetResult<()> {
            Ok(())
        }
    }
}

pub fn set_nonblocking(fd: RawFd) -> NetResult<()> {
    let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;
    Ok(())
}

pub fn set_nodelay(fd: RawFd) -> NetResult<()> {
    set_sockopt_one(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY)
}

fn new_tcp_socket() -> NetResult<OwnedFd> {
    let raw = check(unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) })?;
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };
    set_nosigpipe(raw)?;
    Ok(fd)
}

/// Open a non-blocking listener socket bound to `addr:port`. Pass port 0
/// for an ephemeral port and read it back with [`local_port`].
pub fn tcp_listen(addr: Ipv4Addr, port: u16, backlog: i32) -> NetResult<OwnedFd> {
    let fd = new_tcp_socket()?;
    let raw = fd.as_raw_fd();
    set_sockopt_one(raw, libc::SOL_SOCKET, libc::SO_REUSEADDR)?;

    let sa = sockaddr_of(addr, port);
    check(unsafe {
        libc::bind(
            raw,
            &sa as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })?;
    check(unsafe { libc::listen(raw, backlog) })?;
    set_nonblocking(raw)?;
    edebug!("listening on {}:{} (fd {})", addr, port, raw);
    Ok(fd)
}

/// Local port of a bound socket.
pub fn local_port(fd: RawFd) -> NetResult<u16> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    check(unsafe {
        libc::getsockname(fd, &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr, &mut len)
    })?;
    Ok(u16::from_be(sa.sin_port))
}

/// Accept one pending connection. `Ok(None)` means nothing is pending.
/// The accepted socket comes back non-blocking with Nagle disabled.
pub fn accept(listener: RawFd) -> NetResult<Option<(OwnedFd, SocketAddrV4)>> {
    let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            let rc = unsafe {
                libc::accept4(
                    listener,
                    &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                    &mut len,
                    libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                )
            };
        } else {
            let rc = unsafe {
                libc::accept(
                    listener,
                    &mut sa as *mut libc::sockaddr_in as *mut libc::sockaddr,
                    &mut len,
                )
            };
        }
    }

    if rc < 0 {
        let e = Errno::last();
        if e == Errno::EAGAIN
            || e == Errno::EWOULDBLOCK
            || e == Errno::EINTR
            || e == Errno::ECONNABORTED
        {
            return Ok(None);
        }
        return Err(NetError::Os(e));
    }
    let fd = unsafe { OwnedFd::from_raw_fd(rc) };

    cfg_if! {
        if #[cfg(not(any(target_os = "linux", target_os = "android")))] {
            set_nonblocking(rc)?;
        }
    }
    set_nosigpipe(rc)?;
    if let Err(e) = set_nodelay(rc) {
        edebug!("TCP_NODELAY failed on fd {}: {}", rc, e);
    }

    let peer = SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr)),
        u16::from_be(sa.sin_port),
    );
    Ok(Some((fd, peer)))
}

/// Blocking connect, for clients and tests. The socket stays blocking;
/// hand it to [`crate::TcpConnection::attach`] to make it reactor-driven.
pub fn tcp_connect(addr: Ipv4Addr, port: u16) -> NetResult<OwnedFd> {
    let fd = new_tcp_socket()?;
    let sa = sockaddr_of(addr, port);
    check(unsafe {
        libc::connect(
            fd.as_raw_fd(),
            &sa as *const libc::sockaddr_in as *const libc::sockaddr,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    })?;
    set_nodelay(fd.as_raw_fd())?;
    Ok(fd)
}

/// One non-blocking read into `buf`.
pub fn read(fd: RawFd, buf: &mut [u8]) -> NetResult<IoStep> {
    if buf.is_empty() {
        return Ok(IoStep::Data(0));
    }
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            return Ok(IoStep::Data(n as usize));
        }
        if n == 0 {
            return Ok(IoStep::Closed);
        }
        let e = Errno::last();
        if e == Errno::EINTR {
            continue;
        }
        if e == Errno::EAGAIN || e == Errno::EWOULDBLOCK {
            return Ok(IoStep::WouldBlock);
        }
        return Err(NetError::Os(e));
    }
}

cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn send_raw(fd: RawFd, buf: &[u8]) -> isize {
            unsafe {
                libc::send(
                    fd,
                    buf.as_ptr() as *const libc::c_void,
                    buf.len(),
                    libc::MSG_NOSIGNAL,
                )
            }
        }
    } else {
        fn send_raw(fd: RawFd, buf: &[u8]) -> isize {
            unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) }
        }
    }
}

/// One non-blocking write from `buf`. A dead peer reports `Closed`, not
/// an error, so callers tear the connection down on one path.
pub fn write(fd: RawFd, buf: &[u8]) -> NetResult<IoStep> {
    if buf.is_empty() {
        return Ok(IoStep::Data(0));
    }
    loop {
        let n = send_raw(fd, buf);
        if n > 0 {
            return Ok(IoStep::Data(n as usize));
        }
        if n == 0 {
            return Ok(IoStep::Closed);
        }
        let e = Errno::last();
        if e == Errno::EINTR {
            continue;
        }
        if e == Errno::EAGAIN || e == Errno::EWOULDBLOCK {
            return Ok(IoStep::WouldBlock);
        }
        if e == Errno::EPIPE || e == Errno::ECONNRESET {
            return Ok(IoStep::Closed);
        }
        return Err(NetError::Os(e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixStream;
    use std::thread;
    use std::time::{Duration, Instant};

    fn accept_within(listener: RawFd, deadline: Duration) -> (OwnedFd, SocketAddrV4) {
        let start = Instant::now();
        loop {
            if let Some(pair) = accept(listener).unwrap() {
                return pair;
            }
            assert!(start.elapsed() < deadline, "no connection arrived");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_listen_connect_accept_roundtrip() {
        init();
        let listener = tcp_listen(Ipv4Addr::LOCALHOST, 0, 16).unwrap();
        let port = local_port(listener.as_raw_fd()).unwrap();
        assert!(port > 0);

        assert!(accept(listener.as_raw_fd()).unwrap().is_none());

        let client = tcp_connect(Ipv4Addr::LOCALHOST, port).unwrap();
        let (server, peer) = accept_within(listener.as_raw_fd(), Duration::from_secs(2));
        assert_eq!(*peer.ip(), Ipv4Addr::LOCALHOST);

        match write(client.as_raw_fd(), b"hello").unwrap() {
            IoStep::Data(5) => {}
            other => panic!("unexpected write outcome: {:?}", other),
        }

        let mut buf = [0u8; 16];
        let start = Instant::now();
        loop {
            match read(server.as_raw_fd(), &mut buf).unwrap() {
                IoStep::Data(n) => {
                    assert_eq!(&buf[..n], b"hello");
                    break;
                }
                IoStep::WouldBlock => {
                    assert!(start.elapsed() < Duration::from_secs(2));
                    thread::sleep(Duration::from_millis(5));
                }
                IoStep::Closed => panic!("unexpected close"),
            }
        }
    }

    #[test]
    fn test_read_would_block_on_idle_socket() {
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(read(a.as_raw_fd(), &mut buf).unwrap(), IoStep::WouldBlock);
    }

    #[test]
    fn test_read_reports_eof() {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        drop(b);
        let mut buf = [0u8; 8];
        assert_eq!(read(a.as_raw_fd(), &mut buf).unwrap(), IoStep::Closed);
    }

    #[test]
    fn test_write_to_dead_peer_reports_closed() {
        init();
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        drop(b);

        // The first write may still be buffered; a dead peer must show up
        // within a few attempts.
        for _ in 0..10 {
            match write(a.as_raw_fd(), b"x").unwrap() {
                IoStep::Closed => return,
                IoStep::Data(_) | IoStep::WouldBlock => {
                    thread::sleep(Duration::from_millis(2))
                }
            }
        }
        panic!("peer death never surfaced");
    }

    #[test]
    fn test_empty_buffers_are_noops() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut empty = [0u8; 0];
        assert_eq!(read(a.as_raw_fd(), &mut empty).unwrap(), IoStep::Data(0));
        assert_eq!(write(a.as_raw_fd(), &empty).unwrap(), IoStep::Data(0));
    }
}
