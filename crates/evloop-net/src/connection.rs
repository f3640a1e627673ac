//! Buffered, backpressure-aware TCP connection.
//!
//! A `TcpConnection` glues one accepted (or connected) socket to a
//! reactor loop. Inbound bytes are drained into the channel's receive
//! pipe before the application handler runs; outbound bytes queue in the
//! send pipe and leave as the socket accepts them, with the unsent
//! remainder of a short write requeued at the pipe head so wire order is
//! never disturbed.
//!
//! Teardown is a single path: [`TcpConnection::close`] runs at most once
//! no matter who calls it (handler, reactor callback or another thread),
//! notifies the handler, detaches the channel from the loop and releases
//! the channel's back-reference. The descriptor itself closes when the
//! last reference to the channel drops, which happens only after the
//! reactor has retracted it from the backend.

use std::os::fd::{OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use evloop_core::{edebug, etrace, ewarn};
use evloop_core::{Channel, FdMask, UserData, UNHANDLED};
use evloop_reactor::LoopHandle;

use crate::error::{NetError, NetResult};
use crate::sys::{self, IoStep};

/// Bytes moved per syscall when pumping the pipes.
const CHUNK: usize = 1024;

/// What the application handler made of the freshly received bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Processed (possibly partially); keep the connection open.
    Continue,
    /// The handler closed the connection itself; skip any further
    /// teardown this event would have done.
    AlreadyClosed,
    /// The inbound data was unacceptable. Logged; the connection stays
    /// open unless the socket itself is finished.
    Error,
}

/// Application protocol hooks. One handler instance may serve many
/// connections; per-connection state belongs in the connection userdata.
pub trait ConnectionHandler: Send + Sync {
    /// Runs on the reactor thread after fresh bytes were appended to the
    /// receive pipe. Consume what you can and leave the rest buffered.
    fn on_read(&self, conn: &Arc<TcpConnection>) -> ReadOutcome;

    /// Runs when the socket turns writable. The default drains the send
    /// pipe and closes the connection if the socket is dead.
    fn on_write(&self, conn: &Arc<TcpConnection>) {
        if conn.flush().is_err() {
            conn.close();
        }
    }

    /// Runs exactly once as the connection tears down. Notification only.
    fn on_close(&self, _conn: &Arc<TcpConnection>) {}
}

pub struct TcpConnection {
    channel: Arc<Channel>,
    reactor: LoopHandle,
    handler: Arc<dyn ConnectionHandler>,
    userdata: Mutex<Option<UserData>>,
    closed: AtomicBool,
}

impl TcpConnection {
    /// Wrap `fd` in a channel, wire the channel callbacks to this
    /// connection and register it on `reactor` with read and error
    /// interest. The returned connection is live immediately.
    pub fn attach(
        fd: OwnedFd,
        reactor: &LoopHandle,
        handler: Arc<dyn ConnectionHandler>,
    ) -> NetResult<Arc<TcpConnection>> {
        let channel = Channel::new(fd);
        let conn = Arc::new(TcpConnection {
            channel: channel.clone(),
            reactor: reactor.clone(),
            handler,
            userdata: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        channel.set_userdata(Some(conn.clone() as UserData));
        channel.set_read_proc(Some(Arc::new(read_proc)));
        channel.set_write_proc(Some(Arc::new(write_proc)));
        channel.set_error_proc(Some(Arc::new(error_proc)));
        channel.set_close_proc(Some(Arc::new(hup_proc)));
        channel.add_mask(FdMask::READ | FdMask::ERROR);

        if let Err(e) = reactor.add_channel(channel.clone()) {
            channel.set_userdata(None);
            return Err(e.into());
        }
        etrace!("conn fd {} attached to {}", conn.fd(), reactor.name());
        Ok(conn)
    }

    pub fn fd(&self) -> RawFd {
        self.channel.fd()
    }

    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    pub fn reactor(&self) -> &LoopHandle {
        &self.reactor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_userdata(&self, data: Option<UserData>) {
        *self.userdata.lock().unwrap() = data;
    }

    pub fn userdata(&self) -> Option<UserData> {
        self.userdata.lock().unwrap().clone()
    }

    /// Queue bytes for transmission and request write readiness. The
    /// actual write happens on the reactor thread as the socket drains.
    pub fn send(&self, bytes: &[u8]) -> NetResult<()> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        self.channel.send_pipe().lock().unwrap().write(bytes)?;
        self.mark_write();
        Ok(())
    }

    /// Push buffered bytes to the socket until it stops accepting or the
    /// pipe drains. A short write requeues the remainder at the pipe head
    /// and leaves write interest set; a drained pipe clears it. `Err`
    /// means the socket is done for and the caller should close.
    pub fn flush(&self) -> NetResult<()> {
        let mut chunk = [0u8; CHUNK];
        loop {
            let n = self.channel.send_pipe().lock().unwrap().read(&mut chunk);
            if n == 0 {
                self.unmark_write();
                return Ok(());
            }
            match sys::write(self.fd(), &chunk[..n]) {
                Ok(IoStep::Data(written)) if written == n => continue,
                Ok(IoStep::Data(written)) => {
                    self.channel
                        .send_pipe()
                        .lock()
                        .unwrap()
                        .write_head(&chunk[written..n])?;
                    return Ok(());
                }
                Ok(IoStep::WouldBlock) => {
                    self.channel
                        .send_pipe()
                        .lock()
                        .unwrap()
                        .write_head(&chunk[..n])?;
                    return Ok(());
                }
                Ok(IoStep::Closed) => return Err(NetError::PeerClosed),
                Err(e) => return Err(e),
            }
        }
    }

    fn mark_write(&self) {
        self.channel.add_mask(FdMask::WRITE);
        self.reactor.update_channel(&self.channel);
    }

    fn unmark_write(&self) {
        self.channel.remove_mask(FdMask::WRITE);
        self.reactor.update_channel(&self.channel);
    }

    /// Drain the socket into the receive pipe, then hand the bytes to the
    /// handler. Runs on the reactor thread.
    fn handle_readable(self: &Arc<Self>) -> i32 {
        let mut chunk = [0u8; CHUNK];
        let mut got_data = false;
        let mut need_close = false;
        loop {
            match sys::read(self.fd(), &mut chunk) {
                Ok(IoStep::Data(n)) => {
                    let queued = self
                        .channel
                        .recv_pipe()
                        .lock()
                        .unwrap()
                        .write(&chunk[..n]);
                    if queued.is_err() {
                        ewarn!("conn fd {}: receive buffer exhausted, closing", self.fd());
                        need_close = true;
                        break;
                    }
                    got_data = true;
                }
                Ok(IoStep::WouldBlock) => break,
                Ok(IoStep::Closed) => {
                    need_close = true;
                    break;
                }
                Err(e) => {
                    ewarn!("conn fd {}: read failed: {}", self.fd(), e);
                    need_close = true;
                    break;
                }
            }
        }

        let mut status = 0;
        if got_data {
            match self.handler.on_read(self) {
                ReadOutcome::Continue => {}
                ReadOutcome::AlreadyClosed => need_close = false,
                ReadOutcome::Error => {
                    edebug!("conn fd {}: handler rejected input", self.fd());
                    status = -1;
                }
            }
        }
        if need_close {
            self.close();
        }
        status
    }

    fn handle_writable(self: &Arc<Self>) -> i32 {
        self.handler.on_write(self);
        0
    }

    /// Tear the connection down: notify the handler, deregister from the
    /// loop, release the channel's back-reference. Runs at most once;
    /// later calls are no-ops. Safe from any thread and from callbacks.
    pub fn close(self: &Arc<Self>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        edebug!("conn fd {} closing", self.fd());
        self.handler.on_close(self);
        self.reactor.remove_channel(&self.channel);
        self.channel.set_userdata(None);
    }
}

impl std::fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpConnection")
            .field("fd", &self.fd())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn conn_of(channel: &Channel) -> Option<Arc<TcpConnection>> {
    channel.userdata()?.downcast::<TcpConnection>().ok()
}

fn read_proc(channel: &Channel) -> i32 {
    match conn_of(channel) {
        Some(conn) => conn.handle_readable(),
        None => UNHANDLED,
    }
}

fn write_proc(channel: &Channel) -> i32 {
    match conn_of(channel) {
        Some(conn) => conn.handle_writable(),
        None => UNHANDLED,
    }
}

fn error_proc(channel: &Channel) -> i32 {
    match conn_of(channel) {
        Some(conn) => {
            ewarn!("conn fd {}: error condition reported", conn.fd());
            conn.close();
            0
        }
        None => UNHANDLED,
    }
}

fn hup_proc(channel: &Channel) -> i32 {
    match conn_of(channel) {
        Some(conn) => {
            edebug!("conn fd {}: peer hung up", conn.fd());
            conn.close();
            0
        }
        None => UNHANDLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::TcpServer;
    use crate::sys::IoStep;
    use evloop_reactor::{BackendKind, EventLoop, LoopPool, ReactorConfig};
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpStream};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct NullHandler;

    impl ConnectionHandler for NullHandler {
        fn on_read(&self, _conn: &Arc<TcpConnection>) -> ReadOutcome {
            ReadOutcome::Continue
        }
    }

    fn test_config() -> ReactorConfig {
        ReactorConfig::new()
            .backend(BackendKind::Select)
            .poll_ceiling(Duration::from_millis(5))
            .name_prefix("net")
    }

    /// Connection over one end of a socketpair, not registered anywhere,
    /// for driving flush() by hand.
    fn detached_conn(lp: &EventLoop) -> (Arc<TcpConnection>, UnixStream) {
        let (a, b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();
        b.set_nonblocking(true).unwrap();
        let conn = Arc::new(TcpConnection {
            channel: Channel::new(OwnedFd::from(a)),
            reactor: lp.handle(),
            handler: Arc::new(NullHandler),
            userdata: Mutex::new(None),
            closed: AtomicBool::new(false),
        });
        (conn, b)
    }

    #[test]
    fn test_flush_partial_write_requeues_remainder() {
        let lp = EventLoop::new(test_config()).unwrap();
        let (conn, peer) = detached_conn(&lp);

        let payload: Vec<u8> = (0..1_000_000u32).map(|i| i as u8).collect();
        conn.send(&payload).unwrap();
        assert!(conn.channel().has_mask(FdMask::WRITE));

        conn.flush().unwrap();

        let remaining = conn.channel().send_pipe().lock().unwrap().len();
        assert!(remaining > 0, "socket swallowed 1MB without blocking");
        assert!(conn.channel().has_mask(FdMask::WRITE));

        // Everything the socket took must be an exact prefix of the
        // payload, and the pipe must hold exactly the rest.
        let mut wired = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match sys::read(peer.as_raw_fd(), &mut buf).unwrap() {
                IoStep::Data(n) => wired.extend_from_slice(&buf[..n]),
                IoStep::WouldBlock => break,
                IoStep::Closed => break,
            }
        }
        assert_eq!(wired.len() + remaining, payload.len());
        assert_eq!(wired[..], payload[..wired.len()]);
        assert_eq!(
            conn.channel().send_pipe().lock().unwrap().as_slice(),
            &payload[wired.len()..]
        );
    }

    #[test]
    fn test_flush_drained_clears_write_interest() {
        let lp = EventLoop::new(test_config()).unwrap();
        let (conn, _peer) = detached_conn(&lp);

        conn.send(b"small").unwrap();
        assert!(conn.channel().has_mask(FdMask::WRITE));

        conn.flush().unwrap();
        assert!(conn.channel().send_pipe().lock().unwrap().is_empty());
        assert!(!conn.channel().has_mask(FdMask::WRITE));
    }

    #[test]
    fn test_send_after_close_rejected() {
        let lp = EventLoop::new(test_config()).unwrap();
        let (conn, _peer) = detached_conn(&lp);

        conn.close();
        assert!(conn.is_closed());
        assert!(matches!(conn.send(b"x"), Err(NetError::ConnectionClosed)));
    }

    #[test]
    fn test_close_notifies_handler_once() {
        struct CloseCounter(AtomicUsize);
        impl ConnectionHandler for CloseCounter {
            fn on_read(&self, _conn: &Arc<TcpConnection>) -> ReadOutcome {
                ReadOutcome::Continue
            }
            fn on_close(&self, _conn: &Arc<TcpConnection>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let lp = EventLoop::new(test_config()).unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        let handler = Arc::new(CloseCounter(AtomicUsize::new(0)));
        let conn = Arc::new(TcpConnection {
            channel: Channel::new(OwnedFd::from(a)),
            reactor: lp.handle(),
            handler: handler.clone(),
            userdata: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        conn.close();
        conn.close();
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_attach_registers_with_read_interest() {
        sys::init();
        let lp = EventLoop::new(test_config()).unwrap();
        let (a, _b) = UnixStream::pair().unwrap();
        a.set_nonblocking(true).unwrap();

        let conn =
            TcpConnection::attach(OwnedFd::from(a), &lp.handle(), Arc::new(NullHandler)).unwrap();
        assert_eq!(lp.channel_count(), 1);
        assert!(conn.channel().has_mask(FdMask::READ));
        assert!(conn.channel().has_mask(FdMask::ERROR));

        conn.close();
        assert_eq!(lp.channel_count(), 0);
    }

    struct PingHandler;

    impl PingHandler {
        fn take_line(pipe: &mut evloop_core::BytePipe) -> Option<Vec<u8>> {
            let pos = pipe.find_byte(b'\n')?;
            let mut line = vec![0u8; pos + 1];
            pipe.read(&mut line);
            line.truncate(pos);
            Some(line)
        }
    }

    impl ConnectionHandler for PingHandler {
        fn on_read(&self, conn: &Arc<TcpConnection>) -> ReadOutcome {
            loop {
                let line = {
                    let mut pipe = conn.channel().recv_pipe().lock().unwrap();
                    Self::take_line(&mut pipe)
                };
                let Some(line) = line else { return ReadOutcome::Continue };
                match line.as_slice() {
                    b"ping" => {
                        if conn.send(b"pong\n").is_err() {
                            return ReadOutcome::Error;
                        }
                    }
                    b"exit" => {
                        conn.close();
                        return ReadOutcome::AlreadyClosed;
                    }
                    _ => return ReadOutcome::Error,
                }
            }
        }
    }

    #[test]
    fn test_ping_pong_end_to_end() {
        sys::init();
        let pool = Arc::new(LoopPool::with_config(2, test_config()).unwrap());
        let server = TcpServer::open(Ipv4Addr::LOCALHOST, 0, 128).unwrap();
        let port = server.local_port().unwrap();
        let listener = server.into_channel();

        let accept_pool = pool.clone();
        listener.set_read_proc(Some(Arc::new(move |ch: &Channel| {
            loop {
                match sys::accept(ch.fd()) {
                    Ok(Some((fd, _peer))) => {
                        let handle = accept_pool.next().handle();
                        if let Err(e) =
                            TcpConnection::attach(fd, &handle, Arc::new(PingHandler))
                        {
                            ewarn!("attach failed: {}", e);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
            0
        })));
        pool.get(0).unwrap().add_channel(listener.clone()).unwrap();

        // One request, one reply.
        let mut client = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client.write_all(b"ping\n").unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong\n");

        // Two requests in one segment drain as two replies.
        client.write_all(b"ping\nping\n").unwrap();
        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong\npong\n");

        // exit closes from the server side: EOF.
        client.write_all(b"exit\n").unwrap();
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());

        // A dropped client must not wedge the server.
        let second = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        drop(second);

        let mut third = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
        third
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        third.write_all(b"ping\n").unwrap();
        let mut reply = [0u8; 5];
        third.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong\n");

        pool.get(0).unwrap().remove_channel(&listener);
        listener.set_read_proc(None);
    }
}
