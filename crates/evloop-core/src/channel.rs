//! Channel: a registered file descriptor plus its callbacks and buffers.
//!
//! A channel owns its descriptor and carries everything the reactor needs
//! to service it: the interest mask, one callback slot per event kind, an
//! opaque userdata pointer and a pair of byte pipes (receive and send).
//!
//! Dispatch clones the callback out of its slot before invoking it, so a
//! callback may replace or clear any slot on its own channel without
//! deadlocking. Callbacks return an `i32` status; a slot that is empty
//! reports [`UNHANDLED`].

use std::any::Any;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use crate::mask::FdMask;
use crate::pipe::BytePipe;

/// Returned by dispatch when no callback is installed for the event.
pub const UNHANDLED: i32 = -1;

/// Event callback. Receives the channel the event fired on.
pub type ChannelProc = Arc<dyn Fn(&Channel) -> i32 + Send + Sync>;

/// Opaque per-channel payload, downcast by whoever installed it.
pub type UserData = Arc<dyn Any + Send + Sync>;

const SLOT_READ: usize = 0;
const SLOT_WRITE: usize = 1;
const SLOT_ERROR: usize = 2;
const SLOT_CLOSE: usize = 3;
const SLOT_COUNT: usize = 4;

pub struct Channel {
    fd: OwnedFd,
    mask: AtomicU8,
    procs: Mutex<[Option<ChannelProc>; SLOT_COUNT]>,
    userdata: Mutex<Option<UserData>>,
    recv: Mutex<BytePipe>,
    send: Mutex<BytePipe>,
}

impl Channel {
    /// Take ownership of `fd` and wrap it in a channel with no interest,
    /// no callbacks and empty pipes. The descriptor closes when the last
    /// reference to the channel drops.
    pub fn new(fd: OwnedFd) -> Arc<Channel> {
        Arc::new(Channel {
            fd,
            mask: AtomicU8::new(0),
            procs: Mutex::new([None, None, None, None]),
            userdata: Mutex::new(None),
            recv: Mutex::new(BytePipe::new()),
            send: Mutex::new(BytePipe::new()),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    // Mask operations. The mask is atomic so readiness dispatch can peek at
    // it without taking any lock.

    pub fn mask(&self) -> FdMask {
        FdMask::from_bits(self.mask.load(Ordering::SeqCst))
    }

    pub fn set_mask(&self, mask: FdMask) {
        self.mask.store(mask.bits(), Ordering::SeqCst);
    }

    pub fn add_mask(&self, mask: FdMask) {
        self.mask.fetch_or(mask.bits(), Ordering::SeqCst);
    }

    pub fn remove_mask(&self, mask: FdMask) {
        self.mask.fetch_and(!mask.bits(), Ordering::SeqCst);
    }

    pub fn clear_mask(&self) {
        self.mask.store(0, Ordering::SeqCst);
    }

    pub fn has_mask(&self, mask: FdMask) -> bool {
        self.mask().contains(mask)
    }

    // Callback slots.

    pub fn set_read_proc(&self, callback: Option<ChannelProc>) {
        self.set_proc(SLOT_READ, callback);
    }

    pub fn set_write_proc(&self, callback: Option<ChannelProc>) {
        self.set_proc(SLOT_WRITE, callback);
    }

    pub fn set_error_proc(&self, callback: Option<ChannelProc>) {
        self.set_proc(SLOT_ERROR, callback);
    }

    pub fn set_close_proc(&self, callback: Option<ChannelProc>) {
        self.set_proc(SLOT_CLOSE, callback);
    }

    fn set_proc(&self, slot: usize, callback: Option<ChannelProc>) {
        self.procs.lock().unwrap()[slot] = callback;
    }

    // Dispatch. The slot lock is held only long enough to clone the
    // callback; the callback itself runs unlocked.

    pub fn on_read(&self) -> i32 {
        self.dispatch(SLOT_READ)
    }

    pub fn on_write(&self) -> i32 {
        self.dispatch(SLOT_WRITE)
    }

    pub fn on_error(&self) -> i32 {
        self.dispatch(SLOT_ERROR)
    }

    pub fn on_close(&self) -> i32 {
        self.dispatch(SLOT_CLOSE)
    }

    fn dispatch(&self, slot: usize) -> i32 {
        let callback = self.procs.lock().unwrap()[slot].clone();
        match callback {
            Some(p) => p(self),
            None => UNHANDLED,
        }
    }

    // Userdata.

    pub fn set_userdata(&self, data: Option<UserData>) {
        *self.userdata.lock().unwrap() = data;
    }

    pub fn userdata(&self) -> Option<UserData> {
        self.userdata.lock().unwrap().clone()
    }

    // Buffers.

    pub fn recv_pipe(&self) -> &Mutex<BytePipe> {
        &self.recv
    }

    pub fn send_pipe(&self) -> &Mutex<BytePipe> {
        &self.send
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("fd", &self.fd())
            .field("mask", &self.mask())
            .finish()
    }
}
