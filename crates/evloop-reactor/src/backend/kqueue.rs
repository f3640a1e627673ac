//! `kevent(2)` backend for the BSDs.
//!
//! Registrations occupy slots in a fixed table so the backend knows which
//! (descriptor, filter) pairs are live and can retract them later. New
//! registrations are submitted to the kernel in one batch per call.
//!
//! kqueue has no separate error set. Error interest needs no registration
//! of its own: failed descriptors come back flagged `EV_ERROR` on their
//! read/write filters and are reported as `ERROR` events, and a peer
//! hangup comes back flagged `EV_EOF` and is reported as `CLOSE`.

use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr;
use std::time::Duration;

use evloop_core::{Channel, ChannelRegistry, FdMask};
use nix::errno::Errno;

use crate::backend::{IoEvent, MultiplexBackend};
use crate::error::{ReactorError, ReactorResult};

const SLOT_CAPACITY: usize = 1024;
const WAIT_BATCH: usize = 64;

const FREE: RawFd = -1;

#[derive(Clone, Copy)]
struct Slot {
    fd: RawFd,
    filter: i16,
}

pub struct KqueueBackend {
    kq: OwnedFd,
    slots: Vec<Slot>,
}

fn timespec_from(d: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    }
}

fn change_event(fd: RawFd, filter: i16, flags: u16) -> libc::kevent {
    let mut ev: libc::kevent = unsafe { mem::zeroed() };
    ev.ident = fd as libc::uintptr_t;
    ev.filter = filter;
    ev.flags = flags;
    ev
}

fn wanted_filters(mask: FdMask) -> Vec<i16> {
    let mut filters = Vec::with_capacity(2);
    if mask.contains(FdMask::READ) {
        filters.push(libc::EVFILT_READ as i16);
    }
    if mask.contains(FdMask::WRITE) {
        filters.push(libc::EVFILT_WRITE as i16);
    }
    filters
}

impl KqueueBackend {
    pub fn new() -> ReactorResult<KqueueBackend> {
        let kq = unsafe { libc::kqueue() };
        if kq < 0 {
            return Err(ReactorError::Os(Errno::last()));
        }
        Ok(KqueueBackend {
            kq: unsafe { OwnedFd::from_raw_fd(kq) },
            slots: vec![Slot { fd: FREE, filter: 0 }; SLOT_CAPACITY],
        })
    }

    fn slot_of(&self, fd: RawFd, filter: i16) -> Option<usize> {
        self.slots.iter().position(|s| s.fd == fd && s.filter == filter)
    }

    fn free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| s.fd == FREE)
    }

    fn submit(&self, changes: &[libc::kevent]) -> ReactorResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                changes.as_ptr(),
                changes.len() as libc::c_int,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            return Err(ReactorError::Os(Errno::last()));
        }
        Ok(())
    }
}

impl MultiplexBackend for KqueueBackend {
    fn add_interest(&mut self, channel: &Channel) -> ReactorResult<()> {
        let fd = channel.fd();
        if fd < 0 {
            return Err(ReactorError::DescriptorRange(fd));
        }

        let mut claimed = Vec::new();
        let mut changes = Vec::new();
        for filter in wanted_filters(channel.mask()) {
            if self.slot_of(fd, filter).is_some() {
                continue;
            }
            let Some(idx) = self.free_slot() else {
                for idx in claimed {
                    self.slots[idx].fd = FREE;
                }
                return Err(ReactorError::BackendFull);
            };
            self.slots[idx] = Slot { fd, filter };
            claimed.push(idx);
            changes.push(change_event(fd, filter, libc::EV_ADD));
        }

        if let Err(e) = self.submit(&changes) {
            for idx in claimed {
                self.slots[idx].fd = FREE;
            }
            return Err(e);
        }
        Ok(())
    }

    fn remove_interest(&mut self, channel: &Channel) -> ReactorResult<()> {
        let fd = channel.fd();
        for filter in wanted_filters(channel.mask()) {
            let Some(idx) = self.slot_of(fd, filter) else {
                continue;
            };
            // ENOENT just means the kernel already forgot it, e.g. after
            // the descriptor was closed.
            match self.submit(&[change_event(fd, filter, libc::EV_DELETE)]) {
                Ok(()) | Err(ReactorError::Os(Errno::ENOENT)) => {}
                Err(e) => return Err(e),
            }
            self.slots[idx].fd = FREE;
        }
        Ok(())
    }

    fn poll(
        &mut self,
        registry: &ChannelRegistry,
        timeout: Duration,
        out: &mut Vec<IoEvent>,
    ) -> ReactorResult<usize> {
        if registry.is_empty() {
            return Ok(0);
        }

        let zero: libc::kevent = unsafe { mem::zeroed() };
        let mut ready = [zero; WAIT_BATCH];
        let ts = timespec_from(timeout);

        let rc = unsafe {
            libc::kevent(
                self.kq.as_raw_fd(),
                ptr::null(),
                0,
                ready.as_mut_ptr(),
                WAIT_BATCH as libc::c_int,
                &ts,
            )
        };
        if rc < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(0),
                e => Err(ReactorError::Os(e)),
            };
        }

        let before = out.len();
        for ev in &ready[..rc as usize] {
            let fd = ev.ident as RawFd;
            if ev.flags & libc::EV_ERROR != 0 {
                out.push(IoEvent { fd, mask: FdMask::ERROR });
            } else if ev.flags & libc::EV_EOF != 0 {
                out.push(IoEvent { fd, mask: FdMask::CLOSE });
            } else if ev.filter == libc::EVFILT_READ as i16 {
                out.push(IoEvent { fd, mask: FdMask::READ });
            } else if ev.filter == libc::EVFILT_WRITE as i16 {
                out.push(IoEvent { fd, mask: FdMask::WRITE });
            }
        }
        Ok(out.len() - before)
    }
}
