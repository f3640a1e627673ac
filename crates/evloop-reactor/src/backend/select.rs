//! `select(2)` backend.
//!
//! Keeps three live descriptor sets (read, write, error) that registrations
//! mutate directly. Each poll copies the live sets into working copies,
//! because `select` destroys its arguments. The highest descriptor is
//! recomputed lazily: registrations only flag the cached value dirty.

use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

use evloop_core::{Channel, ChannelRegistry, FdMask};
use nix::errno::Errno;

use crate::backend::{IoEvent, MultiplexBackend};
use crate::error::{ReactorError, ReactorResult};

pub struct SelectBackend {
    read_set: libc::fd_set,
    write_set: libc::fd_set,
    error_set: libc::fd_set,
    max_fd: RawFd,
    dirty: bool,
}

fn empty_set() -> libc::fd_set {
    unsafe {
        let mut set = mem::zeroed::<libc::fd_set>();
        libc::FD_ZERO(&mut set);
        set
    }
}

fn timeval_from(d: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: d.as_secs() as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    }
}

fn in_range(fd: RawFd) -> bool {
    fd >= 0 && fd < libc::FD_SETSIZE as RawFd
}

impl SelectBackend {
    pub fn new() -> SelectBackend {
        SelectBackend {
            read_set: empty_set(),
            write_set: empty_set(),
            error_set: empty_set(),
            max_fd: -1,
            dirty: false,
        }
    }
}

impl Default for SelectBackend {
    fn default() -> SelectBackend {
        SelectBackend::new()
    }
}

impl MultiplexBackend for SelectBackend {
    fn add_interest(&mut self, channel: &Channel) -> ReactorResult<()> {
        let fd = channel.fd();
        if !in_range(fd) {
            return Err(ReactorError::DescriptorRange(fd));
        }
        let mask = channel.mask();
        unsafe {
            if mask.contains(FdMask::READ) {
                libc::FD_SET(fd, &mut self.read_set);
            }
            if mask.contains(FdMask::WRITE) {
                libc::FD_SET(fd, &mut self.write_set);
            }
            if mask.contains(FdMask::ERROR) {
                libc::FD_SET(fd, &mut self.error_set);
            }
        }
        self.dirty = true;
        Ok(())
    }

    fn remove_interest(&mut self, channel: &Channel) -> ReactorResult<()> {
        let fd = channel.fd();
        if !in_range(fd) {
            return Ok(());
        }
        let mask = channel.mask();
        unsafe {
            if mask.contains(FdMask::READ) {
                libc::FD_CLR(fd, &mut self.read_set);
            }
            if mask.contains(FdMask::WRITE) {
                libc::FD_CLR(fd, &mut self.write_set);
            }
            if mask.contains(FdMask::ERROR) {
                libc::FD_CLR(fd, &mut self.error_set);
            }
        }
        self.dirty = true;
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
        if self.dirty {
            self.max_fd = registry.max_fd();
            self.dirty = false;
        }

        let mut read_ready = self.read_set;
        let mut write_ready = self.write_set;
        let mut error_ready = self.error_set;
        let mut tv = timeval_from(timeout);

        let rc = unsafe {
            libc::select(
                self.max_fd + 1,
                &mut read_ready,
                &mut write_ready,
                &mut error_ready,
                &mut tv,
            )
        };
        if rc < 0 {
            return match Errno::last() {
                Errno::EINTR => Ok(0),
                // A watched descriptor was closed out from under us. The
                // registration queue will catch up next cycle.
                Errno::EBADF => {
                    self.dirty = true;
                    Ok(0)
                }
                e => Err(ReactorError::Os(e)),
            };
        }
        if rc == 0 {
            return Ok(0);
        }

        let before = out.len();
        for channel in registry.iter() {
            let fd = channel.fd();
            if !in_range(fd) {
                continue;
            }
            unsafe {
                if libc::FD_ISSET(fd, &mut read_ready) {
                    out.push(IoEvent { fd, mask: FdMask::READ });
                }
                if libc::FD_ISSET(fd, &mut write_ready) {
                    out.push(IoEvent { fd, mask: FdMask::WRITE });
                }
                if libc::FD_ISSET(fd, &mut error_ready) {
                    out.push(IoEvent { fd, mask: FdMask::ERROR });
                }
            }
        }
        Ok(out.len() - before)
    }
}
