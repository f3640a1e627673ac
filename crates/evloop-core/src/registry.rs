//! Insertion-ordered channel registry.
//!
//! One registry per reactor thread. Lookups are linear; the collection is
//! expected to stay small enough (hundreds of descriptors) that a scan
//! beats hashing, and insertion order is what dispatch order is defined in
//! terms of.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::channel::Channel;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Default, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Arc<Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> ChannelRegistry {
        ChannelRegistry { channels: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Register a channel. Each descriptor may appear at most once.
    pub fn add(&mut self, channel: Arc<Channel>) -> CoreResult<()> {
        let fd = channel.fd();
        if self.find(fd).is_some() {
            return Err(CoreError::DuplicateDescriptor(fd));
        }
        self.channels.push(channel);
        Ok(())
    }

    /// Deregister by descriptor, returning the channel if it was present.
    pub fn remove(&mut self, fd: RawFd) -> Option<Arc<Channel>> {
        let pos = self.channels.iter().position(|c| c.fd() == fd)?;
        Some(self.channels.remove(pos))
    }

    pub fn find(&self, fd: RawFd) -> Option<&Arc<Channel>> {
        self.channels.iter().find(|c| c.fd() == fd)
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        self.find(fd).is_some()
    }

    /// Highest registered descriptor, or -1 when empty.
    pub fn max_fd(&self) -> RawFd {
        self.channels.iter().map(|c| c.fd()).max().unwrap_or(-1)
    }

    /// Channels in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Channel>> {
        self.channels.iter()
    }
}
