//! Growable FIFO byte pipe.
//!
//! A `BytePipe` buffers bytes between the socket layer and application
//! callbacks: received bytes queue up until a callback consumes them, and
//! outgoing bytes queue up until the descriptor accepts them. Writes are
//! all-or-nothing; a failed grow leaves the pipe exactly as it was.

use crate::error::{CoreError, CoreResult};

/// Granularity of capacity growth. Every grow reserves this much beyond the
/// immediate need so steady trickles of small writes do not reallocate
/// per call.
pub const BUCKET_LEN: usize = 4096;

/// FIFO byte buffer with append, prepend, drain and scan operations.
#[derive(Debug, Default)]
pub struct BytePipe {
    data: Vec<u8>,
}

impl BytePipe {
    pub fn new() -> BytePipe {
        BytePipe { data: Vec::new() }
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Drop all buffered bytes, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    fn ensure(&mut self, extra: usize) -> CoreResult<()> {
        let needed = self.data.len().saturating_add(extra);
        if needed > self.data.capacity() {
            let grow = extra.saturating_add(BUCKET_LEN);
            self.data
                .try_reserve_exact(grow)
                .map_err(|_| CoreError::AllocFailed { requested: grow })?;
        }
        Ok(())
    }

    /// Append `bytes` to the tail. On allocation failure nothing is
    /// appended and the pipe is unchanged.
    pub fn write(&mut self, bytes: &[u8]) -> CoreResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.ensure(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Prepend `bytes` to the head, ahead of everything buffered. Used to
    /// put back the unsent remainder after a short write so ordering on the
    /// wire is preserved.
    pub fn write_head(&mut self, bytes: &[u8]) -> CoreResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.ensure(bytes.len())?;
        let old_len = self.data.len();
        self.data.resize(old_len + bytes.len(), 0);
        self.data.copy_within(..old_len, bytes.len());
        self.data[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Move up to `out.len()` bytes from the head into `out`, returning how
    /// many were moved. The remaining bytes shift to the front.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len());
        if n == 0 {
            return 0;
        }
        out[..n].copy_from_slice(&self.data[..n]);
        self.data.drain(..n);
        n
    }

    /// Position of the first occurrence of `marker`, if buffered.
    pub fn find_byte(&self, marker: u8) -> Option<usize> {
        self.data.iter().position(|&b| b == marker)
    }

    /// View of the buffered bytes without consuming them.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
