use bytes::BytesMut;
use tracing::trace;

use crate::core::queue::WorkQueue;

/// Worker-local stash of chunk buffers, refilled from the recycle queue.
///
/// Every buffer handed out has exactly `capacity` bytes reserved and a length
/// of zero. Buffers beyond `keep` are released instead of stashed.
#[derive(Debug)]
pub struct ChunkPool {
    capacity: usize,
    keep: usize,
    free: Vec<BytesMut>,
    allocated: u64,
}

impl ChunkPool {
    pub fn new(capacity: usize, keep: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            keep,
            free: Vec::with_capacity(keep),
            allocated: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn take(&mut self) -> BytesMut {
        match self.free.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => {
                self.allocated += 1;
                BytesMut::with_capacity(self.capacity)
            }
        }
    }

    /// Return a buffer directly; undersized ones (e.g. a split remnant) are dropped.
    pub fn give(&mut self, mut buf: BytesMut) {
        if self.free.len() >= self.keep || buf.capacity() < self.capacity {
            return;
        }
        buf.clear();
        self.free.push(buf);
    }

    /// Pull everything the coordinator has handed back.
    pub fn reclaim(&mut self, recycle: &WorkQueue<BytesMut>) -> usize {
        let mut n = 0;
        while let Some(buf) = recycle.try_pop() {
            self.give(buf);
            n += 1;
        }
        if n > 0 {
            trace!(reclaimed = n, stashed = self.free.len(), "recycled chunk buffers");
        }
        n
    }

    pub fn stashed(&self) -> usize {
        self.free.len()
    }

    /// Buffers created from scratch so far.
    pub fn allocated(&self) -> u64 {
        self.allocated
    }
}
