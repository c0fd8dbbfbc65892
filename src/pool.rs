//! Bounded free-list of reusable per-session read buffers (C7).
//!
//! A session's only reusable allocation is its inbound read buffer; on
//! teardown it is returned here instead of being dropped, and the accept
//! loop checks this pool before allocating a fresh one (spec §4.6 point 3,
//! §5's "Session free-list: a bounded queue with non-blocking offer/poll").

use bytes::BytesMut;
use parking_lot::Mutex;

const POOL_CAPACITY: usize = 128;
const BUFFER_CAPACITY: usize = 4096;

/// A bounded, non-blocking free-list. `checkout` never waits (it falls back
/// to a fresh allocation); `release` never waits (it drops the buffer once
/// the pool is full).
pub struct SessionPool {
    slots: Mutex<Vec<BytesMut>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::with_capacity(POOL_CAPACITY)),
        }
    }

    pub fn checkout(&self) -> BytesMut {
        self.slots
            .lock()
            .pop()
            .unwrap_or_else(|| BytesMut::with_capacity(BUFFER_CAPACITY))
    }

    /// Returns `buf` to the pool, clearing it first. Dropped on overflow
    /// rather than growing the pool past capacity.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        let mut slots = self.slots.lock();
        if slots.len() < POOL_CAPACITY {
            slots.push(buf);
        }
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}
