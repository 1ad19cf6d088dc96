//! Read-side staging buffer for the session's reader.
//!
//! A contiguous byte region with a consume cursor and a produce cursor.
//! The readable region is always one flat slice so the parser never has to
//! stitch a frame across a wrap-around; instead of wrapping, unread bytes
//! are compacted to the front when tail space runs short, and the backing
//! storage doubles (up to a safety cap) when compaction is not enough.

use crate::errors::ErrorKind;
use crate::types::RedisResult;

/// Growth ceiling. A frame that needs more buffered bytes than this fails
/// the connection with `BufferOverflow`.
const MAX_CAPACITY: usize = 16 * 1024 * 1024;

/// Compact instead of growing whenever the unread prefix is at least this
/// large; reclaiming it usually frees enough tail space.
const COMPACT_THRESHOLD: usize = 4096;

pub(crate) struct RingBuffer {
    buf: Vec<u8>,
    read_head: usize,
    write_head: usize,
}

impl RingBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> RingBuffer {
        RingBuffer {
            buf: vec![0; capacity.clamp(64, MAX_CAPACITY)],
            read_head: 0,
            write_head: 0,
        }
    }

    /// Unread bytes, as one contiguous span.
    pub(crate) fn readable(&self) -> &[u8] {
        &self.buf[self.read_head..self.write_head]
    }

    /// Marks `n` readable bytes as consumed. Consumed bytes are gone from
    /// [`readable`](Self::readable) immediately.
    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(self.read_head + n <= self.write_head);
        self.read_head += n;
        if self.read_head == self.write_head {
            self.read_head = 0;
            self.write_head = 0;
        }
    }

    /// Returns a writable span of at least `min` bytes, compacting or
    /// growing as needed. Fails with `BufferOverflow` once satisfying the
    /// request would exceed the capacity cap.
    pub(crate) fn writable(&mut self, min: usize) -> RedisResult<&mut [u8]> {
        if self.tail_space() < min {
            self.reclaim(min)?;
        }
        Ok(&mut self.buf[self.write_head..])
    }

    /// Marks `n` bytes of the writable span as produced.
    pub(crate) fn produce(&mut self, n: usize) {
        debug_assert!(self.write_head + n <= self.buf.len());
        self.write_head += n;
    }

    fn tail_space(&self) -> usize {
        self.buf.len() - self.write_head
    }

    fn len(&self) -> usize {
        self.write_head - self.read_head
    }

    fn reclaim(&mut self, min: usize) -> RedisResult<()> {
        // Move the unread bytes to the front first; growth only happens
        // when the frame genuinely needs more room than the whole buffer.
        if self.read_head > 0 && (self.read_head >= COMPACT_THRESHOLD || self.len() + min <= self.buf.len())
        {
            self.buf.copy_within(self.read_head..self.write_head, 0);
            self.write_head -= self.read_head;
            self.read_head = 0;
        }
        while self.tail_space() < min {
            let new_capacity = (self.buf.len() * 2).max(self.len() + min);
            if new_capacity > MAX_CAPACITY {
                fail!((
                    ErrorKind::BufferOverflow,
                    "Receive buffer exceeded safety cap"
                ));
            }
            self.buf.resize(new_capacity, 0);
        }
        Ok(())
    }
}
