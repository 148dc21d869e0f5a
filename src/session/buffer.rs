//! Output accumulation between reads.
//!
//! Each session owns one buffer. The watcher task appends chunks as they
//! arrive from the PTY; `take` drains everything accumulated so far and
//! resets the buffer. Without a configured cap the buffer grows without
//! bound between reads.

use std::mem;

/// Accumulated PTY output, drained destructively by reads.
#[derive(Debug)]
pub struct OutputBuffer {
    /// Bytes accumulated since the last take, in arrival order.
    data: Vec<u8>,

    /// Optional cap on `data`. `None` means unbounded growth.
    max_bytes: Option<usize>,

    /// Bytes discarded to the cap since the last take.
    dropped_since_take: u64,
}

impl OutputBuffer {
    /// Creates an empty buffer. A `max_bytes` of `None` means unbounded.
    pub fn new(max_bytes: Option<usize>) -> Self {
        Self {
            data: Vec::new(),
            max_bytes,
            dropped_since_take: 0,
        }
    }

    /// Appends a chunk, enforcing the cap if one is set.
    ///
    /// When the cap is exceeded the oldest bytes are discarded so the most
    /// recent output is what the next read observes. Returns the number of
    /// bytes dropped by this call.
    pub fn append(&mut self, chunk: &[u8]) -> u64 {
        self.data.extend_from_slice(chunk);

        if let Some(max) = self.max_bytes {
            if self.data.len() > max {
                let excess = self.data.len() - max;
                self.data.drain(..excess);
                self.dropped_since_take += excess as u64;
                return excess as u64;
            }
        }

        0
    }

    /// Takes the full contents, leaving the buffer empty.
    ///
    /// Also resets the dropped-byte counter; each read starts a fresh
    /// accounting window.
    pub fn take(&mut self) -> Vec<u8> {
        self.dropped_since_take = 0;
        mem::take(&mut self.data)
    }

    /// Bytes discarded to the cap since the last take.
    pub fn dropped_since_take(&self) -> u64 {
        self.dropped_since_take
    }

    /// Bytes currently accumulated.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns whether nothing is accumulated.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
