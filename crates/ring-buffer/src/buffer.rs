//! Fixed-Capacity Circular Byte Buffer

use crate::BufferError;
use std::fmt::Write as _;

/// Default buffer capacity (256 bytes = 23 full frames)
pub const DEFAULT_CAPACITY: usize = 256;

/// Circular byte buffer with separate read and write cursors.
///
/// Not synchronized: one owner appends and consumes through `&mut self`.
/// Share it across threads only behind a lock.
pub struct RingBuffer {
    /// Pre-allocated storage
    storage: Box<[u8]>,
    /// Next byte to read
    head: usize,
    /// Next write position
    tail: usize,
    /// Bytes currently stored
    available: usize,
    /// Total bytes appended (for statistics)
    total_appended: usize,
    /// Total bytes removed, consumed or discarded (for statistics)
    total_removed: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with given capacity
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            head: 0,
            tail: 0,
            available: 0,
            total_appended: 0,
            total_removed: 0,
        }
    }

    /// Create a buffer with default capacity (256 bytes)
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Append `data`, wrapping around the end of storage.
    ///
    /// All or nothing: fails without writing when fewer than `data.len()`
    /// bytes are free.
    pub fn append(&mut self, data: &[u8]) -> Result<(), BufferError> {
        let free = self.free();
        if free < data.len() {
            return Err(BufferError::Overflow {
                requested: data.len(),
                free,
            });
        }

        let capacity = self.capacity();
        let part_1 = data.len().min(capacity - self.tail);
        let part_2 = data.len() - part_1;

        self.storage[self.tail..self.tail + part_1].copy_from_slice(&data[..part_1]);
        self.storage[..part_2].copy_from_slice(&data[part_1..]);

        self.tail = (self.tail + data.len()) % capacity;
        self.available += data.len();
        self.total_appended += data.len();
        Ok(())
    }

    /// Consume `out.len()` bytes from the head into `out`.
    ///
    /// Fails without moving the head when fewer bytes are stored.
    pub fn consume(&mut self, out: &mut [u8]) -> Result<(), BufferError> {
        self.peek(out)?;
        self.advance(out.len());
        Ok(())
    }

    /// Copy `out.len()` bytes from the head into `out` without consuming them
    pub fn peek(&self, out: &mut [u8]) -> Result<(), BufferError> {
        if self.available < out.len() {
            return Err(BufferError::Underflow {
                requested: out.len(),
                available: self.available,
            });
        }

        let part_1 = out.len().min(self.capacity() - self.head);
        let part_2 = out.len() - part_1;

        out[..part_1].copy_from_slice(&self.storage[self.head..self.head + part_1]);
        out[part_1..].copy_from_slice(&self.storage[..part_2]);
        Ok(())
    }

    /// Byte at the head, if any
    pub fn front(&self) -> Option<u8> {
        if self.available == 0 {
            None
        } else {
            Some(self.storage[self.head])
        }
    }

    /// Drop up to `count` bytes from the head, returning how many were dropped
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.available);
        self.advance(count);
        count
    }

    /// Discard bytes until `marker` is at the head.
    ///
    /// Scans at most the stored bytes. Returns true with the marker still
    /// stored; returns false with the buffer emptied when no marker is found.
    pub fn seek(&mut self, marker: u8) -> bool {
        while let Some(byte) = self.front() {
            if byte == marker {
                return true;
            }
            self.advance(1);
        }
        false
    }

    /// Iterate over stored bytes from head to tail
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.available).map(move |i| self.storage[(self.head + i) % self.capacity()])
    }

    /// Space-separated uppercase hex dump of the stored bytes
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(self.available * 3);
        for (i, byte) in self.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let _ = write!(out, "{:02X}", byte);
        }
        out
    }

    /// Get the number of bytes currently stored
    pub fn len(&self) -> usize {
        self.available
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.available == self.capacity()
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Free space in bytes
    pub fn free(&self) -> usize {
        self.capacity() - self.available
    }

    /// Read cursor position
    pub fn head(&self) -> usize {
        self.head
    }

    /// Write cursor position
    pub fn tail(&self) -> usize {
        self.tail
    }

    /// Get total bytes appended (for statistics)
    pub fn total_appended(&self) -> usize {
        self.total_appended
    }

    /// Get total bytes consumed or discarded (for statistics)
    pub fn total_removed(&self) -> usize {
        self.total_removed
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        let stored = self.available;
        self.advance(stored);
    }

    fn advance(&mut self, count: usize) {
        debug_assert!(count <= self.available);
        self.head = (self.head + count) % self.capacity();
        self.available -= count;
        self.total_removed += count;
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("available", &self.available)
            .finish()
    }
}
