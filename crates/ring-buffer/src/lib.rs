//! Circular Byte Buffer
//!
//! Provides a fixed-capacity ring buffer that reassembles arbitrarily
//! chunked serial reads into a contiguous logical byte stream.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};

use thiserror::Error;

/// Errors from append/consume; a failed call never mutates the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Not enough free space for the whole write
    #[error("Buffer overflow: {requested} bytes requested, {free} free")]
    Overflow { requested: usize, free: usize },

    /// Not enough stored bytes for the whole read
    #[error("Buffer underflow: {requested} bytes requested, {available} available")]
    Underflow { requested: usize, available: usize },
}
