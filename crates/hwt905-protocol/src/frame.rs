//! Frame Layout and Stream Synchronization
//!
//! Every sensor response is an 11-byte frame:
//! `[0x55, family, payload(8), checksum]`. The serial link has no other
//! framing, so resynchronization after a dropped or corrupted byte is a
//! byte-by-byte search for the start marker.

use crate::checksum;
use crate::error::ImuError;
use ring_buffer::RingBuffer;
use tracing::{debug, trace};

/// Frame start marker
pub const START_BYTE: u8 = 0x55;

/// Length of every sensor frame
pub const FRAME_LEN: usize = 11;

/// A length-checked, checksum-verified sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Validate length, start marker and checksum
    pub fn parse(bytes: &[u8]) -> Result<Self, ImuError> {
        let bytes: [u8; FRAME_LEN] = bytes
            .try_into()
            .map_err(|_| ImuError::InvalidLength(bytes.len()))?;
        if bytes[0] != START_BYTE {
            return Err(ImuError::MissingStartByte(bytes[0]));
        }
        checksum::check(&bytes)?;
        Ok(Self { bytes })
    }

    /// Register family id (byte 1)
    pub fn register_id(&self) -> u8 {
        self.bytes[1]
    }

    /// The eight payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..FRAME_LEN - 1]
    }

    /// Trailing checksum byte
    pub fn checksum(&self) -> u8 {
        self.bytes[FRAME_LEN - 1]
    }

    /// Payload byte `index` (0..8)
    pub fn byte(&self, index: usize) -> u8 {
        self.payload()[index]
    }

    /// Little-endian signed word `index` (0..4) of the payload
    pub fn word_i16(&self, index: usize) -> i16 {
        i16::from_le_bytes(self.word_bytes(index))
    }

    /// Little-endian unsigned word `index` (0..4) of the payload
    pub fn word_u16(&self, index: usize) -> u16 {
        u16::from_le_bytes(self.word_bytes(index))
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    fn word_bytes(&self, index: usize) -> [u8; 2] {
        let payload = self.payload();
        [payload[index * 2], payload[index * 2 + 1]]
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = ImuError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Frame::parse(bytes)
    }
}

/// Build a frame for `family` from its four payload words, appending the checksum
pub fn encode_frame(family: u8, words: [u16; 4]) -> [u8; FRAME_LEN] {
    let mut bytes = [0u8; FRAME_LEN];
    bytes[0] = START_BYTE;
    bytes[1] = family;
    for (i, word) in words.iter().enumerate() {
        bytes[2 + i * 2..4 + i * 2].copy_from_slice(&word.to_le_bytes());
    }
    bytes[FRAME_LEN - 1] = checksum::compute(&bytes[..FRAME_LEN - 1]);
    bytes
}

/// Discard noise until a start marker is at the head of `buffer`.
///
/// Discarded bytes are lost. Returns false, with the buffer emptied, when no
/// marker is stored.
pub fn advance_to_start(buffer: &mut RingBuffer) -> bool {
    let before = buffer.len();
    let found = buffer.seek(START_BYTE);
    let discarded = before - buffer.len();
    if discarded > 0 {
        trace!(discarded, found, "Discarded framing noise");
    }
    found
}

/// Reassembles frames from arbitrarily chunked serial reads
#[derive(Debug)]
pub struct FrameReader {
    buffer: RingBuffer,
    noise_discarded: usize,
}

impl FrameReader {
    /// Create a reader backed by a ring buffer of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            noise_discarded: 0,
        }
    }

    /// Append raw bytes from the transport
    pub fn push(&mut self, data: &[u8]) -> Result<(), ImuError> {
        self.buffer.append(data)?;
        Ok(())
    }

    /// Pull the next complete frame out of the buffered stream.
    ///
    /// Returns `None` until a whole frame is buffered. A checksum failure
    /// drops only the start byte so a frame starting inside the rejected
    /// window is still found on the next call.
    pub fn next_frame(&mut self) -> Option<Result<Frame, ImuError>> {
        let before = self.buffer.len();
        let found = advance_to_start(&mut self.buffer);
        self.noise_discarded += before - self.buffer.len();
        if !found || self.buffer.len() < FRAME_LEN {
            return None;
        }

        let mut window = [0u8; FRAME_LEN];
        if let Err(e) = self.buffer.peek(&mut window) {
            return Some(Err(e.into()));
        }

        match Frame::parse(&window) {
            Ok(frame) => {
                self.buffer.discard(FRAME_LEN);
                Some(Ok(frame))
            }
            Err(e) => {
                debug!("Rejected frame {:02X?}: {}", window, e);
                self.buffer.discard(1);
                Some(Err(e))
            }
        }
    }

    /// Free space for the next read
    pub fn free(&self) -> usize {
        self.buffer.free()
    }

    /// Bytes buffered but not yet framed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Hex dump of the buffered bytes
    pub fn pending_hex(&self) -> String {
        self.buffer.to_hex()
    }

    /// Total noise bytes dropped while searching for start markers
    pub fn noise_discarded(&self) -> usize {
        self.noise_discarded
    }

    /// Drop everything buffered
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
