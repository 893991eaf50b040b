//! HWT905 Error Types

use ring_buffer::BufferError;
use thiserror::Error;

/// Errors that can occur during HWT905 communication.
///
/// None of these is fatal to a polling loop; the next cycle retries.
#[derive(Debug, Error)]
pub enum ImuError {
    /// Serial port read/write failure or short write
    #[error("Serial transport error: {0}")]
    Transport(String),

    /// No valid frame assembled within the response window
    #[error("Timeout waiting for HWT905 response after {0}ms")]
    Timeout(u64),

    /// Frame trailer does not match the additive checksum
    #[error("Checksum mismatch: expected {expected:02X}, got {actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    /// Frame carries a register family this decoder does not know
    #[error("Unknown register family {0:02X}")]
    UnknownRegister(u8),

    /// Input is not exactly one frame long
    #[error("Invalid frame length: expected 11 bytes, got {0}")]
    InvalidLength(usize),

    /// First frame byte is not the start marker
    #[error("Missing start byte: got {0:02X}")]
    MissingStartByte(u8),

    /// Reassembly buffer rejected a read or write
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

impl ImuError {
    /// Whether this error should stop the caller.
    ///
    /// Always false: transport setup failures surface before a session exists.
    pub fn is_fatal(&self) -> bool {
        false
    }

    /// Whether this error came from the wire contents rather than the link
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            ImuError::ChecksumMismatch { .. }
                | ImuError::UnknownRegister(_)
                | ImuError::InvalidLength(_)
                | ImuError::MissingStartByte(_)
        )
    }
}

impl From<std::io::Error> for ImuError {
    fn from(err: std::io::Error) -> Self {
        ImuError::Transport(err.to_string())
    }
}

impl From<tokio_serial::Error> for ImuError {
    fn from(err: tokio_serial::Error) -> Self {
        ImuError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ImuError::ChecksumMismatch {
            expected: 0x0A,
            actual: 0xF0,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0A, got F0");
        assert_eq!(
            ImuError::UnknownRegister(0x5F).to_string(),
            "Unknown register family 5F"
        );
    }

    #[test]
    fn test_classification() {
        assert!(ImuError::UnknownRegister(0x60).is_decode_error());
        assert!(!ImuError::Timeout(500).is_decode_error());
        assert!(!ImuError::Transport("closed".into()).is_fatal());
    }
}
