//! Additive Frame Checksum

use crate::error::ImuError;

/// 8-bit wrapping sum of `bytes`
pub fn compute(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &x| acc.wrapping_add(x))
}

/// Check a whole frame: the sum of every byte but the last must equal the last.
///
/// An empty slice has no trailer and never verifies.
pub fn verify(frame: &[u8]) -> bool {
    check(frame).is_ok()
}

/// Like [`verify`], reporting the mismatching values
pub fn check(frame: &[u8]) -> Result<(), ImuError> {
    let (&expected, body) = frame.split_last().ok_or(ImuError::InvalidLength(0))?;
    let actual = compute(body);
    if actual != expected {
        return Err(ImuError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
