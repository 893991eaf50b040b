//! HWT905 Serial Protocol Implementation
//!
//! This crate speaks the HWT905 9-axis IMU binary protocol: 5-byte
//! configuration/read commands out, 11-byte checksummed frames back.
//! It covers frame synchronization over an arbitrarily chunked byte
//! stream, checksum validation, register decoding and request encoding.

pub mod checksum;
mod error;
mod frame;
mod register;
mod request;
mod session;

pub use error::ImuError;
pub use frame::{advance_to_start, encode_frame, Frame, FrameReader, FRAME_LEN, START_BYTE};
pub use register::{GroupMask, Measurement, MeasurementRecord, RegisterFamily, SensorTime, G};
pub use request::{
    init_sequence, BaudRate, CalibrationMode, OutputRate, Register, RequestCommand, REQUEST_LEN,
};
pub use session::{DeviceSession, LinkStats, DEFAULT_TIMEOUT_MS};

/// Re-exported so callers can name the serial transport type
pub use tokio_serial::SerialStream;
