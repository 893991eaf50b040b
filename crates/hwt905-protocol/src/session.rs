//! HWT905 Device Session
//!
//! Owns the serial transport, the reassembly buffer and the measurement
//! record, and runs one request/response exchange at a time. The protocol is
//! half-duplex: a session never has more than one request in flight.

use crate::error::ImuError;
use crate::frame::{Frame, FrameReader, FRAME_LEN};
use crate::register::{Measurement, MeasurementRecord, RegisterFamily};
use crate::request::RequestCommand;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream,
    StopBits,
};
use tracing::{debug, info, warn};

/// Default response window
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Largest single read from the transport
const READ_CHUNK: usize = 64;

/// Counters for conditions that are diagnosed but never fatal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Frames decoded and applied to the record
    pub frames_decoded: u64,
    /// Frames dropped on checksum
    pub checksum_mismatches: u64,
    /// Valid frames of an unknown family
    pub unknown_registers: u64,
    /// Noise bytes skipped during synchronization
    pub noise_bytes: u64,
    /// Frames of another family received while waiting for a requested one
    pub stale_frames: u64,
}

/// A serial session with one HWT905
pub struct DeviceSession<T> {
    /// Device label for logs (e.g., "/dev/ttyUSB0")
    device: String,
    transport: T,
    reader: FrameReader,
    record: MeasurementRecord,
    stats: LinkStats,
}

impl DeviceSession<SerialStream> {
    /// Open `device` at `baud_rate`, 8N1 without flow control, and flush stale input
    pub fn open(device: &str, baud_rate: u32, capacity: usize) -> Result<Self, ImuError> {
        info!("Opening HWT905 on {} at {} baud", device, baud_rate);

        let port = tokio_serial::new(device, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        port.clear(ClearBuffer::Input)?;

        Ok(Self::with_label(port, capacity, device))
    }
}

impl<T> DeviceSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open transport
    pub fn new(transport: T, capacity: usize) -> Self {
        Self::with_label(transport, capacity, "stream")
    }

    fn with_label(transport: T, capacity: usize, device: &str) -> Self {
        Self {
            device: device.to_string(),
            transport,
            reader: FrameReader::new(capacity.max(FRAME_LEN)),
            record: MeasurementRecord::new(),
            stats: LinkStats::default(),
        }
    }

    /// Write one command in full
    pub async fn send(&mut self, command: &RequestCommand) -> Result<(), ImuError> {
        debug!("Sending {:02X?}", command.as_bytes());
        self.transport.write_all(command.as_bytes()).await?;
        self.transport.flush().await?;
        Ok(())
    }

    /// Send `command`, wait up to `timeout` for a valid frame, decode it and
    /// apply it to the record.
    ///
    /// Bytes left over from earlier exchanges are dropped first.
    pub async fn transact(
        &mut self,
        command: &RequestCommand,
        timeout: Duration,
    ) -> Result<Measurement, ImuError> {
        self.transact_expecting(command, None, timeout).await
    }

    /// Like [`transact`](Self::transact), but only a frame of `expected`
    /// completes the exchange.
    ///
    /// Frames of other families (a late answer to an earlier request still in
    /// flight) are applied to the record and collection continues until the
    /// same deadline.
    pub async fn transact_expecting(
        &mut self,
        command: &RequestCommand,
        expected: Option<RegisterFamily>,
        timeout: Duration,
    ) -> Result<Measurement, ImuError> {
        self.reader.clear();
        self.send(command).await?;

        let deadline = Instant::now() + timeout;
        loop {
            let frame = self.collect_until(deadline, timeout).await?;
            let measurement = self.decode_and_apply(&frame)?;
            match expected {
                Some(family) if measurement.family() != family => {
                    self.stats.stale_frames += 1;
                    debug!(
                        "Waiting for {:?} on {}, applied late {:?} frame",
                        family,
                        self.device,
                        measurement.family()
                    );
                }
                _ => return Ok(measurement),
            }
        }
    }

    /// Read one chunk of streamed output and decode every complete frame in it.
    ///
    /// Used when the sensor transmits continuously instead of on request.
    pub async fn pump(&mut self, timeout: Duration) -> Result<Vec<Measurement>, ImuError> {
        let deadline = Instant::now() + timeout;
        if !self.read_chunk(deadline, timeout).await? {
            return Err(ImuError::Timeout(timeout.as_millis() as u64));
        }

        let mut decoded = Vec::new();
        while let Some(frame) = self.drain_one()? {
            match self.decode_and_apply(&frame) {
                Ok(measurement) => decoded.push(measurement),
                Err(e) => warn!("Dropped streamed frame: {}", e),
            }
        }
        Ok(decoded)
    }

    /// Latest decoded values
    pub fn record(&self) -> &MeasurementRecord {
        &self.record
    }

    /// Diagnostic counters
    pub fn stats(&self) -> LinkStats {
        LinkStats {
            noise_bytes: self.reader.noise_discarded() as u64,
            ..self.stats
        }
    }

    /// Device label
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Bytes buffered but not yet framed
    pub fn pending(&self) -> usize {
        self.reader.pending()
    }

    /// Next valid frame from the buffer; checksum failures are counted and skipped
    fn drain_one(&mut self) -> Result<Option<Frame>, ImuError> {
        while let Some(result) = self.reader.next_frame() {
            match result {
                Ok(frame) => return Ok(Some(frame)),
                Err(ImuError::ChecksumMismatch { expected, actual }) => {
                    self.stats.checksum_mismatches += 1;
                    warn!(
                        "Checksum mismatch on {}: expected {:02X}, got {:02X}",
                        self.device, expected, actual
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Read until a checksum-valid frame is assembled or `deadline` passes.
    ///
    /// On timeout the partially collected bytes are discarded.
    async fn collect_until(
        &mut self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<Frame, ImuError> {
        loop {
            if let Some(frame) = self.drain_one()? {
                return Ok(frame);
            }
            if !self.read_chunk(deadline, timeout).await? {
                return Err(ImuError::Timeout(timeout.as_millis() as u64));
            }
        }
    }

    /// Append one transport read to the buffer. Returns false once `deadline` passes.
    async fn read_chunk(&mut self, deadline: Instant, timeout: Duration) -> Result<bool, ImuError> {
        let mut scratch = [0u8; READ_CHUNK];
        let max = self.reader.free().min(READ_CHUNK);

        let read = tokio::time::timeout_at(deadline, self.transport.read(&mut scratch[..max])).await;
        let n = match read {
            Ok(result) => result?,
            Err(_) => {
                debug!(
                    "No frame from {} within {:?}, dropping [{}]",
                    self.device,
                    timeout,
                    self.reader.pending_hex()
                );
                self.reader.clear();
                return Ok(false);
            }
        };

        if n == 0 {
            return Err(ImuError::Transport(format!("{} closed", self.device)));
        }
        self.reader.push(&scratch[..n])?;
        Ok(true)
    }

    fn decode_and_apply(&mut self, frame: &Frame) -> Result<Measurement, ImuError> {
        let measurement = Measurement::decode(frame).map_err(|e| {
            if let ImuError::UnknownRegister(id) = e {
                self.stats.unknown_registers += 1;
                debug!("Unknown frame {:02X?} (family {:02X})", frame.as_bytes(), id);
            }
            e
        })?;
        self.record.apply(&measurement);
        self.stats.frames_decoded += 1;
        Ok(measurement)
    }
}

impl<T> std::fmt::Debug for DeviceSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("device", &self.device)
            .field("reader", &self.reader)
            .field("stats", &self.stats)
            .finish()
    }
}
