//! Polling Driver Implementation

use hwt905_protocol::{
    DeviceSession, ImuError, MeasurementRecord, RegisterFamily, RequestCommand,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// How the driver obtains frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollMode {
    /// One read request per family, one response each
    #[default]
    Poll,
    /// Sensor transmits continuously; decode whatever arrives
    Stream,
}

/// Configuration for the polling driver
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Response window per request, measured from send time (default: 500ms)
    pub response_timeout: Duration,
    /// Pause between rounds (default: 100ms)
    pub idle_interval: Duration,
    /// Pause after a configuration write (default: 100ms)
    pub config_settle: Duration,
    /// Families requested each round, in order
    pub families: Vec<RegisterFamily>,
    /// Capacity of the ad-hoc command queue
    pub queue_depth: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(500),
            idle_interval: Duration::from_millis(100),
            config_settle: Duration::from_millis(100),
            families: RegisterFamily::POLL_ORDER.to_vec(),
            queue_depth: 32,
        }
    }
}

impl PollerConfig {
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Families to poll each round. Families a read request cannot select
    /// (quaternion) are dropped.
    pub fn with_families(mut self, families: Vec<RegisterFamily>) -> Self {
        self.families = families;
        self.retain_pollable();
        self
    }

    fn retain_pollable(&mut self) {
        self.families.retain(|family| {
            if !family.is_pollable() {
                warn!("{:?} cannot be polled; enable it in streaming output instead", family);
            }
            family.is_pollable()
        });
    }
}

/// Errors from the command queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PollerError {
    #[error("Command queue is full")]
    QueueFull,

    #[error("Poller has shut down")]
    Closed,
}

/// Result of one request/response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A valid frame was decoded into the record
    Decoded(RegisterFamily),
    /// Command written; no response expected
    Sent,
    /// No valid frame within the response window
    TimedOut,
    /// Valid frame of an unknown family
    Rejected,
    /// Serial read or write failed
    TransportFailed,
}

/// Running counters, logged at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    pub rounds: u64,
    pub requests: u64,
    pub decoded: u64,
    pub timeouts: u64,
    pub rejected: u64,
    pub transport_errors: u64,
    pub commands: u64,
}

/// FIFO handle for one-off commands, drained after each polling round
#[derive(Debug, Clone)]
pub struct CommandQueue {
    tx: mpsc::Sender<RequestCommand>,
}

impl CommandQueue {
    /// Queue `command` without waiting
    pub fn enqueue(&self, command: RequestCommand) -> Result<(), PollerError> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PollerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PollerError::Closed,
        })
    }

    /// Queue `command`, waiting for room
    pub async fn send(&self, command: RequestCommand) -> Result<(), PollerError> {
        self.tx.send(command).await.map_err(|_| PollerError::Closed)
    }
}

/// Drives a device session and publishes every decoded update
pub struct Poller<T> {
    session: DeviceSession<T>,
    config: PollerConfig,
    commands: mpsc::Receiver<RequestCommand>,
    publisher: watch::Sender<MeasurementRecord>,
    stats: PollerStats,
}

impl<T> Poller<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Create a poller, its command queue handle, and a reader of the latest record
    pub fn new(
        session: DeviceSession<T>,
        mut config: PollerConfig,
    ) -> (Self, CommandQueue, watch::Receiver<MeasurementRecord>) {
        config.retain_pollable();
        let (tx, commands) = mpsc::channel(config.queue_depth.max(1));
        let (publisher, subscriber) = watch::channel(session.record().clone());

        info!(
            "Poller created for {} with {} families",
            session.device(),
            config.families.len()
        );

        let poller = Self {
            session,
            config,
            commands,
            publisher,
            stats: PollerStats::default(),
        };
        (poller, CommandQueue { tx }, subscriber)
    }

    /// Request every configured family once, then drain queued commands
    pub async fn poll_round(&mut self) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::with_capacity(self.config.families.len());

        for i in 0..self.config.families.len() {
            let family = self.config.families[i];
            if let Some(command) = RequestCommand::read_family(family) {
                outcomes.push(self.cycle(command, Some(family)).await);
            }
        }
        outcomes.extend(self.drain_commands().await);

        self.stats.rounds += 1;
        outcomes
    }

    /// Poll forever, pausing between rounds. Cancel by dropping the future.
    pub async fn run(&mut self) {
        info!("Starting HWT905 polling on {}", self.session.device());
        loop {
            self.poll_round().await;
            tokio::time::sleep(self.config.idle_interval).await;
        }
    }

    /// Decode one chunk of streamed output, then drain queued commands
    pub async fn stream_once(&mut self) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();

        match self.session.pump(self.config.response_timeout).await {
            Ok(measurements) => {
                if !measurements.is_empty() {
                    self.stats.decoded += measurements.len() as u64;
                    self.publish();
                }
                outcomes.extend(measurements.iter().map(|m| CycleOutcome::Decoded(m.family())));
            }
            Err(e) => outcomes.push(self.record_failure(e, None)),
        }
        outcomes.extend(self.drain_commands().await);
        outcomes
    }

    /// Decode streamed output forever. Cancel by dropping the future.
    pub async fn run_stream(&mut self) {
        info!("Starting HWT905 stream decoding on {}", self.session.device());
        loop {
            let outcomes = self.stream_once().await;
            if outcomes.contains(&CycleOutcome::TransportFailed) {
                tokio::time::sleep(self.config.idle_interval).await;
            }
        }
    }

    /// Run in the given mode until cancelled
    pub async fn run_mode(&mut self, mode: PollMode) {
        match mode {
            PollMode::Poll => self.run().await,
            PollMode::Stream => self.run_stream().await,
        }
    }

    /// Counters so far
    pub fn stats(&self) -> PollerStats {
        self.stats
    }

    /// The underlying session
    pub fn session(&self) -> &DeviceSession<T> {
        &self.session
    }

    async fn drain_commands(&mut self) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            self.stats.commands += 1;
            outcomes.push(self.cycle(command, None).await);
        }
        outcomes
    }

    async fn cycle(
        &mut self,
        command: RequestCommand,
        requested: Option<RegisterFamily>,
    ) -> CycleOutcome {
        self.stats.requests += 1;

        if !command.expects_response() {
            return match self.session.send(&command).await {
                Ok(()) => {
                    debug!("Sent {:02X?}", command.as_bytes());
                    tokio::time::sleep(self.config.config_settle).await;
                    CycleOutcome::Sent
                }
                Err(e) => self.record_failure(e, Some(&command)),
            };
        }

        let updates = self.session.record().updates;
        let result = self
            .session
            .transact_expecting(&command, requested, self.config.response_timeout)
            .await;
        // Late frames of other families may have been applied even on failure
        if self.session.record().updates != updates {
            self.publish();
        }

        match result {
            Ok(measurement) => {
                self.stats.decoded += 1;
                CycleOutcome::Decoded(measurement.family())
            }
            Err(e) => self.record_failure(e, Some(&command)),
        }
    }

    fn record_failure(&mut self, err: ImuError, command: Option<&RequestCommand>) -> CycleOutcome {
        let request = command.map(|c| format!("{:02X?}", c.as_bytes())).unwrap_or_default();
        match err {
            ImuError::Timeout(ms) => {
                self.stats.timeouts += 1;
                warn!("No response from {} within {}ms {}", self.session.device(), ms, request);
                CycleOutcome::TimedOut
            }
            e if e.is_decode_error() => {
                self.stats.rejected += 1;
                warn!("Rejected response {}: {}", request, e);
                CycleOutcome::Rejected
            }
            e => {
                self.stats.transport_errors += 1;
                error!("Transport error on {}: {}", self.session.device(), e);
                CycleOutcome::TransportFailed
            }
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.session.record().clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwt905_protocol::{encode_frame, REQUEST_LEN};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn frame_for(mask: u8) -> Option<[u8; 11]> {
        match mask {
            0x01 => Some(encode_frame(0x50, [0x0518, 0x0D11, 0x092A, 512])),
            0x02 => Some(encode_frame(0x51, [0, 0, 16384, 2600])),
            0x04 => Some(encode_frame(0x52, [8192, 0, 0, 2650])),
            0x08 => Some(encode_frame(0x53, [0, 16384, 0, 0x1F40])),
            0x10 => Some(encode_frame(0x54, [1000, 2000, 3000, 0])),
            _ => None,
        }
    }

    /// Answers read requests with a canned frame and reports every request seen
    fn spawn_sensor(mut port: DuplexStream) -> mpsc::UnboundedReceiver<[u8; REQUEST_LEN]> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut request = [0u8; REQUEST_LEN];
            while port.read_exact(&mut request).await.is_ok() {
                let _ = tx.send(request);
                if request[2] == 0x02 && request[4] == 0x00 {
                    if let Some(frame) = frame_for(request[3]) {
                        if port.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });
        rx
    }

    fn poller(
        config: PollerConfig,
    ) -> (
        Poller<DuplexStream>,
        CommandQueue,
        watch::Receiver<MeasurementRecord>,
        DuplexStream,
    ) {
        let (client, sensor) = tokio::io::duplex(256);
        let (poller, queue, rx) = Poller::new(DeviceSession::new(client, 256), config);
        (poller, queue, rx, sensor)
    }

    #[test]
    fn test_default_config() {
        let config = PollerConfig::default();
        assert_eq!(config.families, RegisterFamily::POLL_ORDER.to_vec());
        assert_eq!(config.response_timeout, Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_polls_families_in_order() {
        let (mut poller, _queue, rx, sensor) = poller(PollerConfig::default());
        let mut requests = spawn_sensor(sensor);

        let outcomes = poller.poll_round().await;
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Decoded(RegisterFamily::Time),
                CycleOutcome::Decoded(RegisterFamily::Acceleration),
                CycleOutcome::Decoded(RegisterFamily::AngularVelocity),
                CycleOutcome::Decoded(RegisterFamily::Angle),
                CycleOutcome::Decoded(RegisterFamily::Magnetic),
            ]
        );

        let masks: Vec<u8> = std::iter::from_fn(|| requests.try_recv().ok())
            .map(|r| r[3])
            .collect();
        assert_eq!(masks, vec![0x01, 0x02, 0x04, 0x08, 0x10]);

        let record = rx.borrow().clone();
        assert_eq!(record.updates, 5);
        assert_eq!(record.time.minute, 0x2A);
        assert!((record.angular_velocity[0] - 500.0).abs() < 1e-9);
        assert!((record.temperature - 26.5).abs() < 1e-9);
        assert_eq!(record.magnetic, [1000, 2000, 3000]);
        assert_eq!(poller.stats().decoded, 5);
        assert_eq!(poller.stats().rounds, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_sensor_times_out_once_per_cycle() {
        let config = PollerConfig::default().with_families(vec![RegisterFamily::Acceleration]);
        let (mut poller, _queue, rx, _sensor) = poller(config);

        let started = tokio::time::Instant::now();
        let outcomes = poller.poll_round().await;

        assert_eq!(outcomes, vec![CycleOutcome::TimedOut]);
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(poller.stats().timeouts, 1);
        assert_eq!(poller.session().pending(), 0);
        assert_eq!(*rx.borrow(), MeasurementRecord::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_commands_drain_fifo_after_round() {
        let config = PollerConfig::default().with_families(vec![RegisterFamily::Time]);
        let (mut poller, queue, _rx, sensor) = poller(config);
        let mut requests = spawn_sensor(sensor);

        queue.enqueue(RequestCommand::unlock()).unwrap();
        queue.enqueue(RequestCommand::save()).unwrap();
        queue.enqueue(RequestCommand::read_angle()).unwrap();

        let outcomes = poller.poll_round().await;
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Decoded(RegisterFamily::Time),
                CycleOutcome::Sent,
                CycleOutcome::Sent,
                CycleOutcome::Decoded(RegisterFamily::Angle),
            ]
        );

        // Let the sensor task catch up on the last request
        tokio::task::yield_now().await;
        let registers: Vec<u8> = std::iter::from_fn(|| requests.try_recv().ok())
            .map(|r| r[2])
            .collect();
        assert_eq!(registers, vec![0x02, 0x69, 0x00, 0x02]);
        assert_eq!(poller.stats().commands, 3);

        // Queue is empty on the next round
        let outcomes = poller.poll_round().await;
        assert_eq!(outcomes, vec![CycleOutcome::Decoded(RegisterFamily::Time)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_port_is_not_fatal() {
        let config = PollerConfig::default().with_families(vec![RegisterFamily::Angle]);
        let (mut poller, _queue, _rx, sensor) = poller(config);
        drop(sensor);

        assert_eq!(poller.poll_round().await, vec![CycleOutcome::TransportFailed]);
        assert_eq!(poller.poll_round().await, vec![CycleOutcome::TransportFailed]);
        assert_eq!(poller.stats().transport_errors, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_once_publishes_decoded_frames() {
        let (mut poller, _queue, rx, mut sensor) = poller(PollerConfig::default());
        let mut stream = encode_frame(0x53, [16384, 0, 0, 7]).to_vec();
        stream.extend_from_slice(&encode_frame(0x59, [0, 16384, 0, 0]));
        sensor.write_all(&stream).await.unwrap();

        let outcomes = poller.stream_once().await;
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::Decoded(RegisterFamily::Angle),
                CycleOutcome::Decoded(RegisterFamily::Quaternion),
            ]
        );
        let record = rx.borrow().clone();
        assert!((record.angle[0] - 90.0).abs() < 1e-9);
        assert!((record.quaternion[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_with_families_drops_unpollable() {
        let config = PollerConfig::default()
            .with_families(vec![RegisterFamily::Quaternion, RegisterFamily::Angle]);
        assert_eq!(config.families, vec![RegisterFamily::Angle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quaternion_never_written_as_read_request() {
        let config = PollerConfig {
            families: vec![RegisterFamily::Quaternion],
            ..PollerConfig::default()
        };
        let (mut poller, _queue, _rx, sensor) = poller(config);
        let mut requests = spawn_sensor(sensor);

        assert!(poller.poll_round().await.is_empty());
        tokio::task::yield_now().await;
        assert!(requests.try_recv().is_err());
        assert_eq!(poller.stats().requests, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_answer_does_not_complete_next_request() {
        let config = PollerConfig::default()
            .with_families(vec![RegisterFamily::Time, RegisterFamily::Acceleration]);
        let (mut poller, _queue, rx, mut sensor) = poller(config);

        tokio::spawn(async move {
            let mut request = [0u8; REQUEST_LEN];
            sensor.read_exact(&mut request).await.unwrap();
            tokio::time::sleep(Duration::from_millis(600)).await;
            sensor.write_all(&frame_for(0x01).unwrap()).await.unwrap();

            sensor.read_exact(&mut request).await.unwrap();
            sensor.write_all(&frame_for(0x02).unwrap()).await.unwrap();
            sensor
        });

        let outcomes = poller.poll_round().await;
        assert_eq!(
            outcomes,
            vec![
                CycleOutcome::TimedOut,
                CycleOutcome::Decoded(RegisterFamily::Acceleration),
            ]
        );

        let record = rx.borrow().clone();
        assert!((record.acceleration[2] - 78.4).abs() < 1e-9);
        assert_eq!(record.time.minute, 0x2A);
        assert_eq!(poller.session().stats().stale_frames, 1);
    }

    #[test]
    fn test_queue_full() {
        let (client, _sensor) = tokio::io::duplex(16);
        let config = PollerConfig {
            queue_depth: 1,
            ..PollerConfig::default()
        };
        let (_poller, queue, _rx) = Poller::new(DeviceSession::new(client, 64), config);

        queue.enqueue(RequestCommand::save()).unwrap();
        assert_eq!(queue.enqueue(RequestCommand::save()), Err(PollerError::QueueFull));
    }
}
