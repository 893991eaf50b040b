//! Gateway configuration
//!
//! Loaded from an optional TOML file, then overridden by `HWT905__*`
//! environment variables (e.g. `HWT905__SERIAL__DEVICE=/dev/ttyUSB1`).

use hwt905_poller::{PollMode, PollerConfig};
use hwt905_protocol::{GroupMask, OutputRate, RegisterFamily};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "HWT905";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub serial: SerialConfig,
    pub poller: PollerSection,
    pub device: DeviceConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Serial link settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path
    pub device: String,
    /// Line speed; the sensor ships at 9600
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
        }
    }
}

/// Polling driver settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerSection {
    pub mode: PollMode,
    pub response_timeout_ms: u64,
    pub idle_interval_ms: u64,
    pub config_settle_ms: u64,
    /// Reassembly buffer size in bytes
    pub buffer_capacity: usize,
    pub queue_depth: usize,
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            mode: PollMode::Poll,
            response_timeout_ms: 500,
            idle_interval_ms: 100,
            config_settle_ms: 100,
            buffer_capacity: 256,
            queue_depth: 32,
        }
    }
}

/// Sensor configuration written at startup
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub configure_on_start: bool,
    pub output_rate: OutputRate,
    /// Families the sensor includes in streamed output
    pub content: Vec<RegisterFamily>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            configure_on_start: true,
            output_rate: OutputRate::Hz2,
            content: vec![
                RegisterFamily::Time,
                RegisterFamily::Acceleration,
                RegisterFamily::AngularVelocity,
                RegisterFamily::Angle,
                RegisterFamily::Magnetic,
                RegisterFamily::Quaternion,
            ],
        }
    }
}

/// TCP snapshot responder
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl GatewayConfig {
    /// Load from `path` (if given) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Driver settings derived from the `poller` section
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            response_timeout: Duration::from_millis(self.poller.response_timeout_ms),
            idle_interval: Duration::from_millis(self.poller.idle_interval_ms),
            config_settle: Duration::from_millis(self.poller.config_settle_ms),
            queue_depth: self.poller.queue_depth,
            ..PollerConfig::default()
        }
    }

    /// Output content written to the RSW register
    pub fn content_mask(&self) -> GroupMask {
        self.device.content.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.poller.mode, PollMode::Poll);
        assert_eq!(config.poller.buffer_capacity, 256);
        assert_eq!(config.server.bind_addr.port(), 8080);
        assert_eq!(config.content_mask().bits(), 0x021F);
        assert_eq!(
            config.poller_config().response_timeout,
            Duration::from_millis(500)
        );
    }

    #[test]
    fn test_load_file_and_env_override() {
        let path = std::env::temp_dir().join(format!("hwt905-gateway-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
[serial]
device = "/dev/ttyS3"

[poller]
mode = "stream"
response_timeout_ms = 250

[device]
output_rate = "10hz"
content = ["acceleration", "angle"]
"#,
        )
        .unwrap();
        std::env::set_var("HWT905__SERIAL__BAUD_RATE", "115200");

        let config = GatewayConfig::load(Some(&path)).unwrap();
        std::env::remove_var("HWT905__SERIAL__BAUD_RATE");
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.serial.device, "/dev/ttyS3");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.poller.mode, PollMode::Stream);
        assert_eq!(config.poller.response_timeout_ms, 250);
        assert_eq!(config.poller.idle_interval_ms, 100);
        assert_eq!(config.device.output_rate, OutputRate::Hz10);
        assert_eq!(config.content_mask(), GroupMask::ACCELERATION | GroupMask::ANGLE);
        assert!(config.server.enabled);
    }
}
