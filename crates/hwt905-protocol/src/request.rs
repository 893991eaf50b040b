//! HWT905 Request Encoding
//!
//! Every command sent to the sensor is a fixed 5-byte frame
//! `[0xFF, 0xAA, register, value, reserved]`.

use crate::register::{GroupMask, RegisterFamily};
use serde::{Deserialize, Serialize};

/// First byte of every command
pub const REQUEST_PREFIX: u8 = 0xFF;

/// Second byte of every command
pub const REQUEST_SECOND: u8 = 0xAA;

/// Length of every command
pub const REQUEST_LEN: usize = 5;

/// Key register written by the unlock command
pub const UNLOCK_REGISTER: u8 = 0x69;

/// Configuration and data register addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    /// Save configuration
    Save = 0x00,
    /// Calibration mode
    CalSw = 0x01,
    /// Output content
    Rsw = 0x02,
    /// Output rate
    Rate = 0x03,
    /// Serial baud rate
    Baud = 0x04,
    AxOffset = 0x05,
    AyOffset = 0x06,
    AzOffset = 0x07,
    GxOffset = 0x08,
    GyOffset = 0x09,
    GzOffset = 0x0A,
    HxOffset = 0x0B,
    HyOffset = 0x0C,
    HzOffset = 0x0D,
    /// Month and year
    YyMm = 0x30,
    /// Hour and day
    DdHh = 0x31,
    /// Second and minute
    MmSs = 0x32,
    Ms = 0x33,
    Ax = 0x34,
    Ay = 0x35,
    Az = 0x36,
    Gx = 0x37,
    Gy = 0x38,
    Gz = 0x39,
    Hx = 0x3A,
    Hy = 0x3B,
    Hz = 0x3C,
    Roll = 0x3D,
    Pitch = 0x3E,
    Yaw = 0x3F,
    Temp = 0x40,
    Q0 = 0x51,
    Q1 = 0x52,
    Q2 = 0x53,
    Q3 = 0x54,
}

impl Register {
    /// Get the register address
    pub fn address(&self) -> u8 {
        *self as u8
    }
}

/// Output rate codes for the RATE register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputRate {
    #[serde(rename = "0.2hz")]
    Hz0_2,
    #[serde(rename = "0.5hz")]
    Hz0_5,
    #[serde(rename = "1hz")]
    Hz1,
    #[default]
    #[serde(rename = "2hz")]
    Hz2,
    #[serde(rename = "5hz")]
    Hz5,
    #[serde(rename = "10hz")]
    Hz10,
    #[serde(rename = "20hz")]
    Hz20,
    #[serde(rename = "50hz")]
    Hz50,
    #[serde(rename = "100hz")]
    Hz100,
    #[serde(rename = "200hz")]
    Hz200,
}

impl OutputRate {
    /// Register value for this rate
    pub fn code(&self) -> u8 {
        match self {
            OutputRate::Hz0_2 => 0x01,
            OutputRate::Hz0_5 => 0x02,
            OutputRate::Hz1 => 0x03,
            OutputRate::Hz2 => 0x04,
            OutputRate::Hz5 => 0x05,
            OutputRate::Hz10 => 0x06,
            OutputRate::Hz20 => 0x07,
            OutputRate::Hz50 => 0x08,
            OutputRate::Hz100 => 0x09,
            OutputRate::Hz200 => 0x0B,
        }
    }
}

/// Baud rate codes for the BAUD register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaudRate {
    B4800,
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
    B230400,
}

impl BaudRate {
    /// Register value for this baud rate
    pub fn code(&self) -> u8 {
        match self {
            BaudRate::B4800 => 0x01,
            BaudRate::B9600 => 0x02,
            BaudRate::B19200 => 0x03,
            BaudRate::B38400 => 0x04,
            BaudRate::B57600 => 0x05,
            BaudRate::B115200 => 0x06,
            BaudRate::B230400 => 0x07,
        }
    }

    /// Line speed in bits per second
    pub fn bps(&self) -> u32 {
        match self {
            BaudRate::B4800 => 4800,
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
            BaudRate::B230400 => 230400,
        }
    }

    /// Look up the code for a line speed
    pub fn from_bps(bps: u32) -> Option<Self> {
        match bps {
            4800 => Some(BaudRate::B4800),
            9600 => Some(BaudRate::B9600),
            19200 => Some(BaudRate::B19200),
            38400 => Some(BaudRate::B38400),
            57600 => Some(BaudRate::B57600),
            115200 => Some(BaudRate::B115200),
            230400 => Some(BaudRate::B230400),
            _ => None,
        }
    }
}

/// Calibration modes for the CALSW register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationMode {
    /// Leave calibration
    Normal,
    /// Accelerometer auto-calibration
    Accelerometer,
    /// Zero the heading angle
    HeadingZero,
    /// Magnetometer calibration
    Magnetic,
}

impl CalibrationMode {
    /// Register value for this mode
    pub fn code(&self) -> u8 {
        match self {
            CalibrationMode::Normal => 0x00,
            CalibrationMode::Accelerometer => 0x01,
            CalibrationMode::HeadingZero => 0x04,
            CalibrationMode::Magnetic => 0x07,
        }
    }
}

/// A 5-byte outbound command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestCommand {
    bytes: [u8; REQUEST_LEN],
}

impl RequestCommand {
    fn new(register: u8, value: u8, reserved: u8) -> Self {
        Self {
            bytes: [REQUEST_PREFIX, REQUEST_SECOND, register, value, reserved],
        }
    }

    /// Ask the sensor to return the groups in `mask`
    pub fn read_request(mask: GroupMask) -> Self {
        let [low, _] = mask.bits().to_le_bytes();
        Self::new(Register::Rsw.address(), low, 0x00)
    }

    /// Read request for a single family.
    ///
    /// `None` for families outside the low RSW byte (quaternion): a read
    /// request cannot select them, and the zero value would disable output.
    pub fn read_family(family: RegisterFamily) -> Option<Self> {
        family
            .is_pollable()
            .then(|| Self::read_request(family.group()))
    }

    pub fn read_time() -> Self {
        Self::read_request(GroupMask::TIME)
    }

    pub fn read_acceleration() -> Self {
        Self::read_request(GroupMask::ACCELERATION)
    }

    pub fn read_angular_velocity() -> Self {
        Self::read_request(GroupMask::ANGULAR_VELOCITY)
    }

    pub fn read_angle() -> Self {
        Self::read_request(GroupMask::ANGLE)
    }

    pub fn read_magnetic() -> Self {
        Self::read_request(GroupMask::MAGNETIC)
    }

    /// Write `value` to a configuration register
    pub fn config(register: Register, value: u8) -> Self {
        Self::new(register.address(), value, 0x00)
    }

    /// Unlock configuration writes
    pub fn unlock() -> Self {
        Self::new(UNLOCK_REGISTER, 0x88, 0xB5)
    }

    /// Persist configuration
    pub fn save() -> Self {
        Self::config(Register::Save, 0x00)
    }

    pub fn set_output_rate(rate: OutputRate) -> Self {
        Self::config(Register::Rate, rate.code())
    }

    pub fn set_baud_rate(baud: BaudRate) -> Self {
        Self::config(Register::Baud, baud.code())
    }

    pub fn calibrate(mode: CalibrationMode) -> Self {
        Self::config(Register::CalSw, mode.code())
    }

    /// Select the groups sent in streaming output (full 16-bit RSW word)
    pub fn set_content(mask: GroupMask) -> Self {
        let [low, high] = mask.bits().to_le_bytes();
        Self::new(Register::Rsw.address(), low, high)
    }

    /// Target register byte
    pub fn register(&self) -> u8 {
        self.bytes[2]
    }

    /// Value byte
    pub fn value(&self) -> u8 {
        self.bytes[3]
    }

    /// Whether the sensor answers this command with a data frame.
    ///
    /// Only single-word RSW requests do; configuration writes are silent.
    pub fn expects_response(&self) -> bool {
        self.bytes[2] == Register::Rsw.address() && self.bytes[4] == 0x00 && self.bytes[3] != 0
    }

    /// Wire bytes
    pub fn as_bytes(&self) -> &[u8; REQUEST_LEN] {
        &self.bytes
    }
}

impl AsRef<[u8]> for RequestCommand {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Commands that configure streaming output: rate and content, each persisted
pub fn init_sequence(rate: OutputRate, content: GroupMask) -> Vec<RequestCommand> {
    vec![
        RequestCommand::unlock(),
        RequestCommand::set_output_rate(rate),
        RequestCommand::save(),
        RequestCommand::unlock(),
        RequestCommand::set_content(content),
        RequestCommand::save(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_requests() {
        assert_eq!(RequestCommand::read_time().as_bytes(), &[0xFF, 0xAA, 0x02, 0x01, 0x00]);
        assert_eq!(RequestCommand::read_acceleration().as_bytes(), &[0xFF, 0xAA, 0x02, 0x02, 0x00]);
        assert_eq!(RequestCommand::read_angular_velocity().as_bytes(), &[0xFF, 0xAA, 0x02, 0x04, 0x00]);
        assert_eq!(RequestCommand::read_angle().as_bytes(), &[0xFF, 0xAA, 0x02, 0x08, 0x00]);
        assert_eq!(RequestCommand::read_magnetic().as_bytes(), &[0xFF, 0xAA, 0x02, 0x10, 0x00]);
    }

    #[test]
    fn test_combined_read_request() {
        let cmd = RequestCommand::read_request(GroupMask::TIME | GroupMask::ANGLE);
        assert_eq!(cmd.as_bytes(), &[0xFF, 0xAA, 0x02, 0x09, 0x00]);
        assert!(cmd.expects_response());
    }

    #[test]
    fn test_config_commands() {
        assert_eq!(RequestCommand::unlock().as_bytes(), &[0xFF, 0xAA, 0x69, 0x88, 0xB5]);
        assert_eq!(RequestCommand::save().as_bytes(), &[0xFF, 0xAA, 0x00, 0x00, 0x00]);
        assert_eq!(
            RequestCommand::set_output_rate(OutputRate::Hz2).as_bytes(),
            &[0xFF, 0xAA, 0x03, 0x04, 0x00]
        );
        assert_eq!(
            RequestCommand::set_baud_rate(BaudRate::B115200).as_bytes(),
            &[0xFF, 0xAA, 0x04, 0x06, 0x00]
        );
        assert_eq!(
            RequestCommand::calibrate(CalibrationMode::Accelerometer).as_bytes(),
            &[0xFF, 0xAA, 0x01, 0x01, 0x00]
        );
        assert_eq!(
            RequestCommand::calibrate(CalibrationMode::Magnetic).as_bytes(),
            &[0xFF, 0xAA, 0x01, 0x07, 0x00]
        );
        assert!(!RequestCommand::save().expects_response());
        assert!(!RequestCommand::unlock().expects_response());
        assert!(!RequestCommand::calibrate(CalibrationMode::Normal).expects_response());
    }

    #[test]
    fn test_read_family() {
        for family in RegisterFamily::POLL_ORDER {
            let cmd = RequestCommand::read_family(family).unwrap();
            assert_eq!(cmd.value(), family.group().bits() as u8);
            assert!(cmd.expects_response());
        }
        assert_eq!(RequestCommand::read_family(RegisterFamily::Quaternion), None);
    }

    #[test]
    fn test_content_with_quaternion_uses_high_byte() {
        let all: GroupMask = RegisterFamily::POLL_ORDER.into_iter().collect();
        let cmd = RequestCommand::set_content(all | GroupMask::QUATERNION);
        assert_eq!(cmd.as_bytes(), &[0xFF, 0xAA, 0x02, 0x1F, 0x02]);
        assert!(!cmd.expects_response());
    }

    #[test]
    fn test_init_sequence_order() {
        let seq = init_sequence(OutputRate::Hz10, GroupMask::ACCELERATION);
        let registers: Vec<u8> = seq.iter().map(|c| c.register()).collect();
        assert_eq!(registers, vec![0x69, 0x03, 0x00, 0x69, 0x02, 0x00]);
        assert_eq!(seq[1].value(), 0x06);
    }

    #[test]
    fn test_baud_lookup() {
        assert_eq!(BaudRate::from_bps(9600), Some(BaudRate::B9600));
        assert_eq!(BaudRate::from_bps(1234), None);
        assert_eq!(BaudRate::B38400.bps(), 38400);
    }
}
