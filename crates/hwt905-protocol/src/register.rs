//! HWT905 Register Families and Frame Decoding
//!
//! Defines the output register families and their fixed-point decoding
//! formulas, plus the shared record that decoded groups are written into.

use crate::error::ImuError;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Standard gravity used by the accelerometer scaling (m/s²)
pub const G: f64 = 9.8;

/// Full-scale divisor of every signed 16-bit channel
const FULL_SCALE: f64 = 32768.0;

/// Accelerometer range (±16 g)
const ACCEL_RANGE_G: f64 = 16.0;

/// Gyroscope range (±2000 °/s)
const GYRO_RANGE_DPS: f64 = 2000.0;

/// Angle range (±180°)
const ANGLE_RANGE_DEG: f64 = 180.0;

/// Register family carried in byte 1 of every output frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RegisterFamily {
    /// Chip time (0x50)
    Time = 0x50,
    /// Acceleration and temperature (0x51)
    Acceleration = 0x51,
    /// Angular velocity and temperature (0x52)
    AngularVelocity = 0x52,
    /// Euler angles and firmware version (0x53)
    Angle = 0x53,
    /// Magnetic field (0x54)
    Magnetic = 0x54,
    /// Orientation quaternion (0x59)
    Quaternion = 0x59,
}

impl RegisterFamily {
    /// Fixed round-robin polling order
    pub const POLL_ORDER: [RegisterFamily; 5] = [
        RegisterFamily::Time,
        RegisterFamily::Acceleration,
        RegisterFamily::AngularVelocity,
        RegisterFamily::Angle,
        RegisterFamily::Magnetic,
    ];

    /// Get the family id byte
    pub fn id(&self) -> u8 {
        *self as u8
    }

    /// Look up a family by id byte
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0x50 => Some(RegisterFamily::Time),
            0x51 => Some(RegisterFamily::Acceleration),
            0x52 => Some(RegisterFamily::AngularVelocity),
            0x53 => Some(RegisterFamily::Angle),
            0x54 => Some(RegisterFamily::Magnetic),
            0x59 => Some(RegisterFamily::Quaternion),
            _ => None,
        }
    }

    /// Output-content flag that makes the sensor send this family
    pub fn group(&self) -> GroupMask {
        match self {
            RegisterFamily::Time => GroupMask::TIME,
            RegisterFamily::Acceleration => GroupMask::ACCELERATION,
            RegisterFamily::AngularVelocity => GroupMask::ANGULAR_VELOCITY,
            RegisterFamily::Angle => GroupMask::ANGLE,
            RegisterFamily::Magnetic => GroupMask::MAGNETIC,
            RegisterFamily::Quaternion => GroupMask::QUATERNION,
        }
    }

    /// Whether a read request can ask for this family (flag in the low RSW byte)
    pub fn is_pollable(&self) -> bool {
        self.group().bits() & 0x00FF != 0
    }
}

impl TryFrom<u8> for RegisterFamily {
    type Error = ImuError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        RegisterFamily::from_id(id).ok_or(ImuError::UnknownRegister(id))
    }
}

/// Bitmask of register groups, as written to the RSW register.
///
/// The low byte is what a read request carries; quaternion output lives in
/// the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GroupMask(u16);

impl GroupMask {
    pub const NONE: GroupMask = GroupMask(0x0000);
    pub const TIME: GroupMask = GroupMask(0x0001);
    pub const ACCELERATION: GroupMask = GroupMask(0x0002);
    pub const ANGULAR_VELOCITY: GroupMask = GroupMask(0x0004);
    pub const ANGLE: GroupMask = GroupMask(0x0008);
    pub const MAGNETIC: GroupMask = GroupMask(0x0010);
    pub const QUATERNION: GroupMask = GroupMask(0x0200);

    /// Wrap raw RSW bits
    pub const fn from_bits(bits: u16) -> Self {
        GroupMask(bits)
    }

    /// Raw RSW bits
    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Check whether every bit of `other` is set
    pub const fn contains(&self, other: GroupMask) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if no group is selected
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Combine masks
    pub const fn union(self, other: GroupMask) -> Self {
        GroupMask(self.0 | other.0)
    }
}

impl std::ops::BitOr for GroupMask {
    type Output = GroupMask;

    fn bitor(self, rhs: GroupMask) -> GroupMask {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for GroupMask {
    fn bitor_assign(&mut self, rhs: GroupMask) {
        self.0 |= rhs.0;
    }
}

impl FromIterator<RegisterFamily> for GroupMask {
    fn from_iter<I: IntoIterator<Item = RegisterFamily>>(iter: I) -> Self {
        iter.into_iter()
            .fold(GroupMask::NONE, |mask, family| mask | family.group())
    }
}

/// Sensor clock reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTime {
    /// Year offset from 2000
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

/// One decoded field group
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Time(SensorTime),
    Acceleration {
        /// m/s² per axis
        axes: [f64; 3],
        /// °C
        temperature: f64,
    },
    AngularVelocity {
        /// °/s per axis
        axes: [f64; 3],
        /// °C
        temperature: f64,
    },
    Angle {
        /// Roll, pitch, yaw in degrees
        axes: [f64; 3],
        /// Firmware version code
        version: u16,
    },
    Magnetic {
        /// Raw field strength per axis
        axes: [u16; 3],
        /// Trailing temperature pair. Reads zero on the reference hardware.
        temperature: f64,
    },
    Quaternion([f64; 4]),
}

impl Measurement {
    /// Decode a verified frame into its field group
    pub fn decode(frame: &Frame) -> Result<Self, ImuError> {
        let family = RegisterFamily::try_from(frame.register_id())?;
        let scaled = |index: usize, range: f64| frame.word_i16(index) as f64 / FULL_SCALE * range;

        let measurement = match family {
            RegisterFamily::Time => Measurement::Time(SensorTime {
                year: frame.byte(0),
                month: frame.byte(1),
                day: frame.byte(2),
                hour: frame.byte(3),
                minute: frame.byte(4),
                second: frame.byte(5),
                millisecond: frame.word_u16(3),
            }),
            RegisterFamily::Acceleration => Measurement::Acceleration {
                axes: [0, 1, 2].map(|i| scaled(i, ACCEL_RANGE_G * G)),
                temperature: scaled_temperature(frame),
            },
            RegisterFamily::AngularVelocity => Measurement::AngularVelocity {
                axes: [0, 1, 2].map(|i| scaled(i, GYRO_RANGE_DPS)),
                temperature: scaled_temperature(frame),
            },
            RegisterFamily::Angle => Measurement::Angle {
                axes: [0, 1, 2].map(|i| scaled(i, ANGLE_RANGE_DEG)),
                version: frame.word_u16(3),
            },
            RegisterFamily::Magnetic => {
                let temperature = scaled_temperature(frame);
                if temperature != 0.0 {
                    debug!(temperature, "Magnetic frame carried a non-zero temperature");
                }
                Measurement::Magnetic {
                    axes: [0, 1, 2].map(|i| frame.word_u16(i)),
                    temperature,
                }
            }
            RegisterFamily::Quaternion => {
                Measurement::Quaternion([0, 1, 2, 3].map(|i| scaled(i, 1.0)))
            }
        };
        Ok(measurement)
    }

    /// Family this group belongs to
    pub fn family(&self) -> RegisterFamily {
        match self {
            Measurement::Time(_) => RegisterFamily::Time,
            Measurement::Acceleration { .. } => RegisterFamily::Acceleration,
            Measurement::AngularVelocity { .. } => RegisterFamily::AngularVelocity,
            Measurement::Angle { .. } => RegisterFamily::Angle,
            Measurement::Magnetic { .. } => RegisterFamily::Magnetic,
            Measurement::Quaternion(_) => RegisterFamily::Quaternion,
        }
    }
}

fn scaled_temperature(frame: &Frame) -> f64 {
    frame.word_i16(3) as f64 / 100.0
}

/// Latest decoded value of every field group.
///
/// A group changes only when a frame of its family passes validation;
/// otherwise it keeps its last value indefinitely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub time: SensorTime,
    /// m/s²
    pub acceleration: [f64; 3],
    /// °/s
    pub angular_velocity: [f64; 3],
    /// °C, written by acceleration and angular velocity frames
    pub temperature: f64,
    /// Roll, pitch, yaw in degrees
    pub angle: [f64; 3],
    /// Raw field strength
    pub magnetic: [u16; 3],
    /// Unreliable; see [`Measurement::Magnetic`]
    pub magnetic_temperature: f64,
    /// Unitless, [-1, 1]
    pub quaternion: [f64; 4],
    /// Firmware version code from angle frames
    pub version: u16,
    /// Number of groups applied so far
    pub updates: u64,
}

impl MeasurementRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the field group carried by `measurement`
    pub fn apply(&mut self, measurement: &Measurement) {
        match *measurement {
            Measurement::Time(time) => self.time = time,
            Measurement::Acceleration { axes, temperature } => {
                self.acceleration = axes;
                self.temperature = temperature;
            }
            Measurement::AngularVelocity { axes, temperature } => {
                self.angular_velocity = axes;
                self.temperature = temperature;
            }
            Measurement::Angle { axes, version } => {
                self.angle = axes;
                self.version = version;
            }
            Measurement::Magnetic { axes, temperature } => {
                self.magnetic = axes;
                self.magnetic_temperature = temperature;
            }
            Measurement::Quaternion(q) => self.quaternion = q,
        }
        self.updates += 1;
    }

    /// Decode `bytes` as one frame and apply it.
    ///
    /// On any error the record is left untouched.
    pub fn update_from_frame(&mut self, bytes: &[u8]) -> Result<RegisterFamily, ImuError> {
        let frame = Frame::parse(bytes)?;
        let measurement = Measurement::decode(&frame)?;
        self.apply(&measurement);
        Ok(measurement.family())
    }
}
