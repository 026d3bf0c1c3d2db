//! Wire format of the readings that cross every channel.
//!
//! Layout (little-endian, packed, 25 bytes):
//!
//! ```text
//! off  size  field
//!   0     1  source_id   0 = SENSOR, 1 = VOTER
//!   1     4  s1          f32 °C
//!   5     4  s2          f32 °C
//!   9     4  s3          f32 °C
//!  13     2  lsb1        raw ADC code
//!  15     2  lsb2
//!  17     2  lsb3
//!  19     4  mean        f32 °C
//!  23     2  mean_raw    agreed raw code
//! ```
//!
//! Fields are written one by one at fixed offsets, so the struct's in-memory
//! layout never leaks onto the wire.

use crate::error::DecodeError;

/// Producer tag carried in byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SourceId {
    Sensor = 0,
    Voter = 1,
}

impl SourceId {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Sensor),
            1 => Some(Self::Voter),
            _ => None,
        }
    }
}

/// Types that can be moved through a [`BoundedChannel`](crate::channel::BoundedChannel)
/// as fixed-size byte images.
pub trait WireMessage: Sized {
    /// Exact encoded length in bytes.
    const WIRE_SIZE: usize;

    /// Write the message into `buf`, which is exactly `WIRE_SIZE` bytes.
    fn encode_into(&self, buf: &mut [u8]);

    /// Parse a message from a received item.
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>;
}

/// One sample triplet, or the voter's verdict on one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub source: SourceId,
    /// Calibrated temperature per channel (°C).
    pub celsius: [f32; 3],
    /// Raw ADC code per channel.
    pub raw: [u16; 3],
    /// Voter-computed average; zero in sampler messages.
    pub mean: f32,
    /// Voter-computed agreed raw code; zero in sampler messages.
    pub mean_raw: u16,
}

impl SensorReading {
    /// A fresh sampler message with no verdict fields.
    pub fn from_sensor(celsius: [f32; 3], raw: [u16; 3]) -> Self {
        Self {
            source: SourceId::Sensor,
            celsius,
            raw,
            mean: 0.0,
            mean_raw: 0,
        }
    }
}

const OFF_S: usize = 1;
const OFF_LSB: usize = 13;
const OFF_MEAN: usize = 19;
const OFF_MEAN_RAW: usize = 23;

impl WireMessage for SensorReading {
    const WIRE_SIZE: usize = 25;

    fn encode_into(&self, buf: &mut [u8]) {
        debug_assert_eq!(buf.len(), Self::WIRE_SIZE);
        buf[0] = self.source as u8;
        for (i, s) in self.celsius.iter().enumerate() {
            let at = OFF_S + i * 4;
            buf[at..at + 4].copy_from_slice(&s.to_le_bytes());
        }
        for (i, l) in self.raw.iter().enumerate() {
            let at = OFF_LSB + i * 2;
            buf[at..at + 2].copy_from_slice(&l.to_le_bytes());
        }
        buf[OFF_MEAN..OFF_MEAN + 4].copy_from_slice(&self.mean.to_le_bytes());
        buf[OFF_MEAN_RAW..OFF_MEAN_RAW + 2].copy_from_slice(&self.mean_raw.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(DecodeError::Length {
                expected: Self::WIRE_SIZE,
                got: buf.len(),
            });
        }
        let source = SourceId::from_u8(buf[0]).ok_or(DecodeError::UnknownSource(buf[0]))?;

        let f32_at = |at: usize| f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);

        Ok(Self {
            source,
            celsius: [f32_at(OFF_S), f32_at(OFF_S + 4), f32_at(OFF_S + 8)],
            raw: [u16_at(OFF_LSB), u16_at(OFF_LSB + 2), u16_at(OFF_LSB + 4)],
            mean: f32_at(OFF_MEAN),
            mean_raw: u16_at(OFF_MEAN_RAW),
        })
    }
}
