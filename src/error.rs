//! Unified error types for the TMRSense firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! error handling of workers and the dispatcher uniform.  All variants are
//! `Copy` so they can be logged, compared, and passed across worker
//! boundaries without allocation.
//!
//! Expected conditions (a channel timeout, a full channel) are represented
//! here too, but callers absorb them locally: see the severity policy in
//! the pipeline modules.

use core::fmt;

use crate::fsm::Mode;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A bounded channel refused a reservation.
    Channel(ChannelError),
    /// A channel item did not decode as a wire message.
    Decode(DecodeError),
    /// A thermistor channel could not be configured or read.
    Sensor(SensorError),
    /// A mode request was rejected by the state machine.
    Mode(ModeError),
    /// The periodic sample timer could not be created or started.
    Timer(i32),
    /// Peripheral or subsystem initialisation failed.
    Init(&'static str),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Mode(e) => write!(f, "mode: {e}"),
            Self::Timer(rc) => write!(f, "timer: esp_timer rc={rc}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Channel errors
// ---------------------------------------------------------------------------

/// Reasons a reservation on a [`BoundedChannel`](crate::channel::BoundedChannel)
/// did not produce a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The item can never fit, regardless of how much space is released.
    TooLarge { size: usize, max: usize },
    /// Not enough free space appeared before the timeout expired.
    /// This is backpressure, not a fault.
    Full { free: usize },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => {
                write!(f, "item of {size} bytes exceeds max item size {max}")
            }
            Self::Full { free } => write!(f, "channel full ({free} bytes free)"),
        }
    }
}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

// ---------------------------------------------------------------------------
// Wire decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Item length does not match the fixed wire size.
    Length { expected: usize, got: usize },
    /// Producer tag is not one of the known sources.
    UnknownSource(u8),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length { expected, got } => {
                write!(f, "expected {expected} bytes, got {got}")
            }
            Self::UnknownSource(id) => write!(f, "unknown source id {id}"),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// ADC channel number is not usable for a thermistor.
    InvalidChannel(u8),
    /// ADC read returned an error code.
    AdcReadFailed(i32),
    /// Divider voltage is at a rail: open or shorted thermistor.
    OutOfRange,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChannel(ch) => write!(f, "invalid ADC channel {ch}"),
            Self::AdcReadFailed(rc) => write!(f, "ADC read failed (rc={rc})"),
            Self::OutOfRange => write!(f, "reading out of range"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Mode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeError {
    /// The mode was never registered with the system.
    Unregistered(Mode),
}

impl fmt::Display for ModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unregistered(mode) => write!(f, "mode {} is not registered", mode.name()),
        }
    }
}

impl From<ModeError> for Error {
    fn from(e: ModeError) -> Self {
        Self::Mode(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
