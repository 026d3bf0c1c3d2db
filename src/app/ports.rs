//! Port traits: the boundary between the pipeline and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Sampler / Voter / Monitor / Init mode
//! ```
//!
//! Hardware and reporting adapters implement these traits.  The pipeline
//! workers consume them via generics, so the sensing, voting and
//! supervision logic never touches an ESP-IDF API directly and runs
//! unchanged against the mocks in `tests/integration/mock_hw.rs`.

use std::sync::Arc;
use std::time::Duration;

use crate::app::events::Report;
use crate::channel::BoundedChannel;
use crate::config::SystemConfig;
use crate::error::{Result, SensorError};
use crate::supervisor::Worker;

// ───────────────────────────────────────────────────────────────
// ADC port (driven adapter: thermistor dividers → sampler)
// ───────────────────────────────────────────────────────────────

/// A configured ADC channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdcHandle(pub u8);

/// Read-side port for one bank of thermistor channels.
pub trait AdcPort: Send {
    /// Prepare `channel` for one-shot reads.
    fn configure(&mut self, channel: u8) -> core::result::Result<AdcHandle, SensorError>;

    /// Raw ADC code.
    fn read_raw(&mut self, handle: AdcHandle) -> core::result::Result<u16, SensorError>;

    /// Temperature in °C, through the configured thermistor model.
    fn read_calibrated(&mut self, handle: AdcHandle) -> core::result::Result<f32, SensorError>;
}

// ───────────────────────────────────────────────────────────────
// Tick source (driven adapter: periodic timer → sampler)
// ───────────────────────────────────────────────────────────────

/// The sampler's period clock.
///
/// The callback side (timer task on the device) only raises a signal;
/// everything else happens on the sampler's thread through this trait.
pub trait TickSource: Send {
    /// Create and start a periodic tick.
    fn arm(&mut self, period: Duration) -> Result<()>;

    /// Wait up to `timeout` for the next tick.  `false` on expiry.
    fn wait(&mut self, timeout: Duration) -> bool;

    /// Stop and delete the tick.  Safe to call when not armed.
    fn disarm(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Reset port (driven adapter: soft watchdog → chip reset)
// ───────────────────────────────────────────────────────────────

/// Why the system is being reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResetReason {
    /// The sampler's period tick did not arrive within its deadline.
    SampleDeadlineMissed,
    /// A panic reached the panic hook.
    Panic,
}

impl core::fmt::Display for ResetReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::SampleDeadlineMissed => write!(f, "sample deadline missed"),
            Self::Panic => write!(f, "panic"),
        }
    }
}

/// The single "perform full system reset" primitive.
pub trait ResetPort: Send {
    /// Reset the whole system.  On the device this does not return.
    fn full_reset(&mut self, reason: ResetReason);
}

// ───────────────────────────────────────────────────────────────
// Report sink (driven adapter: monitor → console / observability)
// ───────────────────────────────────────────────────────────────

/// Where the monitor sends decoded readings.
pub trait ReportSink: Send {
    fn report(&mut self, report: &Report);
}

// ───────────────────────────────────────────────────────────────
// Pipeline factory (driving adapter: Init mode → workers)
// ───────────────────────────────────────────────────────────────

/// Builds fresh pipeline workers each time the Init mode runs.
///
/// The device binary wires real ADC, timer and reset adapters; tests wire
/// mocks.  A worker owns every peripheral handle it uses for its whole
/// lifetime.
pub trait PipelineFactory {
    fn sampler(&mut self, tx: Arc<BoundedChannel>, config: &SystemConfig) -> Result<Box<dyn Worker>>;

    fn voter(
        &mut self,
        rx: Arc<BoundedChannel>,
        tx: Arc<BoundedChannel>,
        config: &SystemConfig,
    ) -> Result<Box<dyn Worker>>;

    fn monitor(&mut self, rx: Arc<BoundedChannel>, config: &SystemConfig) -> Result<Box<dyn Worker>>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    fn load(&self) -> core::result::Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> core::result::Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage (reset log, configuration blobs).
///
/// Write operations MUST be atomic: no partial writes on power loss.
/// The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> core::result::Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> core::result::Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> core::result::Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}
