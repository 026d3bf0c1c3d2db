//! System configuration parameters
//!
//! All tunable parameters for the TMRSense pipeline.  The defaults are the
//! compiled-in constants; a validated copy can be persisted to and restored
//! from NVS through [`ConfigPort`](crate::app::ports::ConfigPort).

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channel::item_footprint;
use crate::message::{SensorReading, WireMessage};
use crate::pins;

/// Maximum length of the system identifier.
pub const SYSTEM_NAME_MAX: usize = 15;

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity ---
    /// System identifier, also used as the state machine name.
    pub system_name: heapless::String<SYSTEM_NAME_MAX>,

    // --- Sampling ---
    /// Target sampling frequency (Hz).
    pub sample_frequency_hz: u8,
    /// Allowed lateness of a period tick before the soft watchdog resets
    /// the system (percent of the nominal period).
    pub deadline_tolerance_percent: u8,
    /// ADC1 channels of thermistors 1, 2 and 3.
    pub adc_channels: [u8; 3],
    /// Divider and Beta-model constants shared by all three channels.
    pub thermistor: ThermistorModel,

    // --- Voting ---
    /// Bit mask applied to raw codes before comparison and majority vote.
    pub lsb_mask: u16,
    /// Copy the per-channel readings into the agreed message.
    pub forward_raw_codes: bool,

    // --- Channels ---
    /// Byte capacity of each bounded channel.
    pub channel_capacity_bytes: u32,
    /// Maximum wait for space when reserving a slot (milliseconds).
    pub reserve_timeout_ms: u32,
    /// Maximum wait for an item when receiving (milliseconds).
    pub receive_timeout_ms: u32,

    // --- State machine ---
    /// Poll interval of the dispatcher's pending-mode wait (milliseconds).
    pub dispatcher_poll_ms: u32,
    /// Delay between worker starts in the Init mode (milliseconds).
    pub worker_start_stagger_ms: u32,

    // --- Tasks ---
    pub sampler_task: TaskConfig,
    pub voter_task: TaskConfig,
    pub monitor_task: TaskConfig,
}

/// Thermistor divider and Beta-model constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermistorModel {
    /// Fixed resistor between the ADC node and ground (ohms).
    pub series_resistance_ohms: f32,
    /// NTC resistance at the nominal temperature (ohms).
    pub nominal_resistance_ohms: f32,
    /// Nominal temperature (kelvin).
    pub nominal_temperature_k: f32,
    /// Beta coefficient (kelvin).
    pub beta: f32,
    /// Divider supply and ADC full-scale voltage.
    pub v_ref: f32,
    /// Largest raw ADC code (12-bit → 4095).
    pub adc_max: u16,
}

impl Default for ThermistorModel {
    fn default() -> Self {
        Self {
            series_resistance_ohms: 10_000.0,
            nominal_resistance_ohms: 10_000.0,
            nominal_temperature_k: 298.15, // 25 °C
            beta: 3950.0,
            v_ref: 3.3,
            adc_max: 4095,
        }
    }
}

/// Scheduling parameters of one supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Stack budget in bytes.
    pub stack_bytes: u32,
    /// FreeRTOS priority.
    pub priority: u8,
    /// Core to pin the worker to; `None` lets the scheduler choose.
    pub core: Option<u8>,
    /// How long `stop` waits for the worker to acknowledge (milliseconds).
    pub stop_timeout_ms: u32,
}

impl TaskConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms as u64)
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut system_name = heapless::String::new();
        // "TMR Thermo" is 10 bytes; always fits.
        let _ = system_name.push_str("TMR Thermo");

        Self {
            system_name,

            // Sampling
            sample_frequency_hz: 1,
            deadline_tolerance_percent: 20,
            adc_channels: pins::THERMISTOR_ADC_CHANNELS,
            thermistor: ThermistorModel::default(),

            // Voting
            lsb_mask: 0x00FF,
            forward_raw_codes: true,

            // Channels
            channel_capacity_bytes: 2048,
            reserve_timeout_ms: 100,
            receive_timeout_ms: 1000,

            // State machine
            dispatcher_poll_ms: 100,
            worker_start_stagger_ms: 1000,

            // Tasks: sampler alone on core 0, voter and monitor on core 1
            sampler_task: TaskConfig {
                stack_bytes: 4096,
                priority: 5,
                core: Some(0),
                stop_timeout_ms: 2000,
            },
            voter_task: TaskConfig {
                stack_bytes: 4096,
                priority: 4,
                core: Some(1),
                stop_timeout_ms: 2000,
            },
            monitor_task: TaskConfig {
                stack_bytes: 4096,
                priority: 3,
                core: Some(1),
                stop_timeout_ms: 2000,
            },
        }
    }
}

impl SystemConfig {
    /// Nominal sampling period.
    pub fn sample_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.sample_frequency_hz.max(1)))
    }

    /// Longest acceptable wait for a period tick before the soft watchdog
    /// fires: the period stretched by the tolerance.
    pub fn sample_deadline(&self) -> Duration {
        let period_us = self.sample_period().as_micros() as u64;
        Duration::from_micros(period_us * (100 + u64::from(self.deadline_tolerance_percent)) / 100)
    }

    pub fn reserve_timeout(&self) -> Duration {
        Duration::from_millis(self.reserve_timeout_ms as u64)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms as u64)
    }

    pub fn dispatcher_poll(&self) -> Duration {
        Duration::from_millis(self.dispatcher_poll_ms as u64)
    }

    pub fn worker_start_stagger(&self) -> Duration {
        Duration::from_millis(self.worker_start_stagger_ms as u64)
    }

    /// Range-check every field.  Applied before persisting and after
    /// loading, so a corrupted blob never reaches the pipeline.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.system_name.is_empty() {
            return Err("system_name must not be empty");
        }
        if !(1..=100).contains(&self.sample_frequency_hz) {
            return Err("sample_frequency_hz must be 1–100");
        }
        if !(1..=100).contains(&self.deadline_tolerance_percent) {
            return Err("deadline_tolerance_percent must be 1–100");
        }
        if self.adc_channels.iter().any(|&ch| ch >= pins::ADC1_CHANNEL_COUNT) {
            return Err("adc_channels must be ADC1 channels 0–7");
        }
        let [a, b, c] = self.adc_channels;
        if a == b || b == c || a == c {
            return Err("adc_channels must be distinct");
        }
        if self.lsb_mask == 0 {
            return Err("lsb_mask must select at least one bit");
        }

        let t = &self.thermistor;
        if t.series_resistance_ohms <= 0.0 || t.nominal_resistance_ohms <= 0.0 {
            return Err("thermistor resistances must be positive");
        }
        if t.nominal_temperature_k <= 0.0 || t.beta <= 0.0 || t.v_ref <= 0.0 || t.adc_max == 0 {
            return Err("thermistor model constants must be positive");
        }

        // Two readings must fit at once, otherwise producer and consumer
        // lock-step on every item.
        if (self.channel_capacity_bytes as usize) < 2 * item_footprint(SensorReading::WIRE_SIZE) {
            return Err("channel_capacity_bytes too small for two readings");
        }
        if self.reserve_timeout_ms == 0 || self.receive_timeout_ms == 0 {
            return Err("channel timeouts must be non-zero");
        }
        if !(10..=1000).contains(&self.dispatcher_poll_ms) {
            return Err("dispatcher_poll_ms must be 10–1000");
        }

        for task in [&self.sampler_task, &self.voter_task, &self.monitor_task] {
            if task.stack_bytes < 2048 {
                return Err("task stack_bytes must be at least 2048");
            }
            if task.core.is_some_and(|c| c > 1) {
                return Err("task core must be 0 or 1");
            }
            if task.stop_timeout_ms == 0 {
                return Err("task stop_timeout_ms must be non-zero");
            }
        }
        Ok(())
    }
}
