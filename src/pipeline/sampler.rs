//! Periodic thermistor sampler with a soft watchdog.
//!
//! Owns its ADC bank, its period timer and the reset primitive for its
//! whole lifetime.  Each cycle:
//!
//! 1. wait for the period tick, at most `period × (100 + tolerance) / 100`;
//!    a missed tick means the controller is unhealthy → full reset;
//! 2. read raw code and temperature on all three channels;
//! 3. reserve + commit one SENSOR reading on channel A; if the channel is
//!    full the sample is dropped and logged, never retried.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};

use crate::app::ports::{AdcHandle, AdcPort, ResetPort, ResetReason, TickSource};
use crate::channel::BoundedChannel;
use crate::config::SystemConfig;
use crate::error::{Result, SensorError};
use crate::message::SensorReading;
use crate::supervisor::{Worker, WorkerContext};

/// Counters kept by the sampler for its shutdown log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub cycles: u32,
    pub dropped: u32,
    pub read_errors: u32,
    pub deadline_misses: u32,
}

pub struct Sampler<A: AdcPort, T: TickSource, R: ResetPort> {
    adc: A,
    tick: T,
    reset: R,
    handles: [AdcHandle; 3],
    tx: Arc<BoundedChannel>,
    period: Duration,
    deadline: Duration,
    reserve_timeout: Duration,
    stats: SamplerStats,
}

impl<A: AdcPort, T: TickSource, R: ResetPort> Sampler<A, T, R> {
    /// Configure the three ADC channels named in `config`.
    pub fn new(mut adc: A, tick: T, reset: R, tx: Arc<BoundedChannel>, config: &SystemConfig) -> Result<Self> {
        let [c1, c2, c3] = config.adc_channels;
        let handles = [adc.configure(c1)?, adc.configure(c2)?, adc.configure(c3)?];
        Ok(Self {
            adc,
            tick,
            reset,
            handles,
            tx,
            period: config.sample_period(),
            deadline: config.sample_deadline(),
            reserve_timeout: config.reserve_timeout(),
            stats: SamplerStats::default(),
        })
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    /// Read all three channels into a SENSOR reading.
    ///
    /// A railed divider still yields its raw code (with a NaN temperature)
    /// so the voter sees the disagreement.
    fn sample(&mut self) -> core::result::Result<SensorReading, SensorError> {
        let mut celsius = [0.0f32; 3];
        let mut raw = [0u16; 3];
        for (i, &h) in self.handles.iter().enumerate() {
            raw[i] = self.adc.read_raw(h)?;
            celsius[i] = match self.adc.read_calibrated(h) {
                Ok(c) => c,
                Err(SensorError::OutOfRange) => f32::NAN,
                Err(e) => return Err(e),
            };
        }
        Ok(SensorReading::from_sensor(celsius, raw))
    }
}

impl<A: AdcPort + 'static, T: TickSource + 'static, R: ResetPort + 'static> Worker for Sampler<A, T, R> {
    fn on_start(&mut self, ctx: &WorkerContext) {
        // A failed arm is caught by the deadline check on the first step.
        match self.tick.arm(self.period) {
            Ok(()) => info!(
                "[{}] sampling every {}ms (deadline {}ms)",
                ctx.name(),
                self.period.as_millis(),
                self.deadline.as_millis()
            ),
            Err(e) => error!("[{}] period timer not armed: {e}", ctx.name()),
        }
    }

    fn step(&mut self, ctx: &WorkerContext) {
        if !self.tick.wait(self.deadline) {
            self.stats.deadline_misses += 1;
            error!(
                "[{}] no sample tick within {}ms; resetting system",
                ctx.name(),
                self.deadline.as_millis()
            );
            self.reset.full_reset(ResetReason::SampleDeadlineMissed);
            return;
        }

        let reading = match self.sample() {
            Ok(r) => r,
            Err(e) => {
                self.stats.read_errors += 1;
                warn!("[{}] sample skipped: {e}", ctx.name());
                return;
            }
        };
        self.stats.cycles += 1;

        if let Err(e) = self.tx.send(&reading, self.reserve_timeout) {
            self.stats.dropped += 1;
            info!(
                "[{}] sample dropped: {e} (max item {}B)",
                ctx.name(),
                self.tx.max_item_size()
            );
        }
    }

    fn on_stop(&mut self, ctx: &WorkerContext) {
        self.tick.disarm();
        let s = self.stats;
        info!(
            "[{}] stopped: cycles={} dropped={} read_errors={} deadline_misses={}",
            ctx.name(),
            s.cycles,
            s.dropped,
            s.read_errors,
            s.deadline_misses
        );
    }
}
