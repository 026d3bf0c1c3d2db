//! Mock hardware adapters for integration tests.
//!
//! Every mock keeps its observable state behind an `Arc` so a test can
//! hold a probe while the worker owning the mock runs on its own thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tmrsense::app::events::Report;
use tmrsense::app::ports::{
    AdcHandle, AdcPort, PipelineFactory, ReportSink, ResetPort, ResetReason, TickSource,
};
use tmrsense::channel::BoundedChannel;
use tmrsense::config::{SystemConfig, ThermistorModel};
use tmrsense::error::{Error, Result, SensorError};
use tmrsense::pins::ADC1_CHANNEL_COUNT;
use tmrsense::pipeline::monitor::Monitor;
use tmrsense::pipeline::sampler::Sampler;
use tmrsense::pipeline::voter::Voter;
use tmrsense::sensors::thermistor::celsius_from_raw;
use tmrsense::supervisor::Worker;
use tmrsense::sync::BinarySignal;

// ── FixedAdc ──────────────────────────────────────────────────

/// ADC whose raw codes are set by the test, per channel.
#[derive(Clone)]
pub struct FixedAdc {
    codes: Arc<Mutex<[u16; ADC1_CHANNEL_COUNT as usize]>>,
    model: ThermistorModel,
}

#[allow(dead_code)]
impl FixedAdc {
    pub fn new(model: ThermistorModel, code: u16) -> Self {
        Self {
            codes: Arc::new(Mutex::new([code; ADC1_CHANNEL_COUNT as usize])),
            model,
        }
    }

    pub fn set(&self, channel: u8, code: u16) {
        self.codes.lock().unwrap()[channel as usize] = code;
    }

    pub fn set_all(&self, channels: [u8; 3], codes: [u16; 3]) {
        let mut c = self.codes.lock().unwrap();
        for (ch, code) in channels.into_iter().zip(codes) {
            c[ch as usize] = code;
        }
    }
}

impl AdcPort for FixedAdc {
    fn configure(&mut self, channel: u8) -> core::result::Result<AdcHandle, SensorError> {
        if channel >= ADC1_CHANNEL_COUNT {
            return Err(SensorError::InvalidChannel(channel));
        }
        Ok(AdcHandle(channel))
    }

    fn read_raw(&mut self, handle: AdcHandle) -> core::result::Result<u16, SensorError> {
        Ok(self.codes.lock().unwrap()[handle.0 as usize])
    }

    fn read_calibrated(&mut self, handle: AdcHandle) -> core::result::Result<f32, SensorError> {
        let raw = self.read_raw(handle)?;
        celsius_from_raw(&self.model, raw)
    }
}

// ── ManualTicks ───────────────────────────────────────────────

#[derive(Default)]
pub struct TickProbe {
    signal: BinarySignal,
    arms: AtomicU32,
    disarms: AtomicU32,
}

#[allow(dead_code)]
impl TickProbe {
    /// Deliver one period tick.
    pub fn tick(&self) {
        self.signal.give();
    }

    pub fn arms(&self) -> u32 {
        self.arms.load(Ordering::Acquire)
    }

    pub fn disarms(&self) -> u32 {
        self.disarms.load(Ordering::Acquire)
    }
}

/// Tick source driven by the test through its [`TickProbe`].
pub struct ManualTicks {
    probe: Arc<TickProbe>,
}

impl ManualTicks {
    pub fn new() -> (Self, Arc<TickProbe>) {
        let probe = Arc::new(TickProbe::default());
        (
            Self {
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

impl TickSource for ManualTicks {
    fn arm(&mut self, _period: Duration) -> Result<()> {
        self.probe.arms.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> bool {
        self.probe.signal.take(timeout)
    }

    fn disarm(&mut self) {
        self.probe.disarms.fetch_add(1, Ordering::AcqRel);
    }
}

/// Tick source that fires on its own, for free-running pipeline tests.
pub struct FreeTicks {
    period: Duration,
}

impl FreeTicks {
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(10),
        }
    }
}

impl TickSource for FreeTicks {
    fn arm(&mut self, period: Duration) -> Result<()> {
        self.period = self.period.min(period);
        Ok(())
    }

    fn wait(&mut self, _timeout: Duration) -> bool {
        std::thread::sleep(self.period);
        true
    }

    fn disarm(&mut self) {}
}

// ── RecordingReset ────────────────────────────────────────────

/// Records reset requests instead of restarting anything.
#[derive(Clone, Default)]
pub struct RecordingReset {
    pub resets: Arc<Mutex<Vec<ResetReason>>>,
}

#[allow(dead_code)]
impl RecordingReset {
    pub fn count(&self) -> usize {
        self.resets.lock().unwrap().len()
    }
}

impl ResetPort for RecordingReset {
    fn full_reset(&mut self, reason: ResetReason) {
        self.resets.lock().unwrap().push(reason);
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Collects every report the monitor emits.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub reports: Arc<Mutex<Vec<Report>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn len(&self) -> usize {
        self.reports.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Report> {
        self.reports.lock().unwrap().last().copied()
    }
}

impl ReportSink for RecordingSink {
    fn report(&mut self, report: &Report) {
        self.reports.lock().unwrap().push(*report);
    }
}

// ── MockFactory ───────────────────────────────────────────────

/// Builds real pipeline workers around the mocks above.
#[derive(Clone)]
pub struct MockFactory {
    pub adc: FixedAdc,
    pub reset: RecordingReset,
    pub sink: RecordingSink,
    pub samplers_built: Arc<AtomicU32>,
    pub fail_monitor: bool,
}

#[allow(dead_code)]
impl MockFactory {
    pub fn new(adc: FixedAdc) -> Self {
        Self {
            adc,
            reset: RecordingReset::default(),
            sink: RecordingSink::default(),
            samplers_built: Arc::new(AtomicU32::new(0)),
            fail_monitor: false,
        }
    }
}

impl PipelineFactory for MockFactory {
    fn sampler(&mut self, tx: Arc<BoundedChannel>, config: &SystemConfig) -> Result<Box<dyn Worker>> {
        self.samplers_built.fetch_add(1, Ordering::AcqRel);
        let sampler = Sampler::new(self.adc.clone(), FreeTicks::new(), self.reset.clone(), tx, config)?;
        Ok(Box::new(sampler))
    }

    fn voter(
        &mut self,
        rx: Arc<BoundedChannel>,
        tx: Arc<BoundedChannel>,
        config: &SystemConfig,
    ) -> Result<Box<dyn Worker>> {
        Ok(Box::new(Voter::new(rx, tx, config)))
    }

    fn monitor(&mut self, rx: Arc<BoundedChannel>, config: &SystemConfig) -> Result<Box<dyn Worker>> {
        if self.fail_monitor {
            return Err(Error::Init("monitor sink unavailable"));
        }
        Ok(Box::new(Monitor::new(rx, self.sink.clone(), config)))
    }
}

// ── Helpers ───────────────────────────────────────────────────

/// Default config with the start stagger removed and short timeouts.
pub fn fast_config() -> SystemConfig {
    let mut c = SystemConfig::default();
    c.worker_start_stagger_ms = 0;
    c.receive_timeout_ms = 50;
    c.dispatcher_poll_ms = 10;
    c
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
