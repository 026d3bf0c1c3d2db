//! Integration tests: sampler cycle and its soft watchdog.

use std::sync::Arc;
use std::time::Duration;

use tmrsense::app::ports::ResetReason;
use tmrsense::channel::BoundedChannel;
use tmrsense::config::SystemConfig;
use tmrsense::fsm::{Mode, SystemState};
use tmrsense::message::{SensorReading, SourceId, WireMessage};
use tmrsense::pipeline::sampler::Sampler;
use tmrsense::supervisor::{Worker, WorkerContext};

use crate::mock_hw::{FixedAdc, ManualTicks, RecordingReset, TickProbe};

type TestSampler = Sampler<FixedAdc, ManualTicks, RecordingReset>;

/// 100 Hz → 10 ms period, 12 ms deadline at the default 20 % tolerance.
fn config() -> SystemConfig {
    let mut c = SystemConfig::default();
    c.sample_frequency_hz = 100;
    c.reserve_timeout_ms = 10;
    c
}

fn sampler(
    config: &SystemConfig,
    adc: &FixedAdc,
    tx: &Arc<BoundedChannel>,
) -> (TestSampler, Arc<TickProbe>, RecordingReset) {
    let (ticks, probe) = ManualTicks::new();
    let reset = RecordingReset::default();
    let s = Sampler::new(adc.clone(), ticks, reset.clone(), Arc::clone(tx), config).unwrap();
    (s, probe, reset)
}

fn worker_ctx() -> WorkerContext {
    let system = Arc::new(SystemState::new("wdt").unwrap());
    for m in Mode::ALL {
        system.register(m);
    }
    WorkerContext::new(system, "sampler")
}

#[test]
fn deadline_is_period_plus_tolerance() {
    let c = config();
    assert_eq!(c.sample_period(), Duration::from_millis(10));
    assert_eq!(c.sample_deadline(), Duration::from_millis(12));
    assert_eq!(SystemConfig::default().sample_deadline(), Duration::from_millis(1200));
}

#[test]
fn tick_produces_one_sensor_reading() {
    let c = config();
    let adc = FixedAdc::new(c.thermistor, 1000);
    adc.set(c.adc_channels[1], 1001);
    let tx = Arc::new(BoundedChannel::new("a", 256));
    let (mut s, probe, reset) = sampler(&c, &adc, &tx);
    let ctx = worker_ctx();

    probe.tick();
    s.step(&ctx);

    assert_eq!(tx.len(), 1);
    let item = tx.receive(Duration::ZERO).unwrap();
    let reading = SensorReading::decode(&item).unwrap();
    assert_eq!(reading.source, SourceId::Sensor);
    assert_eq!(reading.raw, [1000, 1001, 1000]);
    assert!(reading.celsius.iter().all(|c| c.is_finite()));
    assert_eq!(s.stats().cycles, 1);
    assert_eq!(reset.count(), 0);
}

#[test]
fn missed_tick_resets_system() {
    let c = config();
    let adc = FixedAdc::new(c.thermistor, 2048);
    let tx = Arc::new(BoundedChannel::new("a", 256));
    let (mut s, _probe, reset) = sampler(&c, &adc, &tx);
    let ctx = worker_ctx();

    let start = std::time::Instant::now();
    s.step(&ctx);
    assert!(start.elapsed() >= c.sample_deadline());

    assert_eq!(*reset.resets.lock().unwrap(), vec![ResetReason::SampleDeadlineMissed]);
    assert_eq!(s.stats().deadline_misses, 1);
    assert!(tx.is_empty(), "no sample on a missed deadline");
}

#[test]
fn on_time_ticks_never_reset() {
    let c = config();
    let adc = FixedAdc::new(c.thermistor, 2048);
    let tx = Arc::new(BoundedChannel::new("a", 4096));
    let (mut s, probe, reset) = sampler(&c, &adc, &tx);
    let ctx = worker_ctx();

    for _ in 0..20 {
        probe.tick();
        s.step(&ctx);
    }
    assert_eq!(reset.count(), 0);
    assert_eq!(s.stats().cycles, 20);
}

#[test]
fn full_channel_drops_sample_without_blocking() {
    let c = config();
    let adc = FixedAdc::new(c.thermistor, 2048);
    // Room for exactly two readings (2 × 36 bytes).
    let tx = Arc::new(BoundedChannel::new("a", 72));
    let (mut s, probe, reset) = sampler(&c, &adc, &tx);
    let ctx = worker_ctx();

    for _ in 0..3 {
        probe.tick();
        s.step(&ctx);
    }
    assert_eq!(tx.len(), 2);
    assert_eq!(s.stats().dropped, 1);
    assert_eq!(reset.count(), 0);
}

#[test]
fn railed_channel_keeps_raw_code_with_nan_temperature() {
    let c = config();
    let adc = FixedAdc::new(c.thermistor, 2048);
    adc.set(c.adc_channels[0], c.thermistor.adc_max);
    let tx = Arc::new(BoundedChannel::new("a", 256));
    let (mut s, probe, _reset) = sampler(&c, &adc, &tx);
    let ctx = worker_ctx();

    probe.tick();
    s.step(&ctx);

    let item = tx.receive(Duration::ZERO).unwrap();
    let reading = SensorReading::decode(&item).unwrap();
    assert!(reading.celsius[0].is_nan());
    assert_eq!(reading.raw[0], c.thermistor.adc_max);
    assert!(reading.celsius[1].is_finite());
}

#[test]
fn invalid_channel_fails_construction() {
    let mut c = config();
    c.adc_channels = [6, 7, 9];
    let adc = FixedAdc::new(c.thermistor, 2048);
    let tx = Arc::new(BoundedChannel::new("a", 256));
    let (ticks, _probe) = ManualTicks::new();
    let result = Sampler::new(adc, ticks, RecordingReset::default(), tx, &c);
    assert!(result.is_err());
}
