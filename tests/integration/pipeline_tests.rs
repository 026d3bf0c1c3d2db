//! Integration tests: dispatcher → INIT → sampler/voter/monitor → reports.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tmrsense::app::events::Report;
use tmrsense::channel::BoundedChannel;
use tmrsense::fsm::context::ModeContext;
use tmrsense::fsm::states::build_mode_table;
use tmrsense::fsm::{Dispatcher, Mode, SystemState};
use tmrsense::message::{SensorReading, SourceId, WireMessage};
use tmrsense::pipeline::monitor::Monitor;
use tmrsense::pipeline::voter::{ChannelFault, Voter};
use tmrsense::sensors::thermistor::celsius_from_raw;
use tmrsense::supervisor::{Worker, WorkerContext};

use crate::mock_hw::{FixedAdc, MockFactory, RecordingSink, fast_config, wait_until};

const PATIENCE: Duration = Duration::from_secs(5);
const MID_SCALE: u16 = 2048;

struct Rig {
    dispatcher: Dispatcher,
    ctx: ModeContext,
    probe: MockFactory,
}

fn rig(factory: MockFactory) -> Rig {
    let config = fast_config();
    let system = Arc::new(SystemState::new("itest").unwrap());
    let dispatcher = Dispatcher::new(build_mode_table(), config.dispatcher_poll());
    dispatcher.register_all(&system);
    system.set_default(Mode::Init).unwrap();
    let probe = factory.clone();
    let ctx = ModeContext::new(system, config, Box::new(factory));
    Rig {
        dispatcher,
        ctx,
        probe,
    }
}

fn healthy_rig() -> Rig {
    let config = fast_config();
    rig(MockFactory::new(FixedAdc::new(config.thermistor, MID_SCALE)))
}

/// Dispatch until `mode` is entered or patience runs out.
fn dispatch_until(r: &mut Rig, mode: Mode) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < PATIENCE {
        if r.dispatcher.dispatch_once(&mut r.ctx) == Some(mode) {
            return true;
        }
    }
    false
}

#[test]
fn init_brings_pipeline_up_and_reports_agreed_values() {
    let mut r = healthy_rig();
    assert_eq!(r.dispatcher.dispatch_once(&mut r.ctx), Some(Mode::Init));
    assert_eq!(r.ctx.live_workers(), 3);
    assert_eq!(r.dispatcher.dispatch_once(&mut r.ctx), Some(Mode::SensorLoop));

    assert!(wait_until(PATIENCE, || r.probe.sink.len() >= 3));

    let expected = celsius_from_raw(&r.ctx.config.thermistor, MID_SCALE).unwrap();
    match r.probe.sink.last() {
        Some(Report::Agreed {
            mean,
            mean_raw,
            raw: Some(raw),
        }) => {
            assert!((mean - expected).abs() < 1e-4);
            assert_eq!(mean_raw, MID_SCALE & r.ctx.config.lsb_mask);
            assert_eq!(raw, [MID_SCALE; 3]);
        }
        other => panic!("expected agreed report, got {other:?}"),
    }

    assert_eq!(r.ctx.system.current(), Some(Mode::SensorLoop));
    assert_eq!(r.probe.reset.count(), 0);
    r.ctx.stop_all();
}

#[test]
fn disagreement_flags_failure_mode_and_keeps_reporting() {
    let mut r = healthy_rig();
    assert!(dispatch_until(&mut r, Mode::SensorLoop));

    // Channel 3 differs inside the mask: 1 = 2, 2 ≠ 3.
    let channels = r.ctx.config.adc_channels;
    r.probe.adc.set_all(channels, [0x812, 0x812, 0x813]);

    assert!(dispatch_until(&mut r, Mode::Sensor2Failure));
    assert_eq!(r.ctx.fault, Some(ChannelFault::Sensor2));
    assert_eq!(r.ctx.fault_count, 1);
    assert_eq!(r.ctx.live_workers(), 3);

    // Failure-flagged operation: values keep flowing.
    let seen = r.probe.sink.len();
    assert!(wait_until(PATIENCE, || r.probe.sink.len() > seen + 2));
    match r.probe.sink.last() {
        Some(Report::Agreed { mean_raw, .. }) => assert_eq!(mean_raw, 0x12),
        other => panic!("expected agreed report, got {other:?}"),
    }

    // A persistent disagreement does not re-dispatch the same mode.
    let before = r.dispatcher.dispatch_count();
    for _ in 0..5 {
        r.dispatcher.dispatch_once(&mut r.ctx);
    }
    assert_eq!(r.dispatcher.dispatch_count(), before);

    r.ctx.stop_all();
}

#[test]
fn high_bit_noise_outside_mask_is_not_a_failure() {
    let mut r = healthy_rig();
    assert!(dispatch_until(&mut r, Mode::SensorLoop));

    let channels = r.ctx.config.adc_channels;
    r.probe.adc.set_all(channels, [0x712, 0x312, 0xB12]);
    let seen = r.probe.sink.len();
    assert!(wait_until(PATIENCE, || r.probe.sink.len() > seen + 3));

    assert_eq!(r.ctx.system.current(), Some(Mode::SensorLoop));
    assert!(!r.ctx.system.is_pending());
    r.ctx.stop_all();
}

#[test]
fn halt_then_init_restarts_with_fresh_workers() {
    let mut r = healthy_rig();
    assert!(dispatch_until(&mut r, Mode::SensorLoop));

    r.ctx.system.request_transition(Mode::Halt).unwrap();
    assert!(dispatch_until(&mut r, Mode::Halt));
    assert_eq!(r.ctx.live_workers(), 0);

    r.ctx.system.request_transition(Mode::Init).unwrap();
    assert!(dispatch_until(&mut r, Mode::SensorLoop));
    assert_eq!(r.ctx.live_workers(), 3);
    assert_eq!(r.probe.samplers_built.load(Ordering::Acquire), 2);

    r.ctx.stop_all();
}

#[test]
fn factory_failure_halts_without_leaking_workers() {
    let config = fast_config();
    let mut factory = MockFactory::new(FixedAdc::new(config.thermistor, MID_SCALE));
    factory.fail_monitor = true;
    let mut r = rig(factory);

    assert_eq!(r.dispatcher.dispatch_once(&mut r.ctx), Some(Mode::Init));
    assert_eq!(r.ctx.live_workers(), 0);
    assert_eq!(r.dispatcher.dispatch_once(&mut r.ctx), Some(Mode::Halt));
}

#[test]
fn voter_without_raw_forwarding_reports_no_raw_codes() {
    let mut config = fast_config();
    config.forward_raw_codes = false;
    let system = Arc::new(SystemState::new("itest").unwrap());
    for m in Mode::ALL {
        system.register(m);
    }
    system.set_default(Mode::SensorLoop).unwrap();

    let a = Arc::new(BoundedChannel::new("a", 256));
    let b = Arc::new(BoundedChannel::new("b", 256));
    let mut voter = Voter::new(Arc::clone(&a), Arc::clone(&b), &config);
    let sink = RecordingSink::default();
    let mut monitor = Monitor::new(Arc::clone(&b), sink.clone(), &config);
    let ctx = WorkerContext::new(Arc::clone(&system), "manual");

    let reading = SensorReading::from_sensor([21.0, 22.0, 23.0], [0x40; 3]);
    a.send(&reading, Duration::ZERO).unwrap();
    voter.step(&ctx);
    monitor.step(&ctx);

    assert_eq!(
        sink.last(),
        Some(Report::Agreed {
            mean: 22.0,
            mean_raw: 0x40,
            raw: None
        })
    );
    assert!(a.is_empty() && b.is_empty());
}

#[test]
fn voter_rejects_voter_messages_on_sensor_channel() {
    let config = fast_config();
    let system = Arc::new(SystemState::new("itest").unwrap());
    let a = Arc::new(BoundedChannel::new("a", 256));
    let b = Arc::new(BoundedChannel::new("b", 256));
    let mut voter = Voter::new(Arc::clone(&a), Arc::clone(&b), &config);
    let ctx = WorkerContext::new(system, "manual");

    let mut stray = SensorReading::from_sensor([0.0; 3], [0; 3]);
    stray.source = SourceId::Voter;
    a.send(&stray, Duration::ZERO).unwrap();
    voter.step(&ctx);

    assert!(b.is_empty());
    assert_eq!(voter.stats().rejected, 1);
    assert_eq!(a.free_bytes(), a.capacity());
    assert_eq!(SensorReading::WIRE_SIZE, 25);
}
