//! Integration tests: pipeline workers under the supervisor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use tmrsense::channel::BoundedChannel;
use tmrsense::config::SystemConfig;
use tmrsense::fsm::{Mode, SystemState};
use tmrsense::pipeline::monitor::Monitor;
use tmrsense::pipeline::sampler::Sampler;
use tmrsense::pipeline::voter::Voter;
use tmrsense::supervisor::{self, StopOutcome, TaskSpec, Worker, WorkerContext};

use crate::mock_hw::{FixedAdc, ManualTicks, RecordingReset, RecordingSink, wait_until};

const STOP: Duration = Duration::from_secs(2);

fn system() -> Arc<SystemState> {
    let s = Arc::new(SystemState::new("sup").unwrap());
    for m in Mode::ALL {
        s.register(m);
    }
    s
}

fn spec(name: &'static str) -> TaskSpec {
    TaskSpec::from_config(name, &SystemConfig::default().voter_task)
}

#[test]
fn sampler_arms_on_start_and_disarms_before_ack() {
    let mut config = SystemConfig::default();
    config.sample_frequency_hz = 100;
    let system = system();
    let tx = Arc::new(BoundedChannel::new("a", 1024));
    let adc = FixedAdc::new(config.thermistor, 2048);
    let (ticks, probe) = ManualTicks::new();
    let reset = RecordingReset::default();
    let sampler = Sampler::new(adc, ticks, reset.clone(), Arc::clone(&tx), &config).unwrap();

    // Feed ticks from the side for the whole run so no reset fires.
    let feeding = Arc::new(AtomicBool::new(true));
    let feeder = {
        let feeding = Arc::clone(&feeding);
        let probe = Arc::clone(&probe);
        std::thread::spawn(move || {
            while feeding.load(Ordering::Acquire) {
                probe.tick();
                std::thread::sleep(Duration::from_millis(2));
            }
        })
    };

    let mut handle = supervisor::start(&system, Box::new(sampler), &spec("sampler\0"));
    assert!(wait_until(STOP, || probe.arms() == 1));
    assert!(wait_until(STOP, || !tx.is_empty()));

    assert_eq!(supervisor::stop(&system, &mut handle, STOP), StopOutcome::Acknowledged);
    feeding.store(false, Ordering::Release);
    feeder.join().unwrap();

    assert!(!handle.is_live());
    assert_eq!(probe.disarms(), 1);
    assert_eq!(reset.count(), 0);
}

#[test]
fn unresponsive_worker_is_reclaimed_after_timeout() {
    struct Slow {
        steps: Arc<AtomicU32>,
    }

    impl Worker for Slow {
        fn step(&mut self, _ctx: &WorkerContext) {
            self.steps.fetch_add(1, Ordering::AcqRel);
            std::thread::sleep(Duration::from_millis(300));
        }
    }

    let system = system();
    let steps = Arc::new(AtomicU32::new(0));
    let mut handle = supervisor::start(
        &system,
        Box::new(Slow {
            steps: Arc::clone(&steps),
        }),
        &spec("slow\0"),
    );
    assert!(wait_until(STOP, || steps.load(Ordering::Acquire) >= 1));

    let start = std::time::Instant::now();
    let outcome = supervisor::stop(&system, &mut handle, Duration::from_millis(20));
    assert_eq!(outcome, StopOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_millis(250));
    assert!(!handle.is_live());
}

#[test]
fn worker_request_wakes_pending_wait() {
    struct Requester {
        mode: Mode,
    }

    impl Worker for Requester {
        fn step(&mut self, ctx: &WorkerContext) {
            ctx.request_transition(self.mode).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    let system = system();
    system.set_default(Mode::SensorLoop).unwrap();
    system.wait_pending(Duration::ZERO);

    let mut handle = supervisor::start(
        &system,
        Box::new(Requester {
            mode: Mode::Sensor1Failure,
        }),
        &spec("req1\0"),
    );
    let fired = system.wait_pending(STOP);
    assert_eq!(fired, Some(Mode::Sensor1Failure));

    assert_eq!(supervisor::stop(&system, &mut handle, STOP), StopOutcome::Acknowledged);
}

fn idle_channel_config() -> SystemConfig {
    let mut config = SystemConfig::default();
    config.receive_timeout_ms = 300;
    config
}

/// Stop a worker whose next step is about to block on an empty channel and
/// check it acknowledges within one receive timeout plus the stop timeout.
fn assert_stops_from_channel_wait(system: &Arc<SystemState>, worker: Box<dyn Worker>, config: &SystemConfig) {
    let spec = spec("blocked\0");
    let mut handle = supervisor::start(system, worker, &spec);
    std::thread::sleep(Duration::from_millis(50));

    let stop_timeout = config.voter_task.stop_timeout();
    let budget = config.receive_timeout() + stop_timeout;
    let start = std::time::Instant::now();
    assert_eq!(supervisor::stop(system, &mut handle, stop_timeout), StopOutcome::Acknowledged);
    assert!(start.elapsed() <= budget, "stop took {:?}", start.elapsed());
    assert!(!handle.is_live());
}

#[test]
fn voter_blocked_on_empty_channel_stops_in_time() {
    let config = idle_channel_config();
    let system = system();
    let rx = Arc::new(BoundedChannel::new("in", 1024));
    let tx = Arc::new(BoundedChannel::new("out", 1024));
    let voter = Voter::new(rx, Arc::clone(&tx), &config);

    assert_stops_from_channel_wait(&system, Box::new(voter), &config);
    assert!(tx.is_empty());
}

#[test]
fn monitor_blocked_on_empty_channel_stops_in_time() {
    let config = idle_channel_config();
    let system = system();
    let rx = Arc::new(BoundedChannel::new("in", 1024));
    let sink = RecordingSink::default();
    let monitor = Monitor::new(rx, sink.clone(), &config);

    assert_stops_from_channel_wait(&system, Box::new(monitor), &config);
    assert_eq!(sink.len(), 0);
}
