//! Worker supervision: start, cooperative stop, bounded join.
//!
//! Every pipeline stage is a [`Worker`] driven by the same body:
//!
//! ```text
//!   on_start ──▶ ┌─────────────────────┐
//!                │ while !stop { step } │
//!                └─────────────────────┘
//!                       │ stop flag seen
//!                       ▼
//!               on_stop ──▶ ack.give() ──▶ park until reclaimed
//! ```
//!
//! [`stop`] raises the stop flag, waits a bounded time for the ack, and
//! then reclaims the thread whether or not the ack arrived.  A worker
//! therefore never falls off the end of its body on its own; it exits only
//! once the supervisor lets it go.
//!
//! `step` must return within a bounded time (every wait inside it has a
//! timeout), since the stop flag is polled once per iteration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::config::TaskConfig;
use crate::drivers::task_pin::{self, Core};
use crate::error::Result;
use crate::fsm::{Mode, SystemState};
use crate::sync::BinarySignal;

/// Poll period of a stopped worker waiting to be reclaimed.
const PARK_POLL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Worker trait
// ---------------------------------------------------------------------------

/// A long-lived loop run on its own execution context.
pub trait Worker: Send + 'static {
    /// Runs once on the worker's thread before the first `step`.
    fn on_start(&mut self, _ctx: &WorkerContext) {}

    /// One bounded iteration of the loop.
    fn step(&mut self, ctx: &WorkerContext);

    /// Runs once after the stop flag is seen, before the acknowledgment.
    fn on_stop(&mut self, _ctx: &WorkerContext) {}
}

/// Stop/ack flags shared between a worker and its handle.
#[derive(Debug, Default)]
struct TaskControl {
    stop: AtomicBool,
    ack: BinarySignal,
    reclaim: AtomicBool,
}

/// What a worker sees of the system while running.
pub struct WorkerContext {
    system: Arc<SystemState>,
    name: &'static str,
    control: Arc<TaskControl>,
}

impl WorkerContext {
    /// A context not bound to any handle, for driving a worker by hand.
    pub fn new(system: Arc<SystemState>, name: &'static str) -> Self {
        Self {
            system,
            name: name.trim_end_matches('\0'),
            control: Arc::default(),
        }
    }

    pub fn system(&self) -> &SystemState {
        &self.system
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stop_requested(&self) -> bool {
        self.control.stop.load(Ordering::Acquire)
    }

    /// Forward a mode request to the state machine.
    pub fn request_transition(&self, mode: Mode) -> Result<()> {
        self.system.request_transition(mode)
    }
}

// ---------------------------------------------------------------------------
// Task spec and handle
// ---------------------------------------------------------------------------

/// Where and how to run a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// NUL-terminated task name.
    pub name: &'static str,
    pub stack_bytes: usize,
    pub priority: u8,
    pub affinity: Option<Core>,
}

impl TaskSpec {
    pub fn from_config(name: &'static str, cfg: &TaskConfig) -> Self {
        Self {
            name,
            stack_bytes: cfg.stack_bytes as usize,
            priority: cfg.priority,
            affinity: cfg.core.and_then(Core::from_index),
        }
    }
}

/// Result of [`stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The worker acknowledged and its thread was joined.
    Acknowledged,
    /// No acknowledgment in time; the thread was reclaimed regardless.
    TimedOut,
}

/// A started worker.  Live until passed to [`stop`], retired afterwards.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    system: Option<Arc<SystemState>>,
    control: Option<Arc<TaskControl>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_live(&self) -> bool {
        self.thread.is_some()
    }

    /// Whether the worker has seen its stop flag and acknowledged.
    pub fn has_acknowledged(&self) -> bool {
        self.control.as_ref().is_some_and(|c| c.ack.is_set())
    }

    fn retire(&mut self) -> Option<(Arc<TaskControl>, JoinHandle<()>)> {
        self.system = None;
        let control = self.control.take()?;
        let thread = self.thread.take()?;
        Some((control, thread))
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Never leave a live thread without a way to exit.
        if let Some(control) = &self.control {
            control.stop.store(true, Ordering::Release);
            control.reclaim.store(true, Ordering::Release);
            debug!("worker '{}' handle dropped while live; detaching", self.name);
        }
    }
}

// ---------------------------------------------------------------------------
// start / stop
// ---------------------------------------------------------------------------

/// Launch `worker` on a new execution context bound to `system`.
///
/// Panics if the scheduler cannot create the context.
pub fn start(system: &Arc<SystemState>, worker: Box<dyn Worker>, spec: &TaskSpec) -> WorkerHandle {
    let control = Arc::new(TaskControl::default());
    let ctx = WorkerContext {
        system: Arc::clone(system),
        name: spec.name.trim_end_matches('\0'),
        control: Arc::clone(&control),
    };

    let thread = task_pin::spawn_on_core(
        spec.affinity,
        spec.priority,
        spec.stack_bytes,
        spec.name,
        move || worker_body(worker, &ctx),
    );

    info!("[{}] worker '{}' started", system.id(), ctx_name(spec));
    WorkerHandle {
        name: ctx_name(spec),
        system: Some(Arc::clone(system)),
        control: Some(control),
        thread: Some(thread),
    }
}

/// Stop a live worker, waiting up to `timeout` for it to acknowledge.
///
/// The handle is retired on return in either outcome.
///
/// # Panics
///
/// On a retired handle, on a handle already mid-stop, or on a handle
/// started under a different system.
pub fn stop(system: &Arc<SystemState>, handle: &mut WorkerHandle, timeout: Duration) -> StopOutcome {
    assert!(handle.is_live(), "stop on retired worker '{}'", handle.name);
    assert!(
        handle.system.as_ref().is_some_and(|s| Arc::ptr_eq(s, system)),
        "worker '{}' belongs to another system",
        handle.name
    );
    let name = handle.name;
    let Some((control, thread)) = handle.retire() else {
        unreachable!("live handle without control block");
    };
    let already = control.stop.swap(true, Ordering::AcqRel);
    assert!(!already, "worker '{name}' is already stopping");

    let outcome = if control.ack.take(timeout) {
        StopOutcome::Acknowledged
    } else {
        warn!(
            "[{}] worker '{}' did not acknowledge stop within {}ms; reclaiming",
            system.id(),
            name,
            timeout.as_millis()
        );
        StopOutcome::TimedOut
    };

    control.reclaim.store(true, Ordering::Release);
    thread.thread().unpark();

    match outcome {
        StopOutcome::Acknowledged => {
            if thread.join().is_err() {
                error!("[{}] worker '{}' panicked during shutdown", system.id(), name);
            }
        }
        // The thread keeps no resources the supervisor needs back; it exits
        // on its own at its next stop check.
        StopOutcome::TimedOut => drop(thread),
    }

    info!("[{}] worker '{}' stopped ({:?})", system.id(), name, outcome);
    outcome
}

fn ctx_name(spec: &TaskSpec) -> &'static str {
    spec.name.trim_end_matches('\0')
}

fn worker_body(mut worker: Box<dyn Worker>, ctx: &WorkerContext) {
    worker.on_start(ctx);
    while !ctx.stop_requested() {
        worker.step(ctx);
    }
    worker.on_stop(ctx);
    ctx.control.ack.give();

    while !ctx.control.reclaim.load(Ordering::Acquire) {
        std::thread::park_timeout(PARK_POLL);
    }
}
