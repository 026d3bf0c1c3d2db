//! Mode register and dispatcher.
//!
//! Two halves, split by who touches them:
//!
//! ```text
//!  any worker                         main context
//!  ──────────                         ────────────
//!  request_transition(m) ──┐
//!                          ▼
//!               ┌─────────────────────┐
//!               │ SystemState         │
//!               │  Mutex<current,     │   wait_pending(poll)
//!               │        registered>  │ ───────────────────▶ Dispatcher
//!               │  BinarySignal       │                         │
//!               └─────────────────────┘                         ▼
//!                                                 table[current].on_enter(ctx)
//! ```
//!
//! [`SystemState`] is shared by `Arc` with every worker.  Requests only
//! record the desired mode and raise the pending signal; they never run
//! entry logic.  The [`Dispatcher`] owns the mode table and runs one entry
//! function per wake, on the main context.  A burst of requests before the
//! dispatcher wakes collapses into a single dispatch of the latest mode.

pub mod context;
pub mod states;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use context::ModeContext;
use log::{debug, info};

use crate::config::SYSTEM_NAME_MAX;
use crate::error::{Error, ModeError, Result};
use crate::sync::BinarySignal;

// ---------------------------------------------------------------------------
// Mode identity
// ---------------------------------------------------------------------------

/// Operating modes of the system.
/// Must stay in sync with the table built in [`states::build_mode_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Mode {
    /// Bring up storage-backed state and start the pipeline workers.
    Init = 0,
    /// Normal sensing; all three channels agree.
    SensorLoop = 1,
    /// Channel 1 and 2 disagree.
    Sensor1Failure = 2,
    /// Channel 2 and 3 disagree.
    Sensor2Failure = 3,
    /// Channel 1 and 3 disagree.
    Sensor3Failure = 4,
    /// Pipeline stopped.
    Halt = 5,
}

impl Mode {
    /// Total number of modes, used to size the table array.
    pub const COUNT: usize = 6;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Init,
        Self::SensorLoop,
        Self::Sensor1Failure,
        Self::Sensor2Failure,
        Self::Sensor3Failure,
        Self::Halt,
    ];

    /// Convert an index back to `Mode`.  Panics on out-of-range in debug
    /// builds; returns `Halt` in release.
    pub fn from_index(idx: usize) -> Self {
        match Self::ALL.get(idx) {
            Some(&mode) => mode,
            None => {
                debug_assert!(false, "invalid mode index: {idx}");
                Self::Halt
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::SensorLoop => "SENSOR_LOOP",
            Self::Sensor1Failure => "SENSOR1_FAILURE",
            Self::Sensor2Failure => "SENSOR2_FAILURE",
            Self::Sensor3Failure => "SENSOR3_FAILURE",
            Self::Halt => "HALT",
        }
    }

    /// One of the `SENSORn_FAILURE` modes.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Sensor1Failure | Self::Sensor2Failure | Self::Sensor3Failure
        )
    }

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

// ---------------------------------------------------------------------------
// SystemState
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ModeRegister {
    /// `None` until `set_default` seeds it.
    current: Option<Mode>,
    /// Bitmask of registered modes, indexed by `Mode as u8`.
    registered: u8,
}

/// The system's identity and current mode, shared with every worker.
#[derive(Debug)]
pub struct SystemState {
    id: heapless::String<SYSTEM_NAME_MAX>,
    register: Mutex<ModeRegister>,
    pending: BinarySignal,
}

impl SystemState {
    /// Create a system with no registered modes.
    pub fn new(id: &str) -> Result<Self> {
        let mut name = heapless::String::new();
        name.push_str(id)
            .map_err(|_| Error::Config("system id longer than 15 bytes"))?;
        Ok(Self {
            id: name,
            register: Mutex::new(ModeRegister::default()),
            pending: BinarySignal::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add `mode` to the closed set of modes this system may enter.
    pub fn register(&self, mode: Mode) {
        self.lock().registered |= mode.bit();
    }

    pub fn is_registered(&self, mode: Mode) -> bool {
        self.lock().registered & mode.bit() != 0
    }

    /// Seed the initial mode and arm the first dispatch.
    pub fn set_default(&self, mode: Mode) -> Result<()> {
        let mut reg = self.lock();
        if reg.registered & mode.bit() == 0 {
            return Err(ModeError::Unregistered(mode).into());
        }
        reg.current = Some(mode);
        self.pending.give();
        Ok(())
    }

    /// Ask the dispatcher to enter `mode`.
    ///
    /// Returns as soon as the request is recorded.  Asking for the mode that
    /// is already current while nothing is pending does nothing, so a
    /// persistent condition reported every cycle dispatches once.
    pub fn request_transition(&self, mode: Mode) -> Result<()> {
        let mut reg = self.lock();
        if reg.registered & mode.bit() == 0 {
            return Err(ModeError::Unregistered(mode).into());
        }
        if reg.current == Some(mode) && !self.pending.is_set() {
            return Ok(());
        }
        if reg.current != Some(mode) {
            debug!(
                "[{}] transition requested: {} -> {}",
                self.id,
                reg.current.map_or("-", Mode::name),
                mode.name()
            );
        }
        reg.current = Some(mode);
        self.pending.give();
        Ok(())
    }

    /// Record `mode` only if no request is waiting to be dispatched.
    ///
    /// Entry functions use this for their own follow-up so a worker request
    /// raised while they ran is never overwritten.  Returns whether `mode`
    /// was recorded.
    pub fn request_if_idle(&self, mode: Mode) -> Result<bool> {
        let mut reg = self.lock();
        if reg.registered & mode.bit() == 0 {
            return Err(ModeError::Unregistered(mode).into());
        }
        if self.pending.is_set() {
            return Ok(false);
        }
        reg.current = Some(mode);
        self.pending.give();
        Ok(true)
    }

    /// Withdraw a waiting request that `discard` matches and settle back on
    /// `mode` without arming a dispatch.  Returns the withdrawn mode.
    pub fn discard_pending(&self, mode: Mode, discard: impl Fn(Mode) -> bool) -> Option<Mode> {
        let mut reg = self.lock();
        let requested = reg.current?;
        if !self.pending.is_set() || !discard(requested) {
            return None;
        }
        self.pending.try_take();
        reg.current = Some(mode);
        Some(requested)
    }

    /// The mode most recently requested (or seeded).
    pub fn current(&self) -> Option<Mode> {
        self.lock().current
    }

    /// Whether a transition is recorded but not yet dispatched.
    pub fn is_pending(&self) -> bool {
        self.pending.is_set()
    }

    /// Wait up to `timeout` for a pending transition; consume it and return
    /// the mode to dispatch.
    pub fn wait_pending(&self, timeout: Duration) -> Option<Mode> {
        if !self.pending.take(timeout) {
            return None;
        }
        self.lock().current
    }

    fn lock(&self) -> MutexGuard<'_, ModeRegister> {
        self.register.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Mode table
// ---------------------------------------------------------------------------

/// Signature of a mode's entry logic.  Runs to completion on the main
/// context; advances by calling `request_transition`, never by looping.
pub type ModeEntryFn = fn(&mut ModeContext);

/// One row of the mode table.
pub struct ModeDescriptor {
    pub id: Mode,
    pub name: &'static str,
    pub on_enter: ModeEntryFn,
    /// Steady modes never request a transition themselves; the dispatcher
    /// idles in them until a worker does.
    pub steady: bool,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Runs the entry logic of each mode the system is asked to enter.
pub struct Dispatcher {
    /// Fixed-size table indexed by `Mode as usize`.
    table: [ModeDescriptor; Mode::COUNT],
    /// Bounded wait per poll of the pending signal.
    poll: Duration,
    /// Entry functions run since construction.
    dispatch_count: u64,
}

impl Dispatcher {
    pub fn new(table: [ModeDescriptor; Mode::COUNT], poll: Duration) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "mode table out of order"
        );
        Self {
            table,
            poll,
            dispatch_count: 0,
        }
    }

    /// Register every mode in the table with `system`.
    pub fn register_all(&self, system: &SystemState) {
        for desc in &self.table {
            system.register(desc.id);
        }
    }

    /// Wait one poll interval for a pending transition and, if one fired,
    /// run the entry logic of the now-current mode.
    pub fn dispatch_once(&mut self, ctx: &mut ModeContext) -> Option<Mode> {
        let mode = ctx.system.wait_pending(self.poll)?;
        let desc = &self.table[mode as usize];

        info!("[{}] entering {}", ctx.system.id(), desc.name);
        (desc.on_enter)(ctx);
        self.dispatch_count += 1;

        if desc.steady && !ctx.system.is_pending() {
            debug!("[{}] idle in {}", ctx.system.id(), desc.name);
        }
        Some(mode)
    }

    /// Dispatch forever.
    pub fn run(&mut self, ctx: &mut ModeContext) -> ! {
        info!(
            "[{}] dispatcher running (poll={}ms)",
            ctx.system.id(),
            self.poll.as_millis()
        );
        loop {
            self.dispatch_once(ctx);
        }
    }

    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }

    pub fn descriptor(&self, mode: Mode) -> &ModeDescriptor {
        &self.table[mode as usize]
    }
}
