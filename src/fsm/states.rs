//! Mode entry functions and table builder.
//!
//! Each mode is one plain `fn` pointer run to completion by the dispatcher.
//! Entry functions advance the machine only through `request_transition`.
//!
//! ```text
//!  INIT ──[workers up]──▶ SENSOR_LOOP
//!   │ ▲                       │
//!   │ └──────[re-init]────────┤ [voter: 1≠2 / 2≠3 / 1≠3]
//!   │                         ▼
//!   │               SENSORn_FAILURE (pipeline keeps running)
//!   │
//!   └──[factory error]──▶ HALT ◀──[shutdown]── any mode
//! ```

use std::sync::Arc;
use std::thread;

use log::{error, info, warn};

use super::context::ModeContext;
use super::{Mode, ModeDescriptor};
use crate::error::Result;
use crate::pipeline::voter::ChannelFault;
use crate::supervisor::{self, TaskSpec};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static mode table.  Called once at startup.
pub fn build_mode_table() -> [ModeDescriptor; Mode::COUNT] {
    [
        ModeDescriptor {
            id: Mode::Init,
            name: Mode::Init.name(),
            on_enter: init_enter,
            steady: false,
        },
        ModeDescriptor {
            id: Mode::SensorLoop,
            name: Mode::SensorLoop.name(),
            on_enter: sensor_loop_enter,
            steady: true,
        },
        ModeDescriptor {
            id: Mode::Sensor1Failure,
            name: Mode::Sensor1Failure.name(),
            on_enter: sensor1_failure_enter,
            steady: true,
        },
        ModeDescriptor {
            id: Mode::Sensor2Failure,
            name: Mode::Sensor2Failure.name(),
            on_enter: sensor2_failure_enter,
            steady: true,
        },
        ModeDescriptor {
            id: Mode::Sensor3Failure,
            name: Mode::Sensor3Failure.name(),
            on_enter: sensor3_failure_enter,
            steady: true,
        },
        ModeDescriptor {
            id: Mode::Halt,
            name: Mode::Halt.name(),
            on_enter: halt_enter,
            steady: true,
        },
    ]
}

fn advance(ctx: &ModeContext, mode: Mode) {
    if let Err(e) = ctx.system.request_transition(mode) {
        error!("[{}] cannot request {}: {e}", ctx.system.id(), mode.name());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  INIT: bring the pipeline up
// ═══════════════════════════════════════════════════════════════════════════

fn init_enter(ctx: &mut ModeContext) {
    if ctx.live_workers() > 0 {
        info!("INIT: restarting, stopping {} live workers", ctx.live_workers());
        ctx.stop_all();
    }
    ctx.reset_channels();
    ctx.fault = None;

    match start_pipeline(ctx) {
        Ok(()) => {
            info!(
                "INIT: pipeline up, sampling at {} Hz (deadline {}ms)",
                ctx.config.sample_frequency_hz,
                ctx.config.sample_deadline().as_millis()
            );
            match ctx.system.request_if_idle(Mode::SensorLoop) {
                Ok(true) => {}
                Ok(false) => warn!(
                    "INIT: {} raised during start-up, dispatching it instead",
                    ctx.system.current().map_or("-", Mode::name)
                ),
                Err(e) => error!("[{}] cannot request SENSOR_LOOP: {e}", ctx.system.id()),
            }
        }
        Err(e) => {
            error!("INIT: pipeline start failed: {e}");
            ctx.stop_all();
            advance(ctx, Mode::Halt);
        }
    }
}

/// Start sampler, voter and monitor in that order, downstream stages
/// staggered so the sampler has produced before anyone waits on it.
fn start_pipeline(ctx: &mut ModeContext) -> Result<()> {
    let stagger = ctx.config.worker_start_stagger();

    let sampler = ctx
        .factory
        .sampler(Arc::clone(&ctx.sensor_to_voter), &ctx.config)?;
    let spec = TaskSpec::from_config("sampler\0", &ctx.config.sampler_task);
    ctx.sampler = Some(supervisor::start(&ctx.system, sampler, &spec));

    thread::sleep(stagger);

    let voter = ctx.factory.voter(
        Arc::clone(&ctx.sensor_to_voter),
        Arc::clone(&ctx.voter_to_monitor),
        &ctx.config,
    )?;
    let spec = TaskSpec::from_config("voter\0", &ctx.config.voter_task);
    ctx.voter = Some(supervisor::start(&ctx.system, voter, &spec));

    thread::sleep(stagger);

    let monitor = ctx
        .factory
        .monitor(Arc::clone(&ctx.voter_to_monitor), &ctx.config)?;
    let spec = TaskSpec::from_config("monitor\0", &ctx.config.monitor_task);
    ctx.monitor = Some(supervisor::start(&ctx.system, monitor, &spec));

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
//  SENSOR_LOOP: normal operation, nothing to do on the main context
// ═══════════════════════════════════════════════════════════════════════════

fn sensor_loop_enter(ctx: &mut ModeContext) {
    info!(
        "SENSOR_LOOP: {} workers live, mask={:#06x}",
        ctx.live_workers(),
        ctx.config.lsb_mask
    );
}

// ═══════════════════════════════════════════════════════════════════════════
//  SENSORn_FAILURE: channel disagreement, pipeline keeps running
// ═══════════════════════════════════════════════════════════════════════════

fn latch_fault(ctx: &mut ModeContext, fault: ChannelFault) {
    ctx.fault = Some(fault);
    ctx.fault_count += 1;
    error!(
        "{}: thermistor channels disagree ({:?}, {} since boot)",
        fault.mode().name(),
        fault,
        ctx.fault_count
    );
    if ctx.live_workers() < 3 {
        warn!("{}: only {} workers live", fault.mode().name(), ctx.live_workers());
    }
}

fn sensor1_failure_enter(ctx: &mut ModeContext) {
    latch_fault(ctx, ChannelFault::Sensor1);
}

fn sensor2_failure_enter(ctx: &mut ModeContext) {
    latch_fault(ctx, ChannelFault::Sensor2);
}

fn sensor3_failure_enter(ctx: &mut ModeContext) {
    latch_fault(ctx, ChannelFault::Sensor3);
}

// ═══════════════════════════════════════════════════════════════════════════
//  HALT: controlled shutdown
// ═══════════════════════════════════════════════════════════════════════════

fn halt_enter(ctx: &mut ModeContext) {
    let live = ctx.live_workers();
    if live > 0 {
        ctx.stop_all();
    }
    if let Some(dropped) = ctx.system.discard_pending(Mode::Halt, Mode::is_failure) {
        info!("HALT: dropped {} raised during shutdown", dropped.name());
    }
    info!("HALT: pipeline stopped ({live} workers were live)");
}
