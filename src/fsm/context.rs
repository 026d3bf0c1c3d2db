//! State threaded through every mode entry function.
//!
//! `ModeContext` lives on the main context with the dispatcher.  It owns the
//! two inter-stage channels, the worker handles and the factory that builds
//! fresh workers whenever `Init` runs.  Workers never see it; their only
//! shared surfaces are the channels and [`SystemState`].

use std::sync::Arc;

use log::info;

use super::SystemState;
use crate::app::ports::PipelineFactory;
use crate::channel::BoundedChannel;
use crate::config::SystemConfig;
use crate::pipeline::voter::ChannelFault;
use crate::supervisor::{self, StopOutcome, WorkerHandle};

pub const SENSOR_CHANNEL_NAME: &str = "sensor->voter";
pub const VOTER_CHANNEL_NAME: &str = "voter->monitor";

/// The shared context passed to every mode entry function.
pub struct ModeContext {
    pub system: Arc<SystemState>,
    pub config: SystemConfig,

    // -- Channels --
    pub sensor_to_voter: Arc<BoundedChannel>,
    pub voter_to_monitor: Arc<BoundedChannel>,

    // -- Workers --
    pub factory: Box<dyn PipelineFactory>,
    pub sampler: Option<WorkerHandle>,
    pub voter: Option<WorkerHandle>,
    pub monitor: Option<WorkerHandle>,

    // -- Faults --
    /// Most recent channel disagreement, latched by the failure modes.
    pub fault: Option<ChannelFault>,
    /// Failure-mode entries since boot.
    pub fault_count: u32,
}

impl ModeContext {
    pub fn new(system: Arc<SystemState>, config: SystemConfig, factory: Box<dyn PipelineFactory>) -> Self {
        let capacity = config.channel_capacity_bytes as usize;
        Self {
            system,
            config,
            sensor_to_voter: Arc::new(BoundedChannel::new(SENSOR_CHANNEL_NAME, capacity)),
            voter_to_monitor: Arc::new(BoundedChannel::new(VOTER_CHANNEL_NAME, capacity)),
            factory,
            sampler: None,
            voter: None,
            monitor: None,
            fault: None,
            fault_count: 0,
        }
    }

    /// Replace both channels with empty ones.  Only valid with no live
    /// workers, since a reclaimed worker may still hold the old pair.
    pub fn reset_channels(&mut self) {
        debug_assert_eq!(self.live_workers(), 0);
        let capacity = self.config.channel_capacity_bytes as usize;
        self.sensor_to_voter = Arc::new(BoundedChannel::new(SENSOR_CHANNEL_NAME, capacity));
        self.voter_to_monitor = Arc::new(BoundedChannel::new(VOTER_CHANNEL_NAME, capacity));
    }

    pub fn live_workers(&self) -> usize {
        [&self.sampler, &self.voter, &self.monitor]
            .into_iter()
            .filter(|h| h.as_ref().is_some_and(WorkerHandle::is_live))
            .count()
    }

    /// Stop every live worker, upstream first, each with its own stop
    /// timeout.  Returns how many acknowledged in time.
    pub fn stop_all(&mut self) -> usize {
        let system = Arc::clone(&self.system);
        let stages = [
            (&mut self.sampler, self.config.sampler_task.stop_timeout()),
            (&mut self.voter, self.config.voter_task.stop_timeout()),
            (&mut self.monitor, self.config.monitor_task.stop_timeout()),
        ];

        let mut acknowledged = 0;
        for (slot, timeout) in stages {
            let Some(mut handle) = slot.take() else {
                continue;
            };
            if !handle.is_live() {
                continue;
            }
            if supervisor::stop(&system, &mut handle, timeout) == StopOutcome::Acknowledged {
                acknowledged += 1;
            }
        }
        info!("[{}] workers stopped ({} acknowledged)", system.id(), acknowledged);
        acknowledged
    }
}
