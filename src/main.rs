//! TMRSense Firmware: Main Entry Point
//!
//! Triple-redundant thermistor sensing on a dual-core ESP32.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  ThermistorBank  PeriodicTimer  SystemResetter  LogReportSink  │
//! │  (AdcPort)       (TickSource)   (ResetPort)     (ReportSink)   │
//! │  NvsAdapter (ConfigPort + StoragePort)                         │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │   core 0            core 1              core 1                 │
//! │  ┌─────────┐  ch  ┌────────┐   ch    ┌─────────┐              │
//! │  │ Sampler │ ───▶ │ Voter  │ ──────▶ │ Monitor │              │
//! │  └─────────┘      └────────┘         └─────────┘              │
//! │        │ deadline miss   │ disagreement                        │
//! │        ▼                 ▼                                     │
//! │   full reset      request_transition ──▶ Dispatcher (main)     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{info, warn};

use tmrsense::adapters::log_sink::LogReportSink;
use tmrsense::adapters::nvs::{self, NvsAdapter};
use tmrsense::adapters::reset::SystemResetter;
use tmrsense::app::ports::{ConfigPort, PipelineFactory};
use tmrsense::channel::BoundedChannel;
use tmrsense::config::SystemConfig;
use tmrsense::diagnostics::{self, ResetLog};
use tmrsense::drivers::hw_timer::PeriodicTimer;
use tmrsense::fsm::context::ModeContext;
use tmrsense::fsm::states::build_mode_table;
use tmrsense::fsm::{Dispatcher, Mode, SystemState};
use tmrsense::pipeline::monitor::Monitor;
use tmrsense::pipeline::sampler::Sampler;
use tmrsense::pipeline::voter::Voter;
use tmrsense::sensors::thermistor::ThermistorBank;
use tmrsense::supervisor::Worker;

// ── Pipeline factory ──────────────────────────────────────────
//
// Builds each worker with the real peripherals it owns.  Called by the
// INIT mode every time the pipeline is (re)started.

struct DevicePipelineFactory;

impl PipelineFactory for DevicePipelineFactory {
    fn sampler(
        &mut self,
        tx: Arc<BoundedChannel>,
        config: &SystemConfig,
    ) -> tmrsense::error::Result<Box<dyn Worker>> {
        let adc = ThermistorBank::new(config.thermistor)?;
        let tick = PeriodicTimer::new("sample_tick\0");
        let reset = SystemResetter::new(NvsAdapter::new(), "sampler watchdog");
        Ok(Box::new(Sampler::new(adc, tick, reset, tx, config)?))
    }

    fn voter(
        &mut self,
        rx: Arc<BoundedChannel>,
        tx: Arc<BoundedChannel>,
        config: &SystemConfig,
    ) -> tmrsense::error::Result<Box<dyn Worker>> {
        Ok(Box::new(Voter::new(rx, tx, config)))
    }

    fn monitor(
        &mut self,
        rx: Arc<BoundedChannel>,
        config: &SystemConfig,
    ) -> tmrsense::error::Result<Box<dyn Worker>> {
        Ok(Box::new(Monitor::new(rx, LogReportSink::new(), config)))
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  TMRSense v{}                        ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Persistent storage + reset history ─────────────────
    nvs::init_flash().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let mut store = NvsAdapter::new();
    let mut resets = ResetLog::new();
    resets.init(&store);
    for entry in resets.take_all(&mut store) {
        warn!(
            "previous reset: {} at {}ms ({})",
            entry.reason, entry.uptime_ms, entry.detail
        );
    }
    diagnostics::install_panic_handler();

    // ── 3. Load config from NVS (or defaults) ─────────────────
    let config = match store.load() {
        Ok(cfg) => {
            info!("Config loaded from NVS");
            cfg
        }
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            SystemConfig::default()
        }
    };

    // ── 4. State machine ──────────────────────────────────────
    let system = Arc::new(SystemState::new(&config.system_name)?);
    let mut dispatcher = Dispatcher::new(build_mode_table(), config.dispatcher_poll());
    dispatcher.register_all(&system);
    system.set_default(Mode::Init)?;

    let mut ctx = ModeContext::new(system, config, Box::new(DevicePipelineFactory));

    info!("System ready. Entering dispatcher.");

    // ── 5. Dispatch forever ───────────────────────────────────
    dispatcher.run(&mut ctx)
}
