//! Monitor: the last consumer in the pipeline.
//!
//! Receives from channel B, decodes, and hands a [`Report`] to the sink.
//! A receive timeout is routine here and logged at debug level only.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::app::events::Report;
use crate::app::ports::ReportSink;
use crate::channel::BoundedChannel;
use crate::config::SystemConfig;
use crate::message::{SensorReading, WireMessage};
use crate::supervisor::{Worker, WorkerContext};

pub struct Monitor<S: ReportSink> {
    rx: Arc<BoundedChannel>,
    sink: S,
    receive_timeout: Duration,
    raw_forwarded: bool,
    reported: u32,
    rejected: u32,
}

impl<S: ReportSink> Monitor<S> {
    pub fn new(rx: Arc<BoundedChannel>, sink: S, config: &SystemConfig) -> Self {
        Self {
            rx,
            sink,
            receive_timeout: config.receive_timeout(),
            raw_forwarded: config.forward_raw_codes,
            reported: 0,
            rejected: 0,
        }
    }

    pub fn reported(&self) -> u32 {
        self.reported
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: ReportSink + 'static> Worker for Monitor<S> {
    fn step(&mut self, ctx: &WorkerContext) {
        let Some(item) = self.rx.receive(self.receive_timeout) else {
            debug!("[{}] no data", ctx.name());
            return;
        };
        let decoded = SensorReading::decode(&item);
        item.release();

        match decoded {
            Ok(reading) => {
                self.sink.report(&Report::from_reading(&reading, self.raw_forwarded));
                self.reported += 1;
            }
            Err(e) => {
                self.rejected += 1;
                warn!("[{}] undecodable item: {e}", ctx.name());
            }
        }
    }

    fn on_stop(&mut self, ctx: &WorkerContext) {
        info!(
            "[{}] stopped: reported={} rejected={}",
            ctx.name(),
            self.reported,
            self.rejected
        );
    }
}
