//! TMR voter.
//!
//! Consumes SENSOR readings from channel A, computes the agreed value, and
//! forwards a VOTER reading on channel B.  A masked disagreement between
//! channels is reported as a mode request; forwarding happens either way.
//!
//! # Agreed raw code
//!
//! `mean_raw` is the bitwise majority of the three masked codes:
//!
//! ```text
//!   m_i      = lsb_i & mask
//!   mean_raw = (m1 & m2) | (m2 & m3) | (m1 & m3)
//! ```
//!
//! Each bit is set iff at least two channels have it set.
//!
//! # Disagreement priority
//!
//! Masked codes are compared pairwise in a fixed order and only the first
//! mismatch is reported:
//!
//! | check    | mode             |
//! |----------|------------------|
//! | m1 ≠ m2  | `Sensor1Failure` |
//! | m2 ≠ m3  | `Sensor2Failure` |
//! | m1 ≠ m3  | `Sensor3Failure` |

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::channel::BoundedChannel;
use crate::config::SystemConfig;
use crate::fsm::Mode;
use crate::message::{SensorReading, SourceId, WireMessage};
use crate::supervisor::{Worker, WorkerContext};

/// Which channel pair disagreed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelFault {
    Sensor1,
    Sensor2,
    Sensor3,
}

impl ChannelFault {
    /// The failure mode reporting this fault.
    pub fn mode(self) -> Mode {
        match self {
            Self::Sensor1 => Mode::Sensor1Failure,
            Self::Sensor2 => Mode::Sensor2Failure,
            Self::Sensor3 => Mode::Sensor3Failure,
        }
    }

    /// The fault a failure mode reports, if it is one.
    pub fn from_mode(mode: Mode) -> Option<Self> {
        match mode {
            Mode::Sensor1Failure => Some(Self::Sensor1),
            Mode::Sensor2Failure => Some(Self::Sensor2),
            Mode::Sensor3Failure => Some(Self::Sensor3),
            _ => None,
        }
    }
}

/// Outcome of voting on one reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub mean: f32,
    pub mean_raw: u16,
    pub fault: Option<ChannelFault>,
}

/// Vote on one sampler reading.
pub fn vote(reading: &SensorReading, mask: u16) -> Verdict {
    let [s1, s2, s3] = reading.celsius;
    let mean = (s1 + s2 + s3) / 3.0;

    let [m1, m2, m3] = reading.raw.map(|lsb| lsb & mask);
    let mean_raw = (m1 & m2) | (m2 & m3) | (m1 & m3);

    let fault = if m1 != m2 {
        Some(ChannelFault::Sensor1)
    } else if m2 != m3 {
        Some(ChannelFault::Sensor2)
    } else if m1 != m3 {
        Some(ChannelFault::Sensor3)
    } else {
        None
    };

    Verdict {
        mean,
        mean_raw,
        fault,
    }
}

/// Counters kept by the voter for its shutdown log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoterStats {
    pub voted: u32,
    pub flagged: u32,
    pub dropped: u32,
    pub rejected: u32,
}

/// The voting worker.
pub struct Voter {
    rx: Arc<BoundedChannel>,
    tx: Arc<BoundedChannel>,
    mask: u16,
    forward_raw: bool,
    receive_timeout: Duration,
    reserve_timeout: Duration,
    stats: VoterStats,
}

impl Voter {
    pub fn new(rx: Arc<BoundedChannel>, tx: Arc<BoundedChannel>, config: &SystemConfig) -> Self {
        Self {
            rx,
            tx,
            mask: config.lsb_mask,
            forward_raw: config.forward_raw_codes,
            receive_timeout: config.receive_timeout(),
            reserve_timeout: config.reserve_timeout(),
            stats: VoterStats::default(),
        }
    }

    pub fn stats(&self) -> VoterStats {
        self.stats
    }

    fn agreed(&self, reading: &SensorReading, verdict: &Verdict) -> SensorReading {
        let (celsius, raw) = if self.forward_raw {
            (reading.celsius, reading.raw)
        } else {
            ([0.0; 3], [0; 3])
        };
        SensorReading {
            source: SourceId::Voter,
            celsius,
            raw,
            mean: verdict.mean,
            mean_raw: verdict.mean_raw,
        }
    }
}

impl Worker for Voter {
    fn step(&mut self, ctx: &WorkerContext) {
        let Some(item) = self.rx.receive(self.receive_timeout) else {
            warn!("[{}] waiting for sensor data", ctx.name());
            return;
        };
        let decoded = SensorReading::decode(&item);
        item.release();

        let reading = match decoded {
            Ok(r) if r.source == SourceId::Sensor => r,
            Ok(r) => {
                self.stats.rejected += 1;
                warn!("[{}] ignoring {:?} message on sensor channel", ctx.name(), r.source);
                return;
            }
            Err(e) => {
                self.stats.rejected += 1;
                warn!("[{}] undecodable item: {e}", ctx.name());
                return;
            }
        };

        let verdict = vote(&reading, self.mask);
        self.stats.voted += 1;

        if let Some(fault) = verdict.fault {
            self.stats.flagged += 1;
            debug!(
                "[{}] disagreement {:?}: lsb={:#06x}/{:#06x}/{:#06x} mask={:#06x}",
                ctx.name(),
                fault,
                reading.raw[0],
                reading.raw[1],
                reading.raw[2],
                self.mask
            );
            if let Err(e) = ctx.request_transition(fault.mode()) {
                error!("[{}] failure mode request rejected: {e}", ctx.name());
            }
        }

        let out = self.agreed(&reading, &verdict);
        if let Err(e) = self.tx.send(&out, self.reserve_timeout) {
            self.stats.dropped += 1;
            warn!("[{}] agreed value dropped: {e}", ctx.name());
        }
    }

    fn on_stop(&mut self, ctx: &WorkerContext) {
        let s = self.stats;
        info!(
            "[{}] stopped: voted={} flagged={} dropped={} rejected={}",
            ctx.name(),
            s.voted,
            s.flagged,
            s.dropped,
            s.rejected
        );
    }
}
