//! Outbound reports.
//!
//! The [`Monitor`](crate::pipeline::monitor::Monitor) decodes each channel
//! item and emits one of these through the
//! [`ReportSink`](super::ports::ReportSink) port.  Adapters on the other
//! side decide what to do with them (serial console in the device build).

use crate::message::{SensorReading, SourceId};

/// What the monitor observed in one channel item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Report {
    /// A sampler message: the three channels before voting.
    RawTriplet { celsius: [f32; 3], raw: [u16; 3] },

    /// A voter message: the agreed value.
    Agreed {
        mean: f32,
        mean_raw: u16,
        /// Per-channel raw codes, when the voter forwards them.
        raw: Option<[u16; 3]>,
    },
}

impl Report {
    /// Pick the fields relevant to the message's producer.  `raw_forwarded`
    /// is the voter's `forward_raw_codes` setting; the wire format has no
    /// flag for it, and an all-zero triplet is a real reading.
    pub fn from_reading(reading: &SensorReading, raw_forwarded: bool) -> Self {
        match reading.source {
            SourceId::Sensor => Self::RawTriplet {
                celsius: reading.celsius,
                raw: reading.raw,
            },
            SourceId::Voter => Self::Agreed {
                mean: reading.mean,
                mean_raw: reading.mean_raw,
                raw: raw_forwarded.then_some(reading.raw),
            },
        }
    }
}
