//! The sensing pipeline.
//!
//! ```text
//!   Sampler ──▶ channel A ──▶ Voter ──▶ channel B ──▶ Monitor
//!   (core 0)                 (core 1)                (core 1)
//!      │                        │
//!      └── full reset           └── request_transition(SensorN_FAILURE)
//! ```
//!
//! Every stage is a [`Worker`](crate::supervisor::Worker); the channels are
//! the only state they share.

pub mod monitor;
pub mod sampler;
pub mod voter;
