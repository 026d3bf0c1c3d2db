//! TMRSense firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod channel;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod fsm;
pub mod message;
pub mod pins;
pub mod pipeline;
pub mod supervisor;
pub mod sync;

// Hardware-facing modules; their ESP-IDF implementations are guarded by
// cfg attributes inside and fall back to host simulations.
pub mod adapters;
pub mod drivers;
pub mod sensors;
