//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements   | Connects to                 |
//! |------------|--------------|-----------------------------|
//! | `log_sink` | ReportSink   | Serial log output           |
//! | `nvs`      | ConfigPort   | NVS / in-memory store       |
//! |            | StoragePort  |                             |
//! | `reset`    | ResetPort    | Reset log + `esp_restart`   |
//!
//! The ADC bank ([`sensors::thermistor`](crate::sensors::thermistor)) and
//! the period timer ([`drivers::hw_timer`](crate::drivers::hw_timer)) live
//! with the other hardware drivers.

pub mod log_sink;
pub mod nvs;
pub mod reset;
