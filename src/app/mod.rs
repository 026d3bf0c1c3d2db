//! Application boundary: port traits and outbound reports.
//!
//! Everything the pipeline needs from hardware (ADC, periodic timer, chip
//! reset, persistent storage) and everything it hands to the outside world
//! (reports) crosses one of the traits in [`ports`], keeping sensing,
//! voting and supervision testable on the host.

pub mod events;
pub mod ports;
