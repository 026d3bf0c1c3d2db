//! Sensor drivers.
//!
//! Only the thermistor bank lives here; it implements
//! [`AdcPort`](crate::app::ports::AdcPort) and is owned by the sampler.

pub mod thermistor;
