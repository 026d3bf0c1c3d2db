//! Timer and task-placement drivers.

pub mod hw_timer;
pub mod task_pin;
