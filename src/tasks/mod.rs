//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: purges expired cache entries and rate-limit counters

mod sweep;

pub use sweep::{spawn_sweep_task, Sweep, SweepHandle};
