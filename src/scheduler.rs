//! Scheduler Layer
//!
//! Drives every collector `load` from one time-ordered job queue.
//!
//! # Architecture
//!
//! - [`Job`]: A device (or no device) plus the collectors of one [`Cadence`]
//! - [`Scheduler`]: Fires due jobs, reconnects dead devices, reschedules at a fixed interval
//! - [`LoadStats`]: Per-collector load time, counts, errors and last run, as Prometheus series

mod job;
mod runner;
mod stats;

pub use job::{Cadence, Job};
pub use runner::Scheduler;
pub use stats::{LoadOutcome, LoadStats, STATS_LABELS};
