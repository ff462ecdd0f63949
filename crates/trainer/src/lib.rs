//! Trainer - the training loop controller
//!
//! Drives epochs and steps in lock-step across all workers: explicit timed
//! barriers around every stage, loss/timing aggregation, periodic collective
//! checkpoints, and resume fast-forward after a restart. The numeric work
//! itself lives behind the [`ComputeEngine`], [`DataPipeline`], and
//! [`MetricsReporter`] interfaces; this crate also ships deterministic
//! simulation implementations of those interfaces for the local runner and
//! the integration tests.

pub mod engine;
pub mod metrics;
pub mod run;
pub mod schedule;
pub mod sim;

pub use engine::{ComputeEngine, DataPipeline, MetricsReporter};
pub use metrics::LogReporter;
pub use run::{Phase, Trainer};
pub use schedule::{CosineAnnealingLr, LrSchedule};
pub use sim::{SyntheticEngine, SyntheticPipeline};
