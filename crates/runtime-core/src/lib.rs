//! Runtime Core - Foundation for the lock-step distributed training runtime
//!
//! Provides the shared types, error handling, configuration, device
//! abstraction, and stage timing used by every other crate in the workspace.

pub mod config;
pub mod device;
pub mod error;
pub mod timer;
pub mod types;

pub use config::{ActivationStrategy, GradientPrefetch, TrainConfig};
pub use device::{CpuDevice, Device};
pub use error::{Error, Result};
pub use timer::{Stage, StageSpan, StageTimer, StageTimers};
pub use types::*;
