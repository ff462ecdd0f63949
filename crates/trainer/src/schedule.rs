//! Learning-rate schedule
//!
//! The schedule advances once per optimizer update and its state is part of
//! the checkpoint record: only the leader persists the blob, every worker
//! loads it on restore.

use runtime_core::Result;
use serde::{Deserialize, Serialize};

/// A stepwise learning-rate schedule with checkpointable state
pub trait LrSchedule: Send {
    /// Advance by one completed optimizer update
    fn advance(&mut self);

    /// Learning rate for the next update
    fn current_lr(&self) -> f64;

    /// Serialize the schedule state for the checkpoint record
    fn state_bytes(&self) -> Result<Vec<u8>>;

    /// Restore the schedule state from a checkpoint record
    fn load_state_bytes(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Cosine annealing from the base rate down to a floor over a fixed period.
///
/// `lr(t) = floor + (base - floor) * (1 + cos(pi * t / period)) / 2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosineAnnealingLr {
    base_lr: f64,
    min_lr: f64,
    period: u64,
    steps_taken: u64,
}

impl CosineAnnealingLr {
    /// Default annealing period in optimizer updates
    pub const DEFAULT_PERIOD: u64 = 1000;

    /// Anneal from `base_lr` down to one hundredth of it over the default
    /// period.
    pub fn new(base_lr: f64) -> Self {
        Self::with_params(base_lr, base_lr * 1e-2, Self::DEFAULT_PERIOD)
    }

    pub fn with_params(base_lr: f64, min_lr: f64, period: u64) -> Self {
        Self {
            base_lr,
            min_lr,
            period: period.max(1),
            steps_taken: 0,
        }
    }

    pub fn steps_taken(&self) -> u64 {
        self.steps_taken
    }
}

impl LrSchedule for CosineAnnealingLr {
    fn advance(&mut self) {
        self.steps_taken += 1;
    }

    fn current_lr(&self) -> f64 {
        let phase = std::f64::consts::PI * self.steps_taken as f64 / self.period as f64;
        self.min_lr + (self.base_lr - self.min_lr) * (1.0 + phase.cos()) / 2.0
    }

    fn state_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn load_state_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        *self = bincode::deserialize(bytes)?;
        Ok(())
    }
}
