//! Core type definitions for the lock-step training runtime

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Worker rank within the distributed group
pub type Rank = u32;

/// Training step and epoch counters
pub type Step = u64;
pub type Epoch = u64;

/// Scalar training progress, the unit of resumability.
///
/// Owned exclusively by the training loop, serialized as a whole by the
/// checkpoint manager, never partially written. Every worker derives an
/// identical copy from the lock-step control flow; only the leader's
/// on-storage copy is the persisted source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Current epoch index
    pub epoch: Epoch,

    /// Completed optimizer updates across the whole run
    pub global_step: Step,

    /// Completed steps within the current epoch; the resume cursor
    pub epoch_step: Step,

    /// Loss accumulated since the last logging interval
    pub running_loss: f64,
}

impl TrainingState {
    /// Advance both counters by one completed step and accumulate loss
    pub fn record_step(&mut self, loss: f64) {
        self.global_step += 1;
        self.epoch_step += 1;
        self.running_loss += loss;
    }

    /// Reset the within-epoch cursor at an epoch boundary
    pub fn finish_epoch(&mut self) {
        self.epoch_step = 0;
    }
}

/// The model- and optimizer-shard blobs owned by a single worker.
///
/// Never valid in isolation: a checkpoint is only meaningful as the union of
/// every rank's partition plus the scalar [`TrainingState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionedState {
    /// Owning worker's rank; must match the shard path on restore
    pub rank: Rank,

    /// Serialized model parameter shard
    pub model_shard: Vec<u8>,

    /// Serialized optimizer state shard
    pub opt_shard: Vec<u8>,
}

/// One fixed-shape training batch, already resident on the worker's device
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch within the worker's epoch sequence
    pub index: u64,

    /// Opaque token payload
    pub tokens: bytes::Bytes,
}

/// Device memory accounting
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Currently allocated bytes
    pub current_bytes: u64,

    /// Peak allocated bytes since the last reset
    pub peak_bytes: u64,
}

/// Structured step summary emitted to the metrics reporter once per logging
/// interval, by the leader only.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsRecord {
    /// Global step the record was emitted at
    pub global_step: Step,

    /// Current epoch
    pub epoch: Epoch,

    /// Learning rate after the most recent schedule advance
    pub learning_rate: f64,

    /// Mean loss over the logging window
    pub mean_loss: f64,

    /// Fraction of the epoch completed
    pub epoch_progress: f64,

    /// Batches left in the current epoch
    pub batches_remaining: u64,

    /// Currently allocated device memory in GB
    pub current_memory_gb: f64,

    /// Peak device memory in GB since the last record
    pub peak_memory_gb: f64,

    /// Average elapsed milliseconds per stage over the logging window
    pub stage_ms: BTreeMap<String, f64>,

    /// Sum of the per-stage averages
    pub total_ms: f64,
}
