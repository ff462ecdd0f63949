//! Interfaces to the external collaborators
//!
//! The compute engine, data pipeline, and metrics reporter are black boxes
//! to the coordination core; these traits are their full surface. Every
//! method here is invoked identically by every worker at the same logical
//! point in the step protocol.

use async_trait::async_trait;
use runtime_core::{Batch, Epoch, MetricsRecord, PartitionedState, Result};

/// The external compute engine owning this worker's model and optimizer
/// shards.
///
/// Forward/backward/update internally perform the collective communication
/// of the partitioning strategy; the loop still inserts explicit barriers
/// between them so per-stage cost stays individually attributable.
#[async_trait]
pub trait ComputeEngine: Send {
    /// Run the forward pass over a batch, returning the loss scalar
    async fn forward(&mut self, batch: &Batch) -> Result<f64>;

    /// Compute gradients of the loss
    async fn backward(&mut self, loss: f64) -> Result<()>;

    /// Clear gradients accumulated by a prior step
    fn zero_gradients(&mut self);

    /// Apply one optimizer update from the current gradients
    async fn apply_update(&mut self) -> Result<()>;

    /// Snapshot this worker's model and optimizer shards
    fn snapshot_partitioned_state(&self) -> Result<PartitionedState>;

    /// Restore this worker's shards from a checkpoint
    fn restore_partitioned_state(&mut self, shard: PartitionedState) -> Result<()>;
}

/// The external data pipeline: a lazy, finite, per-epoch-restartable
/// sequence of fixed-shape device-resident batches, deterministically
/// partitioned by rank so each worker sees a disjoint subset covering the
/// dataset once per epoch.
pub trait DataPipeline: Send {
    /// Number of batches this worker sees per epoch
    fn batches_per_epoch(&self) -> u64;

    /// Restart the sequence at the beginning of an epoch; the same epoch
    /// always yields the same batch order
    fn start_epoch(&mut self, epoch: Epoch) -> Result<()>;

    /// Pull the next batch, already moved to this worker's device
    fn next_batch(&mut self) -> Result<Batch>;
}

/// The external experiment tracker; receives one structured record per
/// logging interval, from the leader only.
pub trait MetricsReporter: Send {
    fn report(&mut self, record: &MetricsRecord) -> Result<()>;
}
