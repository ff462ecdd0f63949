//! Collective checkpoint save/restore
//!
//! Both operations are collective: every worker must call them at the same
//! logical point. Barriers bound the write window so no worker proceeds past
//! a checkpoint boundary until every shard and the leader's scalar documents
//! are durably written, and no worker starts writing while another still
//! uses the record from a prior operation.

use crate::layout::CheckpointLayout;
use crate::store::BlobStore;
use bytes::Bytes;
use collective::RankContext;
use runtime_core::{Error, PartitionedState, Rank, Result, TrainingState};
use std::sync::Arc;
use tracing::{debug, info};

/// Outcome of the restore attempt made at process start
#[derive(Debug)]
pub enum Restore {
    /// No record at the configured location: start from the zero state
    Fresh(TrainingState),

    /// A complete record was found and this worker's parts were loaded
    Resumed {
        state: TrainingState,
        shard: PartitionedState,
        schedule: Vec<u8>,
    },
}

impl Restore {
    pub fn resumed(&self) -> bool {
        matches!(self, Restore::Resumed { .. })
    }
}

/// Persists and restores the partitioned training state as one atomic unit
/// across all workers.
pub struct CheckpointManager {
    ctx: RankContext,
    store: Arc<dyn BlobStore>,
    layout: CheckpointLayout,
}

impl CheckpointManager {
    pub fn new(ctx: RankContext, store: Arc<dyn BlobStore>) -> Self {
        Self {
            ctx,
            store,
            layout: CheckpointLayout,
        }
    }

    /// Create the shared run directory, leader only, bounded by barriers so
    /// no worker touches the record before it exists.
    pub async fn prepare(&self) -> Result<()> {
        self.ctx.barrier().await?;
        if self.ctx.is_leader() {
            debug!("Creating run directory");
            self.store.ensure_root().await?;
        }
        self.ctx.barrier().await?;
        Ok(())
    }

    /// Attempt to restore from the record at the configured location.
    ///
    /// Collective. Presence of any part of a record with missing or foreign
    /// rank shards is corruption and fails fatally: proceeding with
    /// mismatched state would silently diverge the run.
    pub async fn try_restore(&self) -> Result<Restore> {
        let rank = self.ctx.rank();
        let world_size = self.ctx.world_size();

        let have_state = self.store.exists(self.layout.state_doc()).await?;
        let have_schedule = self.store.exists(self.layout.scheduler_blob()).await?;
        let shard_ranks = self.shard_ranks().await?;

        if !have_state && !have_schedule && shard_ranks.is_empty() {
            debug!(rank, "No checkpoint record found; starting fresh");
            self.ctx.barrier().await?;
            return Ok(Restore::Fresh(TrainingState::default()));
        }

        let expected: Vec<Rank> = (0..world_size).collect();
        if !have_state || !have_schedule || shard_ranks != expected {
            return Err(Error::CheckpointCorrupted {
                path: self.layout.shard_dir().to_string(),
                reason: format!(
                    "incomplete record: state_doc={}, scheduler={}, shard ranks {:?} for world size {}",
                    have_state, have_schedule, shard_ranks, world_size
                ),
            });
        }

        // Each worker loads only its own rank's shard.
        let shard_path = self.layout.shard_blob(rank);
        let shard_bytes = self.store.read(&shard_path).await?;
        let shard: PartitionedState = bincode::deserialize(&shard_bytes)?;
        if shard.rank != rank {
            return Err(Error::CheckpointCorrupted {
                path: shard_path,
                reason: format!("shard blob claims rank {}", shard.rank),
            });
        }

        let schedule = self.store.read(self.layout.scheduler_blob()).await?.to_vec();
        let state_bytes = self.store.read(self.layout.state_doc()).await?;
        let state: TrainingState = serde_json::from_slice(&state_bytes)?;

        info!(
            rank,
            epoch = state.epoch,
            global_step = state.global_step,
            epoch_step = state.epoch_step,
            "Restored from checkpoint"
        );

        self.ctx.barrier().await?;
        Ok(Restore::Resumed {
            state,
            shard,
            schedule,
        })
    }

    /// Save the record, replacing the prior one at the same logical paths.
    ///
    /// Collective. Every worker writes its own shard blob; only the leader
    /// writes the scheduler blob and the progress document.
    pub async fn save(
        &self,
        shard: &PartitionedState,
        schedule: &[u8],
        state: &TrainingState,
    ) -> Result<()> {
        let rank = self.ctx.rank();
        if shard.rank != rank {
            return Err(Error::Internal {
                message: format!(
                    "rank {} attempted to save a shard owned by rank {}",
                    rank, shard.rank
                ),
            });
        }

        self.ctx.barrier().await?;

        let blob = Bytes::from(bincode::serialize(shard)?);
        self.store.write(&self.layout.shard_blob(rank), blob).await?;
        debug!(rank, global_step = state.global_step, "Shard blob written");

        if self.ctx.is_leader() {
            self.store
                .write(
                    self.layout.scheduler_blob(),
                    Bytes::copy_from_slice(schedule),
                )
                .await?;
            let doc = serde_json::to_vec_pretty(state)?;
            self.store
                .write(self.layout.state_doc(), Bytes::from(doc))
                .await?;
        }

        self.ctx.barrier().await?;

        info!(
            rank,
            epoch = state.epoch,
            global_step = state.global_step,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Sorted, deduplicated set of ranks present in the shard directory
    async fn shard_ranks(&self) -> Result<Vec<Rank>> {
        let entries = self.store.list_dir(self.layout.shard_dir()).await?;
        let mut ranks: Vec<Rank> = entries
            .iter()
            .filter_map(|name| self.layout.parse_shard_name(name))
            .collect();
        ranks.sort_unstable();
        ranks.dedup();
        Ok(ranks)
    }
}
