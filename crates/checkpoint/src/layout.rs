//! On-storage layout of a checkpoint record
//!
//! Per run directory: `state.json` (scalar progress document),
//! `scheduler.bin` (schedule blob), and `checkpoint/rank-<r>.bin` (one
//! partitioned-state blob per rank). Each save overwrites the record at the
//! same logical paths; there is no versioned history.

use runtime_core::Rank;

/// Scalar progress document name
pub const STATE_DOC: &str = "state.json";

/// Scheduler blob name
pub const SCHEDULER_BLOB: &str = "scheduler.bin";

/// Directory holding the per-rank shard blobs
pub const SHARD_DIR: &str = "checkpoint";

/// Path scheme for one run's checkpoint record
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointLayout;

impl CheckpointLayout {
    pub fn state_doc(&self) -> &'static str {
        STATE_DOC
    }

    pub fn scheduler_blob(&self) -> &'static str {
        SCHEDULER_BLOB
    }

    pub fn shard_dir(&self) -> &'static str {
        SHARD_DIR
    }

    /// Shard blob path for a rank
    pub fn shard_blob(&self, rank: Rank) -> String {
        format!("{}/rank-{}.bin", SHARD_DIR, rank)
    }

    /// Parse a shard directory entry back to its rank; `None` for foreign
    /// entries (temp files, stray names)
    pub fn parse_shard_name(&self, name: &str) -> Option<Rank> {
        name.strip_prefix("rank-")?
            .strip_suffix(".bin")?
            .parse()
            .ok()
    }
}
