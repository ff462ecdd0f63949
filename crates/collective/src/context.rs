//! Per-worker identity derived from the process group

use crate::ProcessGroup;
use runtime_core::{Error, Rank, Result};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// This process's identity within the distributed group: global rank, local
/// device index, and world size. Computed once at startup, immutable for the
/// process lifetime.
#[derive(Clone)]
pub struct RankContext {
    group: Arc<dyn ProcessGroup>,
    local_device_index: u32,
}

// The group handle is a trait object; render the identity fields instead.
impl fmt::Debug for RankContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RankContext")
            .field("rank", &self.group.rank())
            .field("world_size", &self.group.world_size())
            .field("local_device_index", &self.local_device_index)
            .finish()
    }
}

impl RankContext {
    /// Derive the context from a bootstrapped group.
    ///
    /// The local device index is the rank folded over the per-host device
    /// count, the usual launcher convention.
    pub fn new(group: Arc<dyn ProcessGroup>, devices_per_host: u32) -> Result<Self> {
        if devices_per_host == 0 {
            return Err(Error::ProcessGroupInit {
                message: "devices_per_host must be at least 1".to_string(),
            });
        }

        let local_device_index = group.rank() % devices_per_host;
        info!(
            rank = group.rank(),
            world_size = group.world_size(),
            local_device_index,
            "Rank context established"
        );

        Ok(Self {
            group,
            local_device_index,
        })
    }

    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    pub fn world_size(&self) -> u32 {
        self.group.world_size()
    }

    pub fn local_device_index(&self) -> u32 {
        self.local_device_index
    }

    /// True for the single worker designated to perform shared side effects
    pub fn is_leader(&self) -> bool {
        self.group.rank() == 0
    }

    /// Block until every worker in the group has arrived
    pub async fn barrier(&self) -> Result<()> {
        self.group.barrier().await
    }

    /// Leader-first execution: the leader runs `work` while everyone else
    /// waits at a barrier, then the rest run the same `work` while the
    /// leader waits at a second barrier.
    ///
    /// At most one process performs the side-effecting part of `work` (a
    /// download, a directory creation) provided `work` itself checks for the
    /// already-materialized result, and every process holds the result
    /// before the next phase begins.
    pub async fn leader_first<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        if self.is_leader() {
            let out = work().await?;
            self.barrier().await?;
            self.barrier().await?;
            Ok(out)
        } else {
            self.barrier().await?;
            let out = work().await?;
            self.barrier().await?;
            Ok(out)
        }
    }
}
