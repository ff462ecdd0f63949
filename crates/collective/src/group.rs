//! Process group membership and barriers

use async_trait::async_trait;
use runtime_core::{Error, Rank, Result};
use std::sync::Arc;
use tokio::sync::Barrier;
use tracing::{debug, info};

/// One worker's handle into the distributed process group.
///
/// Transport-backed implementations (NCCL, MPI, ...) live outside this
/// workspace; [`LocalProcessGroup`] provides the in-process group used by the
/// simulation binary and the tests. Group initialization failure is fatal
/// and never retried.
#[async_trait]
pub trait ProcessGroup: Send + Sync {
    /// This worker's global rank, fixed for the process lifetime
    fn rank(&self) -> Rank;

    /// Total number of workers in the group
    fn world_size(&self) -> u32;

    /// Block until every worker in the group has arrived.
    ///
    /// There is no timeout: a hung peer stalls the whole group until an
    /// external supervisor restarts the job.
    async fn barrier(&self) -> Result<()>;
}

/// In-process group: one member handle per rank, all sharing a cyclic
/// [`tokio::sync::Barrier`].
pub struct LocalProcessGroup {
    rank: Rank,
    world_size: u32,
    barrier: Arc<Barrier>,
}

impl LocalProcessGroup {
    /// Bootstrap a group of `world_size` members.
    ///
    /// Returns one handle per rank, in rank order. Fails fatally for an
    /// empty group.
    pub fn bootstrap(world_size: u32) -> Result<Vec<Arc<Self>>> {
        if world_size == 0 {
            return Err(Error::ProcessGroupInit {
                message: "world size must be at least 1".to_string(),
            });
        }

        let barrier = Arc::new(Barrier::new(world_size as usize));
        let members = (0..world_size)
            .map(|rank| {
                Arc::new(Self {
                    rank,
                    world_size,
                    barrier: Arc::clone(&barrier),
                })
            })
            .collect();

        info!(world_size, "Local process group bootstrapped");
        Ok(members)
    }
}

#[async_trait]
impl ProcessGroup for LocalProcessGroup {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> u32 {
        self.world_size
    }

    async fn barrier(&self) -> Result<()> {
        debug!(rank = self.rank, "Arrived at barrier");
        self.barrier.wait().await;
        Ok(())
    }
}
