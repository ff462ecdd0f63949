//! End-to-end training run tests
//!
//! Each test spawns one tokio task per worker against a shared run
//! directory, so the barrier-coupled loop and the collective checkpoint
//! protocol are exercised the same way the launcher drives them. Failure
//! injection fails every worker at the same step: a single diverging worker
//! would stall the group at the next barrier, which is the production
//! behavior, not a testable one.

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{CheckpointManager, LocalBlobStore};
use collective::{LocalProcessGroup, ProcessGroup, RankContext};
use parking_lot::Mutex;
use runtime_core::{
    Batch, CpuDevice, PartitionedState, Rank, TrainConfig, TrainingState,
};
use std::path::Path;
use std::sync::Arc;
use trainer::{
    ComputeEngine, CosineAnnealingLr, LogReporter, SyntheticEngine, SyntheticPipeline,
    Trainer,
};

/// Per-rank record of which batch indices actually reached the forward pass
type ForwardLog = Arc<Mutex<Vec<u64>>>;

/// Delegating engine that records forwarded batch indices and can fail the
/// whole group at a fixed step count.
struct ObservedEngine {
    inner: SyntheticEngine,
    forwards: ForwardLog,
    fail_at_step: Option<u64>,
    steps_seen: u64,
}

impl ObservedEngine {
    fn new(rank: Rank, seed: u64, forwards: ForwardLog, fail_at_step: Option<u64>) -> Self {
        Self {
            inner: SyntheticEngine::new(rank, seed),
            forwards,
            fail_at_step,
            steps_seen: 0,
        }
    }
}

#[async_trait]
impl ComputeEngine for ObservedEngine {
    async fn forward(&mut self, batch: &Batch) -> runtime_core::Result<f64> {
        if Some(self.steps_seen) == self.fail_at_step {
            return Err(runtime_core::Error::Compute {
                message: format!("injected failure at step {}", self.steps_seen),
            });
        }
        self.steps_seen += 1;
        self.forwards.lock().push(batch.index);
        self.inner.forward(batch).await
    }

    async fn backward(&mut self, loss: f64) -> runtime_core::Result<()> {
        self.inner.backward(loss).await
    }

    fn zero_gradients(&mut self) {
        self.inner.zero_gradients();
    }

    async fn apply_update(&mut self) -> runtime_core::Result<()> {
        self.inner.apply_update().await
    }

    fn snapshot_partitioned_state(&self) -> runtime_core::Result<PartitionedState> {
        self.inner.snapshot_partitioned_state()
    }

    fn restore_partitioned_state(&mut self, shard: PartitionedState) -> runtime_core::Result<()> {
        self.inner.restore_partitioned_state(shard)
    }
}

fn test_config(run_root: &Path, num_epochs: u64, checkpoint_interval: u64) -> TrainConfig {
    TrainConfig {
        experiment_name: "itest".to_string(),
        dataset_name: "synthetic".to_string(),
        model_name: "sim".to_string(),
        save_dir: run_root.to_path_buf(),
        seed: 42,
        num_epochs,
        lr: 3e-5,
        log_interval: 5,
        checkpoint_interval,
        dataset_cache_dir: run_root.join("cache"),
        seq_length: Some(64),
        ..TrainConfig::default()
    }
}

struct WorkerOutcome {
    state: TrainingState,
    resumed: bool,
}

async fn run_worker(
    member: Arc<LocalProcessGroup>,
    config: TrainConfig,
    batches_per_epoch: u64,
    forwards: ForwardLog,
    fail_at_step: Option<u64>,
) -> Result<WorkerOutcome> {
    let world_size = member.world_size();
    let ctx = RankContext::new(member as Arc<dyn ProcessGroup>, world_size)?;
    let rank = ctx.rank();

    let store = Arc::new(LocalBlobStore::new(config.run_dir()));
    let checkpoints = CheckpointManager::new(ctx.clone(), store);
    let engine = ObservedEngine::new(rank, config.seed, forwards, fail_at_step);
    let pipeline = SyntheticPipeline::new(
        rank,
        world_size,
        batches_per_epoch,
        config.seq_length.unwrap_or(64),
        config.seed,
    );
    let schedule = CosineAnnealingLr::new(config.lr);

    let mut worker = Trainer::new(
        ctx,
        Arc::new(CpuDevice::new(rank)),
        Box::new(engine),
        Box::new(pipeline),
        Box::new(schedule),
        Box::new(LogReporter),
        checkpoints,
        config,
    )?;

    let resumed = worker.resume().await?;
    let state = worker.run().await?;
    assert_eq!(worker.phase(), trainer::Phase::Finished);
    Ok(WorkerOutcome { state, resumed })
}

/// Launch one trainer per rank; returns per-rank outcomes and forward logs.
async fn launch_world(
    world_size: u32,
    config: &TrainConfig,
    batches_per_epoch: u64,
    fail_at_step: Option<u64>,
) -> Vec<(Result<WorkerOutcome>, Vec<u64>)> {
    let members = LocalProcessGroup::bootstrap(world_size).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let config = config.clone();
            let forwards: ForwardLog = Arc::new(Mutex::new(Vec::new()));
            let log = Arc::clone(&forwards);
            let task = tokio::spawn(run_worker(
                member,
                config,
                batches_per_epoch,
                forwards,
                fail_at_step,
            ));
            (task, log)
        })
        .collect();

    let mut outcomes = Vec::new();
    for (task, log) in handles {
        let outcome = task.await.unwrap();
        let forwards = log.lock().clone();
        outcomes.push((outcome, forwards));
    }
    outcomes
}

fn read_state_doc(config: &TrainConfig) -> TrainingState {
    let raw = std::fs::read(config.run_dir().join("state.json")).unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[tokio::test]
async fn four_rank_run_completes_with_full_checkpoint_record() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 2, 5);

    let outcomes = launch_world(4, &config, 10, None).await;

    for (outcome, forwards) in &outcomes {
        let outcome = outcome.as_ref().unwrap();
        assert!(!outcome.resumed);
        assert_eq!(outcome.state.global_step, 20);
        assert_eq!(outcome.state.epoch, 1);
        assert_eq!(outcome.state.epoch_step, 0);
        assert_eq!(forwards.len(), 20);
    }

    let run_dir = config.run_dir();
    assert!(run_dir.join("state.json").is_file());
    assert!(run_dir.join("scheduler.bin").is_file());
    for rank in 0..4 {
        assert!(run_dir.join(format!("checkpoint/rank-{rank}.bin")).is_file());
    }

    // The persisted progress document reflects the final in-loop save, taken
    // on the last step of epoch 1 before the end-of-epoch reset.
    let saved = read_state_doc(&config);
    assert_eq!(saved.global_step, 20);
    assert_eq!(saved.epoch, 1);
    assert_eq!(saved.epoch_step, 10);
}

#[tokio::test]
async fn resume_fast_forwards_to_the_restored_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 1, 5);

    // Every worker fails on its sixth step, after the step-5 checkpoint.
    let outcomes = launch_world(2, &config, 10, Some(5)).await;
    for (outcome, forwards) in &outcomes {
        assert!(outcome.is_err());
        assert_eq!(forwards, &[0, 1, 2, 3, 4]);
    }
    let saved = read_state_doc(&config);
    assert_eq!(saved.global_step, 5);
    assert_eq!(saved.epoch_step, 5);

    // Relaunch in the same run directory: batches 0..5 are pulled but never
    // forwarded, execution restarts at the restored cursor.
    let outcomes = launch_world(2, &config, 10, None).await;
    for (outcome, forwards) in &outcomes {
        let outcome = outcome.as_ref().unwrap();
        assert!(outcome.resumed);
        assert_eq!(outcome.state.global_step, 10);
        assert_eq!(outcome.state.epoch_step, 0);
        assert_eq!(forwards, &[5, 6, 7, 8, 9]);
    }
}

#[tokio::test]
async fn resumed_run_matches_uninterrupted_run() {
    let plain_dir = tempfile::tempdir().unwrap();
    let plain = test_config(plain_dir.path(), 2, 5);
    let outcomes = launch_world(2, &plain, 10, None).await;
    for (outcome, _) in &outcomes {
        assert!(outcome.is_ok());
    }

    let resumed_dir = tempfile::tempdir().unwrap();
    let resumed = test_config(resumed_dir.path(), 2, 5);
    launch_world(2, &resumed, 10, Some(5)).await;
    let outcomes = launch_world(2, &resumed, 10, None).await;
    for (outcome, _) in &outcomes {
        assert!(outcome.is_ok());
    }

    // Both runs end with the step-20 checkpoint; the record must be
    // bit-identical for the interruption to have been invisible.
    for name in ["state.json", "scheduler.bin", "checkpoint/rank-0.bin", "checkpoint/rank-1.bin"] {
        let a = std::fs::read(plain.run_dir().join(name)).unwrap();
        let b = std::fs::read(resumed.run_dir().join(name)).unwrap();
        assert_eq!(a, b, "{name} diverged after resume");
    }
}

#[tokio::test]
async fn leader_first_materializes_shared_file_once() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("dataset.manifest");
    let writes = Arc::new(Mutex::new(0u32));

    let members = LocalProcessGroup::bootstrap(4).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let target = target.clone();
            let writes = Arc::clone(&writes);
            tokio::spawn(async move {
                let world_size = member.world_size();
                let ctx = RankContext::new(member as Arc<dyn ProcessGroup>, world_size)?;
                ctx.leader_first(|| async {
                    if !target.is_file() {
                        tokio::fs::write(&target, b"ready").await?;
                        *writes.lock() += 1;
                    }
                    Ok(std::fs::read(&target)?)
                })
                .await
                .map_err(anyhow::Error::from)
            })
        })
        .collect();

    for handle in handles {
        let contents = handle.await.unwrap().unwrap();
        // every rank observes the leader's materialized file
        assert_eq!(contents, b"ready");
    }
    assert_eq!(*writes.lock(), 1);
}

#[tokio::test]
async fn single_rank_world_trains_and_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 1, 4);

    let outcomes = launch_world(1, &config, 10, None).await;
    let (outcome, forwards) = &outcomes[0];
    let outcome = outcome.as_ref().unwrap();
    assert_eq!(outcome.state.global_step, 10);
    assert_eq!(forwards.len(), 10);

    // Last save was at step 8; steps 9 and 10 are lost on a crash here.
    let saved = read_state_doc(&config);
    assert_eq!(saved.global_step, 8);
}
