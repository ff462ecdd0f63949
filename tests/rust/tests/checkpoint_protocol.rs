//! Checkpoint record validation through the worker resume path
//!
//! The manager's own unit tests cover blob-level behavior; these tests
//! damage a real record on disk and confirm that every worker's resume
//! fails fatally instead of loading a mixed rank set.

use anyhow::Result;
use checkpoint::{CheckpointManager, LocalBlobStore};
use collective::{LocalProcessGroup, ProcessGroup, RankContext};
use runtime_core::{CpuDevice, Error, TrainConfig, TrainingState};
use std::path::Path;
use std::sync::Arc;
use trainer::{
    CosineAnnealingLr, LogReporter, SyntheticEngine, SyntheticPipeline, Trainer,
};

fn test_config(run_root: &Path) -> TrainConfig {
    TrainConfig {
        experiment_name: "ckpt-protocol".to_string(),
        dataset_name: "synthetic".to_string(),
        model_name: "sim".to_string(),
        save_dir: run_root.to_path_buf(),
        seed: 7,
        num_epochs: 1,
        log_interval: 5,
        checkpoint_interval: 5,
        dataset_cache_dir: run_root.join("cache"),
        seq_length: Some(32),
        ..TrainConfig::default()
    }
}

fn build_trainer(member: Arc<LocalProcessGroup>, config: TrainConfig) -> Result<Trainer> {
    let world_size = member.world_size();
    let ctx = RankContext::new(member as Arc<dyn ProcessGroup>, world_size)?;
    let rank = ctx.rank();

    let store = Arc::new(LocalBlobStore::new(config.run_dir()));
    let checkpoints = CheckpointManager::new(ctx.clone(), store);
    let trainer = Trainer::new(
        ctx,
        Arc::new(CpuDevice::new(rank)),
        Box::new(SyntheticEngine::new(rank, config.seed)),
        Box::new(SyntheticPipeline::new(
            rank,
            world_size,
            10,
            config.seq_length.unwrap_or(32),
            config.seed,
        )),
        Box::new(CosineAnnealingLr::new(config.lr)),
        Box::new(LogReporter),
        checkpoints,
        config,
    )?;
    Ok(trainer)
}

/// Run a two-rank world to completion so a full record exists on disk.
async fn seed_record(config: &TrainConfig) -> Vec<TrainingState> {
    let members = LocalProcessGroup::bootstrap(2).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let config = config.clone();
            tokio::spawn(async move {
                let mut worker = build_trainer(member, config)?;
                worker.resume().await?;
                let state = worker.run().await?;
                Ok::<_, anyhow::Error>(state)
            })
        })
        .collect();

    let mut states = Vec::new();
    for handle in handles {
        states.push(handle.await.unwrap().unwrap());
    }
    states
}

/// Call resume on every rank of a fresh world, collecting per-rank results.
async fn resume_world(config: &TrainConfig) -> Vec<Result<bool>> {
    let members = LocalProcessGroup::bootstrap(2).unwrap();
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let config = config.clone();
            tokio::spawn(async move {
                let mut worker = build_trainer(member, config)?;
                let resumed = worker.resume().await?;
                Ok::<_, anyhow::Error>(resumed)
            })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test]
async fn intact_record_resumes_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_record(&config).await;

    for result in resume_world(&config).await {
        assert!(result.unwrap());
    }
}

#[tokio::test]
async fn missing_shard_fails_restore_on_every_rank() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_record(&config).await;

    std::fs::remove_file(config.run_dir().join("checkpoint/rank-1.bin")).unwrap();

    for result in resume_world(&config).await {
        let err = result.unwrap_err();
        let err = err.downcast::<Error>().unwrap();
        assert!(matches!(err, Error::CheckpointCorrupted { .. }));
        assert!(err.is_fatal());
    }
}

#[tokio::test]
async fn stale_extra_shard_fails_restore() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_record(&config).await;

    // A shard left behind by an earlier, larger world must not be loaded.
    let stale = config.run_dir().join("checkpoint/rank-7.bin");
    std::fs::copy(config.run_dir().join("checkpoint/rank-0.bin"), stale).unwrap();

    for result in resume_world(&config).await {
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast::<Error>().unwrap(),
            Error::CheckpointCorrupted { .. }
        ));
    }
}

#[tokio::test]
async fn missing_progress_document_fails_restore() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    seed_record(&config).await;

    std::fs::remove_file(config.run_dir().join("state.json")).unwrap();

    for result in resume_world(&config).await {
        assert!(matches!(
            result.unwrap_err().downcast::<Error>().unwrap(),
            Error::CheckpointCorrupted { .. }
        ));
    }
}

#[tokio::test]
async fn empty_run_directory_is_a_fresh_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    for result in resume_world(&config).await {
        assert!(!result.unwrap());
    }
}
