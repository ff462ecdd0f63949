//! Training launcher binary
//!
//! Bootstraps a local process group, materializes the dataset cache with the
//! leader-first pattern, and drives one trainer per worker against the
//! synthetic backends.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkpoint::{CheckpointManager, LocalBlobStore};
use collective::{LocalProcessGroup, ProcessGroup, RankContext};
use runtime_core::{ActivationStrategy, CpuDevice, GradientPrefetch, TrainConfig};
use trainer::{
    CosineAnnealingLr, LogReporter, SyntheticEngine, SyntheticPipeline, Trainer,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PrefetchArg {
    BackwardPre,
    BackwardPost,
    Off,
}

impl From<PrefetchArg> for GradientPrefetch {
    fn from(arg: PrefetchArg) -> Self {
        match arg {
            PrefetchArg::BackwardPre => GradientPrefetch::BackwardPre,
            PrefetchArg::BackwardPost => GradientPrefetch::BackwardPost,
            PrefetchArg::Off => GradientPrefetch::Off,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ActivationsArg {
    Checkpoint,
    Offload,
    InMemory,
}

impl From<ActivationsArg> for ActivationStrategy {
    fn from(arg: ActivationsArg) -> Self {
        match arg {
            ActivationsArg::Checkpoint => ActivationStrategy::Checkpoint,
            ActivationsArg::Offload => ActivationStrategy::Offload,
            ActivationsArg::InMemory => ActivationStrategy::InMemory,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "train", about = "Distributed training launcher")]
struct Args {
    #[arg(long, short)]
    experiment_name: String,

    #[arg(long, short)]
    dataset_name: String,

    #[arg(long, short)]
    model_name: String,

    #[arg(long, default_value = "./outputs")]
    save_dir: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, default_value_t = 100)]
    num_epochs: u64,

    #[arg(long, default_value_t = 3e-5)]
    lr: f64,

    #[arg(long, default_value_t = 1)]
    batch_size: usize,

    #[arg(long, default_value_t = 100)]
    log_interval: u64,

    #[arg(long, default_value_t = 500)]
    checkpoint_interval: u64,

    #[arg(long, default_value = "./.cache")]
    dataset_cache_dir: PathBuf,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    cpu_offload: bool,

    #[arg(long, value_enum, default_value_t = PrefetchArg::Off)]
    gradient_prefetch: PrefetchArg,

    #[arg(long, value_enum, default_value_t = ActivationsArg::Checkpoint)]
    activations: ActivationsArg,

    #[arg(long)]
    seq_length: Option<usize>,

    /// Number of local workers standing in for the launcher's rank set
    #[arg(long, default_value_t = 2)]
    world_size: u32,

    /// Per-worker batches in one epoch of the synthetic dataset
    #[arg(long, default_value_t = 1000)]
    batches_per_epoch: u64,
}

impl Args {
    fn into_config(self) -> (TrainConfig, u32, u64) {
        let config = TrainConfig {
            experiment_name: self.experiment_name,
            dataset_name: self.dataset_name,
            model_name: self.model_name,
            save_dir: self.save_dir,
            seed: self.seed,
            num_epochs: self.num_epochs,
            lr: self.lr,
            batch_size: self.batch_size,
            log_interval: self.log_interval,
            checkpoint_interval: self.checkpoint_interval,
            dataset_cache_dir: self.dataset_cache_dir,
            cpu_offload: self.cpu_offload,
            gradient_prefetch: self.gradient_prefetch.into(),
            activations: self.activations.into(),
            seq_length: self.seq_length,
        };
        (config, self.world_size, self.batches_per_epoch)
    }
}

/// Write the dataset cache manifest if no previous run has. Called under
/// [`RankContext::leader_first`], so only the leader ever sees it absent.
async fn materialize_dataset_cache(
    config: &TrainConfig,
) -> runtime_core::Result<PathBuf> {
    let manifest = config
        .dataset_cache_dir
        .join(format!("{}.manifest.json", config.dataset_name));
    if !tokio::fs::try_exists(&manifest).await? {
        tokio::fs::create_dir_all(&config.dataset_cache_dir).await?;
        let doc = serde_json::json!({
            "dataset": config.dataset_name,
            "model": config.model_name,
            "seq_length": config.seq_length,
        });
        tokio::fs::write(&manifest, serde_json::to_vec_pretty(&doc)?).await?;
        tracing::info!(path = %manifest.display(), "Dataset cache materialized");
    }
    Ok(manifest)
}

async fn run_worker(
    member: Arc<LocalProcessGroup>,
    config: TrainConfig,
    batches_per_epoch: u64,
) -> runtime_core::Result<()> {
    let world_size = member.world_size();
    let ctx = RankContext::new(member as Arc<dyn ProcessGroup>, world_size)?;
    let rank = ctx.rank();

    {
        let config = &config;
        ctx.leader_first(|| materialize_dataset_cache(config)).await?;
    }

    let device = Arc::new(CpuDevice::new(ctx.local_device_index()));
    let store = Arc::new(LocalBlobStore::new(config.run_dir()));
    let checkpoints = CheckpointManager::new(ctx.clone(), store);

    let engine = SyntheticEngine::new(rank, config.seed);
    let pipeline = SyntheticPipeline::new(
        rank,
        world_size,
        batches_per_epoch,
        config.seq_length.unwrap_or(2048),
        config.seed,
    );
    let schedule = CosineAnnealingLr::new(config.lr);

    let mut trainer = Trainer::new(
        ctx,
        device,
        Box::new(engine),
        Box::new(pipeline),
        Box::new(schedule),
        Box::new(LogReporter),
        checkpoints,
        config,
    )?;

    trainer.resume().await?;
    let final_state = trainer.run().await?;
    tracing::info!(
        rank,
        global_step = final_state.global_step,
        "Worker finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "train=info,trainer=info,checkpoint=info,collective=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, world_size, batches_per_epoch) = Args::parse().into_config();
    config.validate()?;
    tracing::info!(
        experiment = %config.experiment_name,
        world_size,
        num_epochs = config.num_epochs,
        "Launching training run"
    );

    let members = LocalProcessGroup::bootstrap(world_size)?;
    let handles: Vec<_> = members
        .into_iter()
        .map(|member| {
            let config = config.clone();
            tokio::spawn(run_worker(member, config, batches_per_epoch))
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    Ok(())
}
