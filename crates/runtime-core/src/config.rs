//! Training run configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Launch configuration for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Experiment name; the run directory is `<save_dir>/<experiment_name>`
    pub experiment_name: String,

    /// Dataset identifier
    pub dataset_name: String,

    /// Model identifier
    pub model_name: String,

    /// Root directory for run outputs and checkpoints
    pub save_dir: PathBuf,

    /// Random seed shared by every worker
    pub seed: u64,

    /// Epoch budget; the run finishes when `epoch` reaches this
    pub num_epochs: u64,

    /// Base learning rate
    pub lr: f64,

    /// Per-worker batch size
    pub batch_size: usize,

    /// Emit a metrics record every N global steps
    pub log_interval: u64,

    /// Save a checkpoint every N global steps
    pub checkpoint_interval: u64,

    /// Shared dataset cache directory
    pub dataset_cache_dir: PathBuf,

    /// Offload parameters to host memory
    pub cpu_offload: bool,

    /// Gradient prefetch mode
    pub gradient_prefetch: GradientPrefetch,

    /// Activation memory strategy
    pub activations: ActivationStrategy,

    /// Sequence length override; pipeline default when unset
    pub seq_length: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            experiment_name: "default".to_string(),
            dataset_name: "default".to_string(),
            model_name: "default".to_string(),
            save_dir: PathBuf::from("./outputs"),
            seed: 0,
            num_epochs: 100,
            lr: 3e-5,
            batch_size: 1,
            log_interval: 100,
            checkpoint_interval: 500,
            dataset_cache_dir: PathBuf::from("./.cache"),
            cpu_offload: true,
            gradient_prefetch: GradientPrefetch::Off,
            activations: ActivationStrategy::Checkpoint,
            seq_length: None,
        }
    }
}

impl TrainConfig {
    /// Directory holding this run's progress document and checkpoint record
    pub fn run_dir(&self) -> PathBuf {
        self.save_dir.join(&self.experiment_name)
    }

    /// Validate interval and budget settings
    pub fn validate(&self) -> Result<()> {
        if self.experiment_name.is_empty() {
            return Err(Error::InvalidConfig {
                message: "experiment_name must not be empty".to_string(),
            });
        }
        if self.num_epochs == 0 {
            return Err(Error::InvalidConfig {
                message: "num_epochs must be at least 1".to_string(),
            });
        }
        if self.log_interval == 0 || self.checkpoint_interval == 0 {
            return Err(Error::InvalidConfig {
                message: "log_interval and checkpoint_interval must be non-zero".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig {
                message: "batch_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Gradient prefetch mode selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientPrefetch {
    /// Prefetch before the backward pass of the next layer group
    BackwardPre,

    /// Prefetch after the backward pass of the current layer group
    BackwardPost,

    /// No prefetch
    Off,
}

/// Activation memory strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationStrategy {
    /// Recompute activations during the backward pass
    Checkpoint,

    /// Offload activations to host memory
    Offload,

    /// Keep activations resident on the device
    InMemory,
}
