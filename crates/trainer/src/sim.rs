//! Synthetic compute and data backends
//!
//! Deterministic stand-ins for a real model engine and dataset loader. The
//! loss curve, parameter trajectory, and batch contents are pure functions of
//! the seed, so a resumed run is bit-comparable to an uninterrupted one.

use crate::engine::{ComputeEngine, DataPipeline};
use async_trait::async_trait;
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use runtime_core::{Batch, Epoch, Error, PartitionedState, Rank, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const PARAM_COUNT: usize = 256;

fn mix_seed(parts: &[u64]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for part in parts {
        part.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Serialize, Deserialize)]
struct OptimizerShard {
    moments: Vec<f32>,
    updates: u64,
}

/// Simulated model shard with a decaying loss curve
pub struct SyntheticEngine {
    rank: Rank,
    seed: u64,
    updates: u64,
    params: Vec<f32>,
    moments: Vec<f32>,
    grads_ready: bool,
    last_loss: f64,
}

impl SyntheticEngine {
    pub fn new(rank: Rank, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(&[seed, u64::from(rank)]));
        let params = (0..PARAM_COUNT).map(|_| rng.gen_range(-0.1..0.1)).collect();
        Self {
            rank,
            seed,
            updates: 0,
            params,
            moments: vec![0.0; PARAM_COUNT],
            grads_ready: false,
            last_loss: 0.0,
        }
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }
}

#[async_trait]
impl ComputeEngine for SyntheticEngine {
    async fn forward(&mut self, batch: &Batch) -> Result<f64> {
        let jitter = mix_seed(&[self.seed, batch.index, self.updates]) % 1000;
        let loss = 10.0 / (1.0 + self.updates as f64 * 0.05) + jitter as f64 * 1e-4;
        self.last_loss = loss;
        Ok(loss)
    }

    async fn backward(&mut self, _loss: f64) -> Result<()> {
        self.grads_ready = true;
        Ok(())
    }

    fn zero_gradients(&mut self) {
        self.grads_ready = false;
    }

    async fn apply_update(&mut self) -> Result<()> {
        if !self.grads_ready {
            return Err(Error::Compute {
                message: "optimizer step without gradients".into(),
            });
        }
        let scale = (self.last_loss * 1e-3) as f32;
        for (param, moment) in self.params.iter_mut().zip(self.moments.iter_mut()) {
            *moment = 0.9 * *moment + scale;
            *param -= *moment;
        }
        self.grads_ready = false;
        self.updates += 1;
        Ok(())
    }

    fn snapshot_partitioned_state(&self) -> Result<PartitionedState> {
        let opt = OptimizerShard {
            moments: self.moments.clone(),
            updates: self.updates,
        };
        Ok(PartitionedState {
            rank: self.rank,
            model_shard: bincode::serialize(&self.params)?,
            opt_shard: bincode::serialize(&opt)?,
        })
    }

    fn restore_partitioned_state(&mut self, shard: PartitionedState) -> Result<()> {
        if shard.rank != self.rank {
            return Err(Error::Internal {
                message: format!(
                    "shard for rank {} handed to engine on rank {}",
                    shard.rank, self.rank
                ),
            });
        }
        let opt: OptimizerShard = bincode::deserialize(&shard.opt_shard)?;
        self.params = bincode::deserialize(&shard.model_shard)?;
        self.moments = opt.moments;
        self.updates = opt.updates;
        self.grads_ready = false;
        Ok(())
    }
}

/// Seed-shuffled, rank-strided synthetic batch source
pub struct SyntheticPipeline {
    rank: Rank,
    world_size: u32,
    batches_per_epoch: u64,
    batch_bytes: usize,
    seed: u64,
    epoch: Epoch,
    order: Vec<u64>,
    cursor: usize,
}

impl SyntheticPipeline {
    pub fn new(
        rank: Rank,
        world_size: u32,
        batches_per_epoch: u64,
        batch_bytes: usize,
        seed: u64,
    ) -> Self {
        Self {
            rank,
            world_size,
            batches_per_epoch,
            batch_bytes,
            seed,
            epoch: 0,
            order: Vec::new(),
            cursor: 0,
        }
    }

    fn batch_payload(&self, global_id: u64) -> Bytes {
        let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(&[self.seed, global_id]));
        let mut tokens = vec![0u8; self.batch_bytes];
        rng.fill(tokens.as_mut_slice());
        Bytes::from(tokens)
    }
}

impl DataPipeline for SyntheticPipeline {
    fn batches_per_epoch(&self) -> u64 {
        self.batches_per_epoch
    }

    fn start_epoch(&mut self, epoch: Epoch) -> Result<()> {
        let total = self.batches_per_epoch * u64::from(self.world_size);
        let mut ids: Vec<u64> = (0..total).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(mix_seed(&[self.seed, epoch]));
        ids.shuffle(&mut rng);
        self.order = ids
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i as u64 % u64::from(self.world_size) == u64::from(self.rank))
            .map(|(_, id)| id)
            .collect();
        self.epoch = epoch;
        self.cursor = 0;
        Ok(())
    }

    fn next_batch(&mut self) -> Result<Batch> {
        let Some(&global_id) = self.order.get(self.cursor) else {
            return Err(Error::DataExhausted {
                epoch: self.epoch,
                index: self.cursor as u64,
            });
        };
        self.cursor += 1;
        Ok(Batch {
            index: (self.cursor - 1) as u64,
            tokens: self.batch_payload(global_id),
        })
    }
}
