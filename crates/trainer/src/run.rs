//! The training loop state machine
//!
//! Every worker executes this loop in lock-step. Each stage of a step is
//! bracketed by a drained stage timer, and a timed barrier separates the
//! stages, so a slow worker shows up in everyone else's `waiting` timer
//! instead of being absorbed invisibly into the next collective call. All
//! control flow that touches the progress counters sits behind a barrier, so
//! every worker derives an identical [`TrainingState`] without exchanging it.

use crate::engine::{ComputeEngine, DataPipeline, MetricsReporter};
use crate::schedule::LrSchedule;
use checkpoint::{CheckpointManager, Restore};
use collective::RankContext;
use runtime_core::{
    Device, MetricsRecord, Result, Stage, StageTimers, TrainConfig, TrainingState,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Observable position in the loop's state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    EpochRunning,
    StepRunning,
    StepDone,
    EpochDone,
    Finished,
}

/// Drives one worker's share of the training run
pub struct Trainer {
    ctx: RankContext,
    device: Arc<dyn Device>,
    engine: Box<dyn ComputeEngine>,
    pipeline: Box<dyn DataPipeline>,
    schedule: Box<dyn LrSchedule>,
    reporter: Box<dyn MetricsReporter>,
    checkpoints: CheckpointManager,
    config: TrainConfig,
    timers: StageTimers,
    state: TrainingState,
    phase: Phase,
    resumed: bool,
}

impl Trainer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: RankContext,
        device: Arc<dyn Device>,
        engine: Box<dyn ComputeEngine>,
        pipeline: Box<dyn DataPipeline>,
        schedule: Box<dyn LrSchedule>,
        reporter: Box<dyn MetricsReporter>,
        checkpoints: CheckpointManager,
        config: TrainConfig,
    ) -> Result<Self> {
        config.validate()?;
        let timers = StageTimers::new(Arc::clone(&device));
        Ok(Self {
            ctx,
            device,
            engine,
            pipeline,
            schedule,
            reporter,
            checkpoints,
            config,
            timers,
            state: TrainingState::default(),
            phase: Phase::Idle,
            resumed: false,
        })
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the last [`Trainer::resume`] found a checkpoint record
    pub fn resumed(&self) -> bool {
        self.resumed
    }

    /// Collective restore attempt, then run-directory preparation.
    ///
    /// Must be called by every worker before [`Trainer::run`]. Returns true
    /// if a checkpoint record was found and loaded.
    pub async fn resume(&mut self) -> Result<bool> {
        match self.checkpoints.try_restore().await? {
            Restore::Resumed {
                state,
                shard,
                schedule,
            } => {
                self.engine.restore_partitioned_state(shard)?;
                self.schedule.load_state_bytes(&schedule)?;
                self.state = state;
                self.resumed = true;
            }
            Restore::Fresh(state) => {
                self.state = state;
                self.resumed = false;
            }
        }
        info!(
            rank = self.ctx.rank(),
            resumed = self.resumed,
            epoch = self.state.epoch,
            global_step = self.state.global_step,
            epoch_step = self.state.epoch_step,
            "Restore attempt complete"
        );

        self.checkpoints.prepare().await?;
        Ok(self.resumed)
    }

    /// Run until the epoch budget is exhausted, returning the final state.
    ///
    /// Collective. A compute error terminates this worker; its barrier-
    /// coupled peers stall until an external supervisor restarts the job.
    pub async fn run(&mut self) -> Result<TrainingState> {
        let rank = self.ctx.rank();
        let log_interval = self.config.log_interval;
        let checkpoint_interval = self.config.checkpoint_interval;

        for epoch in self.state.epoch..self.config.num_epochs {
            self.state.epoch = epoch;
            self.phase = Phase::EpochRunning;

            let batches_per_epoch = self.pipeline.batches_per_epoch();
            info!(
                rank,
                epoch,
                resume_cursor = self.state.epoch_step,
                batches_per_epoch,
                "Beginning epoch"
            );
            self.pipeline.start_epoch(epoch)?;

            for step_index in 0..batches_per_epoch {
                self.phase = Phase::StepRunning;

                let span = self.timers.stage(Stage::Data).begin();
                let batch = self.pipeline.next_batch()?;
                span.finish();

                if step_index < self.state.epoch_step {
                    // Resume fast-forward: the batch was consumed so the
                    // iteration order replays exactly, but nothing is
                    // recomputed and no counters move.
                    continue;
                }
                debug!(rank, step_index, "Batch resident on device");

                self.synchronize().await?;

                let span = self.timers.stage(Stage::Forward).begin();
                let loss = self.engine.forward(&batch).await?;
                span.finish();
                debug!(rank, step_index, loss, "Forward pass finished");

                self.synchronize().await?;

                let span = self.timers.stage(Stage::Backward).begin();
                self.engine.zero_gradients();
                self.engine.backward(loss).await?;
                span.finish();
                debug!(rank, step_index, "Backward pass finished");

                self.synchronize().await?;

                let span = self.timers.stage(Stage::Update).begin();
                self.engine.apply_update().await?;
                self.schedule.advance();
                span.finish();
                debug!(rank, step_index, "Optimizer update finished");

                self.synchronize().await?;

                self.state.record_step(loss);
                self.phase = Phase::StepDone;

                if self.state.global_step % log_interval == 0 {
                    self.emit_metrics(batches_per_epoch, step_index)?;
                }

                if self.state.global_step % checkpoint_interval == 0 {
                    self.save_checkpoint().await?;
                }
            }

            self.phase = Phase::EpochDone;
            // The cursor resets only after a full epoch; it is the resume
            // position within the current epoch until then.
            self.state.finish_epoch();
        }

        self.phase = Phase::Finished;
        info!(
            rank,
            global_step = self.state.global_step,
            epoch = self.state.epoch,
            "Training finished"
        );
        Ok(self.state.clone())
    }

    /// Timed barrier between stages
    async fn synchronize(&mut self) -> Result<()> {
        let span = self.timers.stage(Stage::Waiting).begin();
        self.ctx.barrier().await?;
        span.finish();
        Ok(())
    }

    /// Build and emit the logging-interval record, then reset the window
    fn emit_metrics(&mut self, batches_per_epoch: u64, step_index: u64) -> Result<()> {
        let memory = self.device.memory_stats();
        let record = MetricsRecord {
            global_step: self.state.global_step,
            epoch: self.state.epoch,
            learning_rate: self.schedule.current_lr(),
            mean_loss: self.state.running_loss / self.config.log_interval as f64,
            epoch_progress: self.state.epoch_step as f64 / batches_per_epoch as f64,
            batches_remaining: batches_per_epoch - step_index,
            current_memory_gb: memory.current_bytes as f64 * 1e-9,
            peak_memory_gb: memory.peak_bytes as f64 * 1e-9,
            stage_ms: self.timers.averages_ms(),
            total_ms: self.timers.total_ms(),
        };

        info!(
            rank = self.ctx.rank(),
            global_step = record.global_step,
            mean_loss = record.mean_loss,
            lr = record.learning_rate,
            total_ms = record.total_ms,
            "Step summary"
        );
        if self.ctx.is_leader() {
            self.reporter.report(&record)?;
        }

        self.device.reset_peak_memory();
        self.timers.reset();
        self.state.running_loss = 0.0;
        Ok(())
    }

    /// Collective checkpoint at the configured interval
    async fn save_checkpoint(&mut self) -> Result<()> {
        let shard = self.engine.snapshot_partitioned_state()?;
        let schedule = self.schedule.state_bytes()?;
        self.checkpoints.save(&shard, &schedule, &self.state).await
    }
}
