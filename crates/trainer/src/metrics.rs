//! Metrics reporter implementations

use crate::MetricsReporter;
use runtime_core::{MetricsRecord, Result};
use tracing::info;

/// Reporter that emits each record as a structured tracing event.
///
/// Stands in for an experiment tracker in the local runner; real deployments
/// adapt their tracker behind [`MetricsReporter`].
#[derive(Debug, Default)]
pub struct LogReporter;

impl MetricsReporter for LogReporter {
    fn report(&mut self, record: &MetricsRecord) -> Result<()> {
        info!(
            global_step = record.global_step,
            epoch = record.epoch,
            lr = record.learning_rate,
            mean_loss = record.mean_loss,
            epoch_progress = record.epoch_progress,
            batches_remaining = record.batches_remaining,
            current_memory_gb = record.current_memory_gb,
            peak_memory_gb = record.peak_memory_gb,
            total_ms = record.total_ms,
            stage_ms = ?record.stage_ms,
            "Metrics record"
        );
        Ok(())
    }
}
