//! Per-stage wall-time measurement
//!
//! A [`StageTimer`] brackets one named stage of the step protocol. Entering a
//! stage drains the device queue and takes a start mark; finishing drains
//! again and records the elapsed time, so a measurement covers work that
//! actually completed on the device. Dropping an unfinished [`StageSpan`]
//! (the error path) discards the in-flight measurement so a failed stage
//! never pollutes the average.

use crate::Device;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Stage kinds measured by the training loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Data,
    Waiting,
    Forward,
    Backward,
    Update,
}

impl Stage {
    /// All stages, in step-protocol order
    pub const ALL: [Stage; 5] = [
        Stage::Data,
        Stage::Waiting,
        Stage::Forward,
        Stage::Backward,
        Stage::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Data => "data",
            Stage::Waiting => "waiting",
            Stage::Forward => "forward",
            Stage::Backward => "backward",
            Stage::Update => "update",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling elapsed-time samples for one stage
pub struct StageTimer {
    device: Arc<dyn Device>,
    samples: Vec<Duration>,
}

impl StageTimer {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            device,
            samples: Vec::new(),
        }
    }

    /// Enter the stage: drain the device, then take the start mark.
    ///
    /// The returned span must be [`StageSpan::finish`]ed on the success path;
    /// dropping it records nothing.
    pub fn begin(&mut self) -> StageSpan<'_> {
        self.device.synchronize();
        StageSpan {
            timer: self,
            started: Instant::now(),
        }
    }

    /// Mean of the recorded samples in milliseconds; `None` if no samples
    /// were recorded since the last reset.
    pub fn average_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total.as_secs_f64() * 1000.0 / self.samples.len() as f64)
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Clear all samples; called once per logging interval
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

/// In-flight measurement of one stage invocation.
///
/// No `Drop` impl: an abandoned span simply never reaches the sample list.
pub struct StageSpan<'a> {
    timer: &'a mut StageTimer,
    started: Instant,
}

impl StageSpan<'_> {
    /// Exit the stage normally: drain the device and record the elapsed time
    pub fn finish(self) {
        self.timer.device.synchronize();
        self.timer.samples.push(self.started.elapsed());
    }
}

/// One timer per step-protocol stage
pub struct StageTimers {
    timers: [StageTimer; 5],
}

impl StageTimers {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self {
            timers: Stage::ALL.map(|_| StageTimer::new(Arc::clone(&device))),
        }
    }

    pub fn stage(&mut self, stage: Stage) -> &mut StageTimer {
        &mut self.timers[stage as usize]
    }

    /// Per-stage averages in milliseconds, empty stages reporting 0.0
    pub fn averages_ms(&self) -> BTreeMap<String, f64> {
        Stage::ALL
            .iter()
            .map(|s| {
                let avg = self.timers[*s as usize].average_ms().unwrap_or(0.0);
                (s.as_str().to_string(), avg)
            })
            .collect()
    }

    /// Sum of the per-stage averages
    pub fn total_ms(&self) -> f64 {
        Stage::ALL
            .iter()
            .filter_map(|s| self.timers[*s as usize].average_ms())
            .sum()
    }

    pub fn reset(&mut self) {
        for timer in &mut self.timers {
            timer.reset();
        }
    }
}
