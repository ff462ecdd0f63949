//! Accelerator device abstraction
//!
//! Device-side computation may run asynchronously relative to host code; the
//! stage timers call [`Device::synchronize`] at every stage boundary so that
//! recorded timings reflect real stage cost rather than issue latency.

use crate::MemoryStats;

/// Interface to the accelerator owned by this worker process
pub trait Device: Send + Sync {
    /// Local device index on this host
    fn index(&self) -> u32;

    /// Block until all device work issued so far has completed
    fn synchronize(&self);

    /// Current and peak allocated memory
    fn memory_stats(&self) -> MemoryStats;

    /// Reset peak-memory accounting; called once per logging interval
    fn reset_peak_memory(&self);
}

/// Host-only device used by the local simulation group.
///
/// Host execution is already synchronous, so `synchronize` is a no-op and
/// memory accounting reports zero.
#[derive(Debug, Clone, Copy)]
pub struct CpuDevice {
    index: u32,
}

impl CpuDevice {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

impl Device for CpuDevice {
    fn index(&self) -> u32 {
        self.index
    }

    fn synchronize(&self) {}

    fn memory_stats(&self) -> MemoryStats {
        MemoryStats::default()
    }

    fn reset_peak_memory(&self) {}
}
