//! Collective - process-group bootstrap and synchronization
//!
//! Workers run in lock-step: every control-flow branch that affects the
//! training counters sits behind a [`ProcessGroup::barrier`], so no worker
//! can diverge onto a different step count without the group deadlocking at
//! the next barrier first.

mod context;
mod group;

pub use context::RankContext;
pub use group::{LocalProcessGroup, ProcessGroup};
