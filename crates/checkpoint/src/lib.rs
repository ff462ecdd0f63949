//! Checkpoint persistence for partitioned training state
//!
//! A checkpoint record is the union of every rank's partitioned-state blob,
//! one scheduler blob, and one scalar progress document. The manager keeps
//! the record consistent with barrier discipline: no worker proceeds past a
//! checkpoint boundary until every shard and the scalar documents are
//! durably written, and a record with a mismatched rank set fails restore
//! fatally instead of loading mixed state.

pub mod layout;
pub mod manager;
pub mod store;

pub use layout::CheckpointLayout;
pub use manager::{CheckpointManager, Restore};
pub use store::{BlobStore, LocalBlobStore};
