// src/ledger/mod.rs
pub mod consistency;
pub mod snapshot;

pub use consistency::{Consistency, ConsistencyChecker, InconsistencyReason};
pub use snapshot::{Snapshot, SnapshotState, StateDiff};
