// src/error.rs
use thiserror::Error;

use crate::dag::hash::{BundleHash, TryteHash};

/// Failure modes of the validation, storage and tip-selection core.
///
/// Every error is scoped to one transaction or one selection attempt; none of
/// them is fatal for the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TangleError {
    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("bundle {bundle} does not balance (sum {sum})")]
    BundleBalance { bundle: BundleHash, sum: i64 },

    #[error("transaction {hash} references unknown transaction {missing}")]
    DanglingReference { hash: TryteHash, missing: TryteHash },

    #[error("transaction {0} already admitted")]
    Duplicate(TryteHash),

    #[error("transaction {0} not found")]
    NotFound(TryteHash),

    #[error("no valid tip reachable from {0}")]
    NoValidTip(TryteHash),

    #[error("operation cancelled")]
    Cancelled,

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("config error: {0}")]
    Config(String),
}

impl TangleError {
    /// Whether the same request may succeed later without changing it
    /// (a dependency arrives, another entry point is tried, ...).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TangleError::DanglingReference { .. }
                | TangleError::NoValidTip(_)
                | TangleError::Cancelled
        )
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        TangleError::MalformedTransaction(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TangleError>;
