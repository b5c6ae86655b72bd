// src/tipselection/mod.rs
pub mod walker;
pub mod weight;

use serde::{Deserialize, Serialize};

use crate::dag::hash::TryteHash;
use crate::ledger::consistency::Consistency;

pub use walker::TipSelector;
pub use weight::{WeightCache, WeightCalculator};

/// Walk parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TipSelectionConfig {
    /// Bias toward heavier approvers; 0 walks uniformly.
    pub alpha: f64,
    pub walk_count: usize,
    pub max_walk_steps: usize,
}

impl Default for TipSelectionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.001,
            walk_count: 2,
            max_walk_steps: 100_000,
        }
    }
}

/// Tips reached by a round of walks and whether they may be approved together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TipSelection {
    pub tips: Vec<TryteHash>,
    pub verdict: Consistency,
}

impl TipSelection {
    pub fn is_consistent(&self) -> bool {
        self.verdict.is_consistent()
    }

    /// Trunk and branch for a new attachment; `None` unless the tips are
    /// consistent. A single walk approves its tip twice.
    pub fn trunk_and_branch(&self) -> Option<(TryteHash, TryteHash)> {
        if !self.is_consistent() {
            return None;
        }
        match self.tips.as_slice() {
            [] => None,
            [only] => Some((*only, *only)),
            [trunk, branch, ..] => Some((*trunk, *branch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::consistency::InconsistencyReason;

    #[test]
    fn trunk_and_branch_requires_consistency() {
        let a = TryteHash::label("A").unwrap();
        let b = TryteHash::label("B").unwrap();
        let ok = TipSelection {
            tips: vec![a, b],
            verdict: Consistency::Consistent,
        };
        assert_eq!(ok.trunk_and_branch(), Some((a, b)));

        let single = TipSelection {
            tips: vec![a],
            verdict: Consistency::Consistent,
        };
        assert_eq!(single.trunk_and_branch(), Some((a, a)));

        let bad = TipSelection {
            tips: vec![a, b],
            verdict: Consistency::Inconsistent {
                reason: InconsistencyReason::Overspend { address: a, balance: -1 },
                conflicting: vec![a, b],
            },
        };
        assert_eq!(bad.trunk_and_branch(), None);
    }
}
