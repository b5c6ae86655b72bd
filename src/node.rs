// src/node.rs
use anyhow::{bail, Context};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{validate_config, TangleConfig};
use crate::dag::hash::TryteHash;
use crate::dag::store::{TangleState, TangleStore};
use crate::dag::transaction::{Transaction, TransactionBuilder, TAG_TRYTES};
use crate::dag::trytes::int_to_trytes;
use crate::error::{Result, TangleError};
use crate::ledger::consistency::{Consistency, ConsistencyChecker};
use crate::ledger::snapshot::Snapshot;
use crate::mempool::{PendingPool, Submission};
use crate::tipselection::weight::WeightCalculator;
use crate::tipselection::{TipSelection, TipSelector};

/// Tip selections tried before `attach` gives up on an inconsistent tangle.
const ATTACH_ATTEMPTS: usize = 3;

/// Store, pending pool and tip selector wired from one configuration.
pub struct TangleNode {
    config: TangleConfig,
    store: Arc<TangleStore>,
    pool: PendingPool,
    selector: TipSelector,
}

/// Result of [`TangleNode::attach`].
#[derive(Debug, Clone)]
pub enum Attachment {
    Attached(Arc<Transaction>),
    /// Every selection round produced tips that conflict; the last one is kept.
    Inconsistent(TipSelection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    pub transactions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub attached: usize,
    pub inconsistent_selections: usize,
    pub cancelled: bool,
    pub tips: Vec<TryteHash>,
    /// Cumulative weights of the transactions attached directly to the entry point.
    pub entry_weights: Vec<(TryteHash, u64)>,
    pub verdict: Consistency,
    pub elapsed_ms: u64,
}

impl TangleNode {
    /// Validate `config`, load the snapshot file if one is configured, and
    /// build the node.
    pub fn new(config: TangleConfig) -> anyhow::Result<Self> {
        let validation = validate_config(&config);
        validation.print_summary();
        if !validation.valid {
            bail!("invalid configuration: {}", validation.errors.join("; "));
        }
        let snapshot = match &config.snapshot_path {
            Some(path) => Snapshot::load(path)
                .with_context(|| format!("loading snapshot {}", path.display()))?,
            None => None,
        };
        Ok(Self::with_snapshot(config, snapshot))
    }

    pub fn with_snapshot(config: TangleConfig, snapshot: Option<Snapshot>) -> Self {
        let store = Arc::new(match snapshot {
            Some(snapshot) => TangleStore::with_snapshot(snapshot, config.weight_window),
            None => TangleStore::new(config.weight_window),
        });
        let pool = PendingPool::new(store.clone(), config.pending_capacity);
        let selector =
            TipSelector::from_seed(store.clone(), config.tip_selection(), config.rng_seed);
        Self {
            config,
            store,
            pool,
            selector,
        }
    }

    pub fn config(&self) -> &TangleConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TangleStore> {
        &self.store
    }

    pub fn pool(&self) -> &PendingPool {
        &self.pool
    }

    pub fn selector(&self) -> &TipSelector {
        &self.selector
    }

    pub fn submit(&self, tx: Transaction) -> Result<Submission> {
        self.pool.submit(tx)
    }

    /// Where walks start: the lowest solid entry point, or the null hash.
    pub fn entry_point(&self) -> TryteHash {
        lowest_entry_point(&self.store.read())
    }

    /// Tips to approve next. A bare entry point is its own attachment target.
    pub fn select_attachment(&self, cancel: &CancellationToken) -> Result<TipSelection> {
        let entry = self.entry_point();
        if self.store.read().approvers(&entry).is_empty() {
            return Ok(TipSelection {
                tips: vec![entry],
                verdict: Consistency::Consistent,
            });
        }
        self.selector.select_tips(entry, &HashSet::new(), cancel)
    }

    /// Approve a consistent trunk/branch pair with the transaction described
    /// by `builder` and submit it. The nonce is left as given.
    pub fn attach(
        &self,
        builder: TransactionBuilder,
        cancel: &CancellationToken,
    ) -> Result<Attachment> {
        let mut selection = self.select_attachment(cancel)?;
        for attempt in 1..=ATTACH_ATTEMPTS {
            if let Some((trunk, branch)) = selection.trunk_and_branch() {
                let tx = builder
                    .clone()
                    .parents(trunk, branch)
                    .attachment_timestamp(Utc::now().timestamp_millis().max(0) as u64)
                    .build()?;
                let hash = tx.hash;
                return match self.pool.submit(tx)? {
                    Submission::Admitted(_) | Submission::AlreadyKnown => {
                        Ok(Attachment::Attached(self.store.get(&hash)?))
                    }
                    Submission::Parked => Err(TangleError::DanglingReference {
                        hash,
                        missing: trunk,
                    }),
                };
            }
            debug!(attempt, "selected tips are inconsistent, selecting again");
            if attempt < ATTACH_ATTEMPTS {
                selection = self.select_attachment(cancel)?;
            }
        }
        Ok(Attachment::Inconsistent(selection))
    }

    /// Grow the tangle by `params.transactions` zero-value attachments and
    /// report how it looks afterwards. Cancellation stops early with a
    /// partial report.
    pub fn simulate(
        &self,
        params: SimulationParams,
        cancel: &CancellationToken,
    ) -> Result<SimulationReport> {
        let started = Instant::now();
        let mut attached = 0;
        let mut inconsistent_selections = 0;
        let mut cancelled = false;

        info!(transactions = params.transactions, alpha = self.config.alpha, "simulation started");
        for i in 0..params.transactions {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let marker = int_to_trytes(i as i64, TAG_TRYTES)?;
            let builder = TransactionBuilder::new()
                .tag(marker.clone())
                .bundle(TryteHash::label(&format!("SIM{}", marker))?)
                .timestamp(i as u64);
            match self.attach(builder, cancel) {
                Ok(Attachment::Attached(_)) => attached += 1,
                Ok(Attachment::Inconsistent(_)) => inconsistent_selections += 1,
                Err(TangleError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) if e.is_retryable() => warn!(error = %e, "attachment failed, continuing"),
                Err(e) => return Err(e),
            }
        }

        let view = self.store.read();
        let tips = view.tips();
        let verdict =
            ConsistencyChecker::new().check_consistent(&view, &tips, &CancellationToken::new())?;
        let weights = WeightCalculator::new(&view);
        let mut entry_weights = Vec::new();
        let mut first: Vec<_> =
            view.approvers(&lowest_entry_point(&view)).iter().copied().collect();
        first.sort();
        for hash in first {
            entry_weights.push((hash, weights.cumulative_weight(&hash)?));
        }

        let report = SimulationReport {
            attached,
            inconsistent_selections,
            cancelled,
            tips,
            entry_weights,
            verdict,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            attached = report.attached,
            tips = report.tips.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "simulation finished"
        );
        Ok(report)
    }
}

fn lowest_entry_point(state: &TangleState) -> TryteHash {
    state.entry_points().iter().min().copied().unwrap_or(TryteHash::NULL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(seed: u64) -> TangleNode {
        let config = TangleConfig {
            rng_seed: Some(seed),
            alpha: 0.5,
            ..TangleConfig::default()
        };
        TangleNode::with_snapshot(config, None)
    }

    #[test]
    fn first_attachment_approves_the_null_hash() {
        let node = node(1);
        let cancel = CancellationToken::new();
        let builder = TransactionBuilder::new().tag("FIRST").timestamp(1);
        let Attachment::Attached(tx) = node.attach(builder, &cancel).unwrap() else {
            panic!("expected attachment");
        };
        assert_eq!(tx.parents(), [TryteHash::NULL, TryteHash::NULL]);
        assert_eq!(node.store().tips(), vec![tx.hash]);
    }

    #[test]
    fn simulation_grows_a_consistent_tangle() {
        let node = node(9);
        let report = node
            .simulate(SimulationParams { transactions: 40 }, &CancellationToken::new())
            .unwrap();
        assert_eq!(report.attached, 40);
        assert_eq!(node.store().len(), 40);
        assert!(report.verdict.is_consistent());
        assert!(!report.tips.is_empty());
        assert!(report.entry_weights.iter().any(|(_, w)| *w > 1));
    }

    #[test]
    fn cancelled_simulation_reports_partial_progress() {
        let node = node(3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = node.simulate(SimulationParams { transactions: 10 }, &cancel).unwrap();
        assert!(report.cancelled);
        assert_eq!(report.attached, 0);
    }
}
