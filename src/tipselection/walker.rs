// src/tipselection/walker.rs
use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::weight::WeightCalculator;
use super::{TipSelection, TipSelectionConfig};
use crate::dag::hash::TryteHash;
use crate::dag::store::{TangleStore, TangleView};
use crate::error::{Result, TangleError};
use crate::ledger::consistency::ConsistencyChecker;

/// Weighted random walks from an entry point toward the tips.
///
/// The master RNG only hands out one seed per walk, so a fixed master seed
/// reproduces the same walks regardless of how rayon schedules them.
pub struct TipSelector<R = StdRng> {
    store: Arc<TangleStore>,
    config: TipSelectionConfig,
    rng: Mutex<R>,
    checker: ConsistencyChecker,
}

impl<R: RngCore + SeedableRng + Send> TipSelector<R> {
    pub fn new(store: Arc<TangleStore>, config: TipSelectionConfig, rng: R) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(rng),
            checker: ConsistencyChecker::new(),
        }
    }

    /// Seeded when `seed` is given, OS entropy otherwise.
    pub fn from_seed(
        store: Arc<TangleStore>,
        config: TipSelectionConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => R::seed_from_u64(seed),
            None => R::from_entropy(),
        };
        Self::new(store, config, rng)
    }

    pub fn config(&self) -> &TipSelectionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TangleStore> {
        &self.store
    }

    /// One walk from `entry`, on its own pinned view.
    pub fn select_tip(
        &self,
        entry: TryteHash,
        exclude: &HashSet<TryteHash>,
        cancel: &CancellationToken,
    ) -> Result<TryteHash> {
        let seed = self.rng.lock().next_u64();
        let view = self.store.read();
        walk(&view, &self.config, entry, exclude, &mut StdRng::seed_from_u64(seed), cancel)
    }

    /// `walk_count` walks in parallel, then a consistency check over the
    /// tips they reached.
    pub fn select_tips(
        &self,
        entry: TryteHash,
        exclude: &HashSet<TryteHash>,
        cancel: &CancellationToken,
    ) -> Result<TipSelection> {
        let seeds: Vec<u64> = {
            let mut rng = self.rng.lock();
            (0..self.config.walk_count).map(|_| rng.next_u64()).collect()
        };

        let tips = seeds
            .into_par_iter()
            .map(|seed| {
                let view = self.store.read();
                walk(&view, &self.config, entry, exclude, &mut StdRng::seed_from_u64(seed), cancel)
            })
            .collect::<Result<Vec<_>>>()?;

        let view = self.store.read();
        let verdict = self.checker.check_consistent(&view, &tips, cancel)?;
        debug!(
            entry = %entry.short(),
            tips = tips.len(),
            consistent = verdict.is_consistent(),
            "tip selection finished"
        );
        Ok(TipSelection { tips, verdict })
    }
}

/// Walk from `entry` along approvers until a tip. The entry must be admitted,
/// the null hash or a solid entry point.
pub fn walk<G: Rng + ?Sized>(
    view: &TangleView<'_>,
    config: &TipSelectionConfig,
    entry: TryteHash,
    exclude: &HashSet<TryteHash>,
    rng: &mut G,
    cancel: &CancellationToken,
) -> Result<TryteHash> {
    if !view.is_reference_target(&entry) {
        return Err(TangleError::NotFound(entry));
    }
    if exclude.contains(&entry) {
        return Err(TangleError::NoValidTip(entry));
    }

    let weights = WeightCalculator::new(view);
    let mut current = entry;
    for _ in 0..config.max_walk_steps {
        if cancel.is_cancelled() {
            return Err(TangleError::Cancelled);
        }
        let approvers = view.approvers(&current);
        if approvers.is_empty() {
            // a boundary with nothing attached is not a transaction to approve
            if view.is_boundary(&current) {
                return Err(TangleError::NoValidTip(entry));
            }
            return Ok(current);
        }

        let mut candidates: Vec<TryteHash> =
            approvers.iter().filter(|h| !exclude.contains(*h)).copied().collect();
        if candidates.is_empty() {
            return Err(TangleError::NoValidTip(entry));
        }
        candidates.sort();
        let next = if candidates.len() == 1 {
            candidates[0]
        } else {
            let w = weights.weights_of(&candidates)?;
            candidates[transition_index(&w, config.alpha, rng)]
        };
        trace!(from = %current.short(), to = %next.short(), "walk step");
        current = next;
    }
    Err(TangleError::NoValidTip(entry))
}

/// Pick an index with probability proportional to `exp(alpha * (w - w_max))`.
fn transition_index<G: Rng + ?Sized>(weights: &[u64], alpha: f64, rng: &mut G) -> usize {
    let max = weights.iter().copied().max().unwrap_or(0) as f64;
    let ratings: Vec<f64> = weights.iter().map(|w| (alpha * (*w as f64 - max)).exp()).collect();
    match WeightedIndex::new(&ratings) {
        Ok(dist) => dist.sample(rng),
        // the heaviest candidate always rates exp(0) = 1
        Err(_) => 0,
    }
}
