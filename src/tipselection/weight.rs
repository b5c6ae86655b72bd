// src/tipselection/weight.rs
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::dag::hash::TryteHash;
use crate::dag::store::{TangleState, TangleView};
use crate::dag::transaction::Transaction;
use crate::error::{Result, TangleError};

/// Memoized cumulative weights.
///
/// Only touched while the caller holds a store read view or the admission
/// write lock, so an entry always matches the tangle it is read against.
#[derive(Debug)]
pub struct WeightCache {
    entries: Mutex<HashMap<TryteHash, u64>>,
    window: usize,
}

impl WeightCache {
    pub fn new(window: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Largest past-cone the admission path will walk before giving up and
    /// clearing the cache.
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn get(&self, hash: &TryteHash) -> Option<u64> {
        self.entries.lock().get(hash).copied()
    }

    pub(crate) fn insert(&self, hash: TryteHash, weight: u64) {
        self.entries.lock().insert(hash, weight);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// `tx` was just inserted into `state`: every cached transaction in its
    /// past-cone gains exactly one approver.
    pub(crate) fn record_admission(&self, state: &TangleState, tx: &Transaction) {
        let mut entries = self.entries.lock();
        if entries.is_empty() {
            return;
        }

        let mut seen: HashSet<TryteHash> = HashSet::new();
        let mut queue: VecDeque<TryteHash> = tx.parents().into_iter().collect();
        while let Some(hash) = queue.pop_front() {
            if state.is_boundary(&hash) || !seen.insert(hash) {
                continue;
            }
            if seen.len() > self.window {
                debug!(
                    hash = %tx.hash.short(),
                    window = self.window,
                    cached = entries.len(),
                    "past-cone exceeds weight window, clearing weight cache"
                );
                entries.clear();
                return;
            }
            if let Ok(ancestor) = state.get(&hash) {
                queue.extend(ancestor.parents());
            }
        }

        for hash in &seen {
            if let Some(weight) = entries.get_mut(hash) {
                *weight += 1;
            }
        }
    }
}

/// Cumulative weight over a pinned view: the number of admitted transactions,
/// itself included, that directly or indirectly approve a hash.
pub struct WeightCalculator<'v> {
    state: &'v TangleState,
    cache: &'v WeightCache,
}

impl<'v> WeightCalculator<'v> {
    pub fn new(view: &'v TangleView<'_>) -> Self {
        Self {
            state: &**view,
            cache: view.weights(),
        }
    }

    /// Memoized weight. Null and entry-point hashes are not transactions and
    /// have no weight.
    pub fn cumulative_weight(&self, hash: &TryteHash) -> Result<u64> {
        if let Some(weight) = self.cache.get(hash) {
            return Ok(weight);
        }
        let weight = self.count_approving(hash)?;
        self.cache.insert(*hash, weight);
        Ok(weight)
    }

    /// Uncached breadth-first count over approvers.
    pub fn count_approving(&self, hash: &TryteHash) -> Result<u64> {
        if self.state.is_boundary(hash) {
            return Err(TangleError::NotFound(*hash));
        }
        self.state.get(hash)?;

        let mut seen: HashSet<TryteHash> = HashSet::from([*hash]);
        let mut queue = VecDeque::from([*hash]);
        while let Some(current) = queue.pop_front() {
            for approver in self.state.approvers(&current) {
                if seen.insert(*approver) {
                    queue.push_back(*approver);
                }
            }
        }
        Ok(seen.len() as u64)
    }

    pub fn weights_of(&self, hashes: &[TryteHash]) -> Result<Vec<u64>> {
        hashes.iter().map(|h| self.cumulative_weight(h)).collect()
    }
}
