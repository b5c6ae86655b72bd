// src/ledger/consistency.rs
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dag::bundle::Bundle;
use crate::dag::hash::{Address, BundleHash, TryteHash};
use crate::dag::store::TangleState;
use crate::error::{Result, TangleError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum InconsistencyReason {
    /// Replaying the past-cone drove this address below zero.
    Overspend { address: Address, balance: i64 },
}

/// Verdict on a set of tips. Not an error: callers branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Consistency {
    Consistent,
    Inconsistent {
        reason: InconsistencyReason,
        conflicting: Vec<TryteHash>,
    },
}

impl Consistency {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Consistency::Consistent)
    }
}

/// Replays the combined past-cone of a tip set in topological order and
/// looks for an address whose running balance goes negative.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyChecker;

impl ConsistencyChecker {
    pub fn new() -> Self {
        Self
    }

    /// `state` must stay pinned for the whole check (pass a `TangleView`).
    pub fn check_consistent(
        &self,
        state: &TangleState,
        tips: &[TryteHash],
        cancel: &CancellationToken,
    ) -> Result<Consistency> {
        let cone = past_cone(state, tips, cancel)?;
        let order = topological_order(state, &cone, cancel)?;

        let mut countable: HashMap<BundleHash, bool> = HashMap::new();
        let mut replayed: HashSet<(BundleHash, u64)> = HashSet::new();
        let mut balances: HashMap<Address, i64> = HashMap::new();

        for hash in order {
            if cancel.is_cancelled() {
                return Err(TangleError::Cancelled);
            }
            let tx = state.get(&hash)?;
            if tx.value == 0 || !is_countable(state, &cone, &tx.bundle, &mut countable) {
                continue;
            }
            // reattachments share a slot and move its value once
            if !replayed.insert((tx.bundle, tx.current_index)) {
                continue;
            }

            let balance = balances
                .entry(tx.address)
                .or_insert_with(|| state.ledger().balance(&tx.address).unwrap_or(0));
            *balance = balance.saturating_add(tx.value);
            if *balance < 0 {
                let conflicting = spends_in_cone(state, &cone, &tx.address, &mut countable);
                debug!(address = %tx.address.short(), balance = *balance, "tips are inconsistent");
                return Ok(Consistency::Inconsistent {
                    reason: InconsistencyReason::Overspend {
                        address: tx.address,
                        balance: *balance,
                    },
                    conflicting,
                });
            }
        }
        Ok(Consistency::Consistent)
    }
}

/// A bundle moves value only when every one of its indexes has a member
/// inside the cone. Partial and malformed bundles are left out of the replay.
fn is_countable(
    state: &TangleState,
    cone: &HashSet<TryteHash>,
    bundle: &BundleHash,
    cache: &mut HashMap<BundleHash, bool>,
) -> bool {
    *cache.entry(*bundle).or_insert_with(|| {
        let members = state.bundle_members(bundle);
        let in_cone = members.iter().filter(|m| cone.contains(&m.hash)).map(|m| m.as_ref());
        match Bundle::collect(*bundle, in_cone) {
            Ok(bundle) => bundle.is_complete(),
            Err(e) => {
                warn!(
                    bundle = %bundle.short(),
                    error = %e,
                    "ignoring malformed bundle during replay"
                );
                false
            }
        }
    })
}

/// Every counted spend from `address` inside the cone, in (timestamp, hash) order.
fn spends_in_cone(
    state: &TangleState,
    cone: &HashSet<TryteHash>,
    address: &Address,
    countable: &mut HashMap<BundleHash, bool>,
) -> Vec<TryteHash> {
    let mut spends: Vec<_> = state
        .by_address(address)
        .into_iter()
        .filter(|h| cone.contains(h))
        .filter_map(|h| state.get(&h).ok())
        .filter(|tx| tx.value < 0 && is_countable(state, cone, &tx.bundle, countable))
        .map(|tx| (tx.timestamp, tx.hash))
        .collect();
    spends.sort();
    spends.into_iter().map(|(_, h)| h).collect()
}

/// Every admitted transaction reachable backward from `tips`, stopping at the
/// null hash and solid entry points.
pub fn past_cone(
    state: &TangleState,
    tips: &[TryteHash],
    cancel: &CancellationToken,
) -> Result<HashSet<TryteHash>> {
    let mut cone = HashSet::new();
    let mut stack = Vec::new();
    for tip in tips {
        if state.is_boundary(tip) {
            continue;
        }
        state.get(tip)?;
        stack.push(*tip);
    }
    while let Some(hash) = stack.pop() {
        if cancel.is_cancelled() {
            return Err(TangleError::Cancelled);
        }
        if !cone.insert(hash) {
            continue;
        }
        let tx = state.get(&hash)?;
        for parent in tx.parents() {
            if !state.is_boundary(&parent) && !cone.contains(&parent) {
                stack.push(parent);
            }
        }
    }
    Ok(cone)
}

/// Kahn's algorithm with trunk/branch as dependency edges; ready transactions
/// are taken in (timestamp, hash) order.
fn topological_order(
    state: &TangleState,
    cone: &HashSet<TryteHash>,
    cancel: &CancellationToken,
) -> Result<Vec<TryteHash>> {
    let mut in_degree: HashMap<TryteHash, usize> = HashMap::with_capacity(cone.len());
    let mut ready = BinaryHeap::new();

    for hash in cone {
        let tx = state.get(hash)?;
        let mut parents: Vec<_> = tx.parents().into_iter().filter(|p| cone.contains(p)).collect();
        parents.dedup();
        if parents.is_empty() {
            ready.push(Reverse((tx.timestamp, *hash)));
        }
        in_degree.insert(*hash, parents.len());
    }

    let mut order = Vec::with_capacity(cone.len());
    while let Some(Reverse((_, hash))) = ready.pop() {
        if cancel.is_cancelled() {
            return Err(TangleError::Cancelled);
        }
        order.push(hash);
        for child in state.approvers(&hash) {
            let Some(degree) = in_degree.get_mut(child) else { continue };
            *degree -= 1;
            if *degree == 0 {
                let tx = state.get(child)?;
                ready.push(Reverse((tx.timestamp, *child)));
            }
        }
    }
    Ok(order)
}
