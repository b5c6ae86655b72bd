// src/dag/store.rs
use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, info};

use super::bundle::Bundle;
use super::hash::{Address, BundleHash, TryteHash};
use super::transaction::Transaction;
use crate::error::{Result, TangleError};
use crate::ledger::snapshot::{Snapshot, SnapshotState};
use crate::tipselection::weight::WeightCache;

/// Append-only tangle: admitted transactions plus the indexes derived from them.
///
/// All mutation goes through [`TangleStore::admit`], which takes the write
/// lock for the whole update, so readers holding a [`TangleView`] never see a
/// half-applied admission.
pub struct TangleStore {
    state: RwLock<TangleState>,
    weights: WeightCache,
}

/// Indexed tangle contents. Reached through a [`TangleView`].
#[derive(Default)]
pub struct TangleState {
    transactions: HashMap<TryteHash, Arc<Transaction>>,
    approvers: HashMap<TryteHash, HashSet<TryteHash>>,
    bundles: HashMap<BundleHash, Vec<TryteHash>>,
    addresses: HashMap<Address, Vec<TryteHash>>,
    tips: HashSet<TryteHash>,
    entry_points: HashSet<TryteHash>,
    ledger: SnapshotState,
    version: u64,
    no_approvers: HashSet<TryteHash>,
}

/// A pinned, consistent read view of the store. Admissions wait until every
/// view is dropped.
pub struct TangleView<'a> {
    state: RwLockReadGuard<'a, TangleState>,
    weights: &'a WeightCache,
}

impl TangleState {
    pub fn get(&self, hash: &TryteHash) -> Result<&Arc<Transaction>> {
        self.transactions.get(hash).ok_or(TangleError::NotFound(*hash))
    }

    pub fn contains(&self, hash: &TryteHash) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Direct approvers; empty for a tip, for unknown hashes too.
    pub fn approvers(&self, hash: &TryteHash) -> &HashSet<TryteHash> {
        self.approvers.get(hash).unwrap_or(&self.no_approvers)
    }

    /// Null hash or a solid entry point: valid reference, not a transaction.
    pub fn is_boundary(&self, hash: &TryteHash) -> bool {
        hash.is_null() || self.entry_points.contains(hash)
    }

    pub fn is_reference_target(&self, hash: &TryteHash) -> bool {
        self.is_boundary(hash) || self.contains(hash)
    }

    pub fn is_entry_point(&self, hash: &TryteHash) -> bool {
        self.entry_points.contains(hash)
    }

    pub fn entry_points(&self) -> &HashSet<TryteHash> {
        &self.entry_points
    }

    /// Current tips, sorted for stable output.
    pub fn tips(&self) -> Vec<TryteHash> {
        let mut tips: Vec<_> = self.tips.iter().copied().collect();
        tips.sort();
        tips
    }

    pub fn is_tip(&self, hash: &TryteHash) -> bool {
        self.tips.contains(hash)
    }

    pub fn bundle_members(&self, bundle: &BundleHash) -> Vec<Arc<Transaction>> {
        self.bundles
            .get(bundle)
            .map(|hashes| hashes.iter().filter_map(|h| self.transactions.get(h).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn bundle(&self, bundle: &BundleHash) -> Result<Bundle> {
        let members = self.bundle_members(bundle);
        Bundle::collect(*bundle, members.iter().map(|t| t.as_ref()))
    }

    pub fn by_address(&self, address: &Address) -> Vec<TryteHash> {
        self.addresses.get(address).cloned().unwrap_or_default()
    }

    /// An admitted transaction has spent from `address`.
    pub fn was_spent_from(&self, address: &Address) -> bool {
        self.addresses
            .get(address)
            .into_iter()
            .flatten()
            .filter_map(|h| self.transactions.get(h))
            .any(|tx| tx.value < 0)
    }

    /// Balances the snapshot vouches for at the pruning boundary.
    pub fn ledger(&self) -> &SnapshotState {
        &self.ledger
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Bumped on every admission.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn hashes(&self) -> impl Iterator<Item = &TryteHash> {
        self.transactions.keys()
    }
}

impl<'a> Deref for TangleView<'a> {
    type Target = TangleState;

    fn deref(&self) -> &TangleState {
        &self.state
    }
}

impl<'a> TangleView<'a> {
    pub fn weights(&self) -> &'a WeightCache {
        self.weights
    }
}

impl TangleStore {
    /// Empty store; `weight_window` bounds the cache maintenance walk on admit.
    pub fn new(weight_window: usize) -> Self {
        Self {
            state: RwLock::new(TangleState::default()),
            weights: WeightCache::new(weight_window),
        }
    }

    pub fn with_snapshot(snapshot: Snapshot, weight_window: usize) -> Self {
        let store = Self::new(weight_window);
        store.seed(snapshot);
        store
    }

    /// Install a snapshot's ledger state and solid entry points.
    pub fn seed(&self, snapshot: Snapshot) {
        let mut state = self.state.write();
        info!(
            index = snapshot.state.index,
            entry_points = snapshot.solid_entry_points.len(),
            addresses = snapshot.state.balances.len(),
            "seeding tangle from snapshot"
        );
        state.entry_points.extend(snapshot.solid_entry_points);
        state.ledger = snapshot.state;
        state.version += 1;
        self.weights.clear();
    }

    pub fn read(&self) -> TangleView<'_> {
        TangleView {
            state: self.state.read(),
            weights: &self.weights,
        }
    }

    /// Insert a transaction whose trunk and branch are already known.
    ///
    /// Fails with `Duplicate` for a known hash and `DanglingReference` for a
    /// missing parent; in both cases the store is untouched.
    pub fn admit(&self, tx: Transaction) -> Result<Arc<Transaction>> {
        self.admit_checked(tx, |_, _| Ok(()))
    }

    /// Like [`TangleStore::admit`], but `check` runs against the state under
    /// the write lock once the parents are known. An error from `check`
    /// leaves the store untouched.
    pub fn admit_checked<F>(&self, tx: Transaction, check: F) -> Result<Arc<Transaction>>
    where
        F: FnOnce(&TangleState, &Transaction) -> Result<()>,
    {
        let mut state = self.state.write();

        if state.transactions.contains_key(&tx.hash) {
            return Err(TangleError::Duplicate(tx.hash));
        }
        for parent in tx.parents() {
            if !state.is_reference_target(&parent) {
                return Err(TangleError::DanglingReference {
                    hash: tx.hash,
                    missing: parent,
                });
            }
        }
        check(&state, &tx)?;

        let tx = Arc::new(tx);
        let hash = tx.hash;
        state.transactions.insert(hash, tx.clone());
        for parent in tx.parents() {
            state.approvers.entry(parent).or_default().insert(hash);
            state.tips.remove(&parent);
        }
        state.tips.insert(hash);
        state.bundles.entry(tx.bundle).or_default().push(hash);
        state.addresses.entry(tx.address).or_default().push(hash);
        state.version += 1;

        self.weights.record_admission(&state, &tx);

        debug!(
            hash = %hash.short(),
            trunk = %tx.trunk.short(),
            branch = %tx.branch.short(),
            "admitted transaction"
        );
        Ok(tx)
    }

    pub fn get(&self, hash: &TryteHash) -> Result<Arc<Transaction>> {
        self.read().get(hash).cloned()
    }

    pub fn approvers(&self, hash: &TryteHash) -> HashSet<TryteHash> {
        self.read().approvers(hash).clone()
    }

    pub fn contains(&self, hash: &TryteHash) -> bool {
        self.read().contains(hash)
    }

    pub fn tips(&self) -> Vec<TryteHash> {
        self.read().tips()
    }

    pub fn was_spent_from(&self, address: &Address) -> bool {
        self.read().was_spent_from(address)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn weights(&self) -> &WeightCache {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::transaction::TransactionBuilder;

    fn tx(tag: &str, trunk: TryteHash, branch: TryteHash) -> Transaction {
        TransactionBuilder::new().tag(tag).timestamp(1).parents(trunk, branch).build().unwrap()
    }

    #[test]
    fn admit_updates_approvers_and_tips() {
        let store = TangleStore::new(1_000);
        let a = store.admit(tx("A", TryteHash::NULL, TryteHash::NULL)).unwrap();
        assert!(store.approvers(&a.hash).is_empty());
        assert_eq!(store.tips(), vec![a.hash]);

        let b = store.admit(tx("B", a.hash, a.hash)).unwrap();
        assert_eq!(store.approvers(&a.hash), HashSet::from([b.hash]));
        assert_eq!(store.tips(), vec![b.hash]);
        assert_eq!(store.get(&b.hash).unwrap().trunk, a.hash);
    }

    #[test]
    fn duplicate_is_rejected() {
        let store = TangleStore::new(1_000);
        let t = tx("A", TryteHash::NULL, TryteHash::NULL);
        store.admit(t.clone()).unwrap();
        assert_eq!(store.admit(t.clone()), Err(TangleError::Duplicate(t.hash)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn spent_addresses() {
        let store = TangleStore::new(1_000);
        let sender = TryteHash::label("SENDER").unwrap();
        let receiver = TryteHash::label("RECEIVER").unwrap();
        let credit = TransactionBuilder::new().address(receiver).value(7).index(1, 1).timestamp(1);
        store.admit(credit.build().unwrap()).unwrap();
        assert!(!store.was_spent_from(&receiver));
        assert!(!store.was_spent_from(&sender));

        let debit = TransactionBuilder::new()
            .address(sender)
            .value(-7)
            .signature_fragment("SIG")
            .index(0, 1)
            .timestamp(1);
        store.admit(debit.build().unwrap()).unwrap();
        assert!(store.was_spent_from(&sender));
        assert!(!store.was_spent_from(&receiver));
    }

    #[test]
    fn failed_check_leaves_store_untouched() {
        let store = TangleStore::new(1_000);
        let t = tx("A", TryteHash::NULL, TryteHash::NULL);
        let reject = |_: &TangleState, tx: &Transaction| {
            Err(TangleError::malformed(format!("reject {}", tx.hash.short())))
        };
        let err = store.admit_checked(t, reject).unwrap_err();
        assert!(matches!(err, TangleError::MalformedTransaction(_)));
        assert!(store.is_empty());
        assert_eq!(store.read().version(), 0);
        assert!(store.tips().is_empty());
    }

    #[test]
    fn entry_points_are_valid_references() {
        let ep = TryteHash::label("PRUNED").unwrap();
        let snapshot = Snapshot::new(SnapshotState::default(), [ep]);
        let store = TangleStore::with_snapshot(snapshot, 1_000);
        let t = store.admit(tx("A", ep, TryteHash::NULL)).unwrap();
        assert!(store.read().is_boundary(&ep));
        assert_eq!(store.approvers(&ep), HashSet::from([t.hash]));
        assert!(matches!(store.get(&ep), Err(TangleError::NotFound(_))));
    }
}
