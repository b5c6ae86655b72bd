// src/mempool.rs
use crate::dag::hash::TryteHash;
use crate::dag::store::TangleStore;
use crate::dag::transaction::Transaction;
use crate::dag::validation::{BundleContext, LedgerValidator};
use crate::error::{Result, TangleError};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// Outcome of handing a transaction to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Admitted together with this many transactions in total, parked
    /// children included.
    Admitted(usize),
    /// Waiting for a trunk or branch that has not arrived yet.
    Parked,
    AlreadyKnown,
}

/// Front door for transactions arriving in any order: validates, admits, and
/// parks transactions whose parents are still missing.
#[derive(Clone)]
pub struct PendingPool {
    store: Arc<TangleStore>,
    validator: LedgerValidator,
    inner: Arc<Mutex<Parked>>,
    capacity: usize,
}

struct ParkedTx {
    seq: u64,
    missing: TryteHash,
    tx: Transaction,
}

#[derive(Default)]
struct Parked {
    entries: HashMap<TryteHash, ParkedTx>,
    /// missing hash -> transactions waiting on it
    waiting: HashMap<TryteHash, Vec<TryteHash>>,
    /// park sequence -> hash, oldest first
    order: BTreeMap<u64, TryteHash>,
    seq: u64,
}

impl Parked {
    fn park(&mut self, tx: Transaction, missing: TryteHash, capacity: usize) {
        if self.entries.contains_key(&tx.hash) {
            return;
        }
        while self.entries.len() >= capacity.max(1) {
            let Some((_, oldest)) = self.order.pop_first() else { break };
            if self.remove(&oldest).is_some() {
                warn!("pending pool full ({}), evicted {}", capacity, oldest.short());
            }
        }
        self.seq += 1;
        self.order.insert(self.seq, tx.hash);
        self.waiting.entry(missing).or_default().push(tx.hash);
        self.entries.insert(tx.hash, ParkedTx {
            seq: self.seq,
            missing,
            tx,
        });
    }

    /// Drops every trace of `hash` from the bookkeeping.
    fn remove(&mut self, hash: &TryteHash) -> Option<ParkedTx> {
        let parked = self.entries.remove(hash)?;
        self.order.remove(&parked.seq);
        if let Some(children) = self.waiting.get_mut(&parked.missing) {
            children.retain(|c| c != hash);
            if children.is_empty() {
                self.waiting.remove(&parked.missing);
            }
        }
        Some(parked)
    }

    fn take_waiting(&mut self, parent: &TryteHash) -> Vec<Transaction> {
        let children = self.waiting.remove(parent).unwrap_or_default();
        children.iter().filter_map(|h| self.remove(h)).map(|p| p.tx).collect()
    }
}

impl PendingPool {
    /// `capacity` bounds the number of parked transactions.
    pub fn new(store: Arc<TangleStore>, capacity: usize) -> Self {
        PendingPool {
            store,
            validator: LedgerValidator::new(),
            inner: Arc::new(Mutex::new(Parked::default())),
            capacity,
        }
    }

    /// Validate and admit `tx`, then retry everything that was waiting on it.
    ///
    /// Structural and bundle-balance failures are returned as errors; the
    /// transaction is dropped.
    pub fn submit(&self, tx: Transaction) -> Result<Submission> {
        if self.store.contains(&tx.hash) {
            return Ok(Submission::AlreadyKnown);
        }
        if self.is_parked(&tx.hash) {
            return Ok(Submission::Parked);
        }
        self.validator.validate_structure(&tx)?;

        let hash = tx.hash;
        match self.admit_one(tx) {
            Ok(false) => Ok(Submission::Parked),
            Ok(true) => {
                let admitted = 1 + self.retry_children(hash);
                if admitted > 1 {
                    info!(
                        "{} admitted, released {} parked transaction(s)",
                        hash.short(),
                        admitted - 1
                    );
                }
                Ok(Submission::Admitted(admitted))
            }
            Err(TangleError::Duplicate(_)) => Ok(Submission::AlreadyKnown),
            Err(e) => Err(e),
        }
    }

    /// `Ok(true)` when admitted, `Ok(false)` when parked. The bundle check
    /// runs under the store's write lock, so two members of one bundle can
    /// never both pass against a stale view.
    fn admit_one(&self, tx: Transaction) -> Result<bool> {
        let validator = &self.validator;
        let admitted = self.store.admit_checked(tx.clone(), |state, tx| {
            validator.validate_bundle(tx, &BundleContext::from_view(state, &tx.bundle))
        });

        match admitted {
            Ok(_) => Ok(true),
            Err(TangleError::DanglingReference { missing, .. }) => {
                debug!("parking {} until {} arrives", tx.hash.short(), missing.short());
                self.inner.lock().park(tx, missing, self.capacity);
                // the parent may have landed between admit and park
                if self.store.contains(&missing) {
                    self.retry_children(missing);
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Admit parked descendants of `parent`, transitively. Returns how many
    /// were admitted.
    fn retry_children(&self, parent: TryteHash) -> usize {
        let mut admitted = 0;
        let mut queue = VecDeque::from([parent]);
        while let Some(hash) = queue.pop_front() {
            let children = self.inner.lock().take_waiting(&hash);
            for child in children {
                let child_hash = child.hash;
                match self.admit_one(child) {
                    Ok(true) => {
                        admitted += 1;
                        queue.push_back(child_hash);
                    }
                    Ok(false) | Err(TangleError::Duplicate(_)) => {}
                    Err(e) => warn!("dropping parked transaction {}: {}", child_hash.short(), e),
                }
            }
        }
        admitted
    }

    pub fn is_parked(&self, hash: &TryteHash) -> bool {
        self.inner.lock().entries.contains_key(hash)
    }

    /// Number of parked transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hashes parked transactions are waiting for, sorted.
    pub fn missing(&self) -> Vec<TryteHash> {
        let mut missing: Vec<_> = self.inner.lock().waiting.keys().copied().collect();
        missing.sort();
        missing
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
    fn child_waits_for_parent() {
        let store = Arc::new(TangleStore::new(1_000));
        let pool = PendingPool::new(store.clone(), 10);
        let parent = tx("PARENT", TryteHash::NULL, TryteHash::NULL);
        let child = tx("CHILD", parent.hash, parent.hash);

        assert_eq!(pool.submit(child.clone()).unwrap(), Submission::Parked);
        assert_eq!(pool.submit(child.clone()).unwrap(), Submission::Parked);
        assert_eq!(pool.missing(), vec![parent.hash]);
        assert!(!store.contains(&child.hash));

        assert_eq!(pool.submit(parent.clone()).unwrap(), Submission::Admitted(2));
        assert!(store.contains(&child.hash));
        assert!(pool.is_empty());
        assert_eq!(pool.submit(child).unwrap(), Submission::AlreadyKnown);
    }

    #[test]
    fn eviction_drops_oldest() {
        let store = Arc::new(TangleStore::new(1_000));
        let pool = PendingPool::new(store, 2);
        let missing = TryteHash::label("MISSING").unwrap();
        let first = tx("FIRST", missing, missing);
        let second = tx("SECOND", missing, missing);
        let third = tx("THIRD", missing, missing);
        for t in [&first, &second, &third] {
            pool.submit(t.clone()).unwrap();
        }
        assert_eq!(pool.len(), 2);
        assert!(!pool.is_parked(&first.hash));
        assert!(pool.is_parked(&third.hash));
    }

    #[test]
    fn eviction_forgets_waiting_children() {
        let store = Arc::new(TangleStore::new(1_000));
        let pool = PendingPool::new(store, 5);
        let missing = TryteHash::label("NEVER").unwrap();
        for i in 0..200 {
            let tag = crate::dag::trytes::int_to_trytes(i, 3).unwrap();
            assert_eq!(pool.submit(tx(&tag, missing, missing)).unwrap(), Submission::Parked);
        }
        let inner = pool.inner.lock();
        assert_eq!(inner.entries.len(), 5);
        assert_eq!(inner.order.len(), 5);
        assert_eq!(inner.waiting[&missing].len(), 5);
    }

    #[test]
    fn released_children_leave_no_bookkeeping() {
        let store = Arc::new(TangleStore::new(1_000));
        let pool = PendingPool::new(store, 10);
        let parent = tx("PARENT", TryteHash::NULL, TryteHash::NULL);
        let lonely = TryteHash::label("LONELY").unwrap();
        pool.submit(tx("LEFT", parent.hash, parent.hash)).unwrap();
        pool.submit(tx("RIGHT", parent.hash, TryteHash::NULL)).unwrap();
        pool.submit(tx("STUCK", lonely, lonely)).unwrap();

        assert_eq!(pool.submit(parent).unwrap(), Submission::Admitted(3));
        let inner = pool.inner.lock();
        assert_eq!(inner.entries.len(), 1);
        assert_eq!(inner.order.len(), 1);
        assert_eq!(inner.waiting.keys().collect::<Vec<_>>(), vec![&lonely]);
    }

    #[test]
    fn malformed_transaction_is_rejected() {
        let store = Arc::new(TangleStore::new(1_000));
        let pool = PendingPool::new(store.clone(), 10);
        let mut bad = tx("BAD", TryteHash::NULL, TryteHash::NULL);
        bad.value = 5;
        assert!(matches!(pool.submit(bad), Err(TangleError::MalformedTransaction(_))));
        assert!(store.is_empty());
    }
}
