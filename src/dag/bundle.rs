// src/dag/bundle.rs
use std::collections::BTreeMap;

use super::hash::{Address, BundleHash, TryteHash};
use super::transaction::Transaction;
use crate::error::{Result, TangleError};

/// One position of a bundle. Reattachments share a slot: same index, same
/// address and value, different hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSlot {
    pub address: Address,
    pub value: i64,
    pub hashes: Vec<TryteHash>,
}

/// Transactions sharing a bundle hash, keyed by `current_index`.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub hash: BundleHash,
    last_index: Option<u64>,
    slots: BTreeMap<u64, BundleSlot>,
}

impl Bundle {
    pub fn new(hash: BundleHash) -> Self {
        Self {
            hash,
            last_index: None,
            slots: BTreeMap::new(),
        }
    }

    pub fn collect<'a, I>(hash: BundleHash, members: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut bundle = Self::new(hash);
        for tx in members {
            bundle.insert(tx)?;
        }
        Ok(bundle)
    }

    /// Adds a member, rejecting disagreement on `last_index` or on the
    /// content of an already occupied slot.
    pub fn insert(&mut self, tx: &Transaction) -> Result<()> {
        if tx.bundle != self.hash {
            return Err(TangleError::malformed(format!(
                "transaction {} belongs to bundle {}, not {}",
                tx.hash.short(),
                tx.bundle.short(),
                self.hash.short()
            )));
        }
        match self.last_index {
            Some(last) if last != tx.last_index => {
                return Err(TangleError::malformed(format!(
                    "bundle {} members disagree on last index ({} vs {})",
                    self.hash.short(),
                    last,
                    tx.last_index
                )));
            }
            _ => self.last_index = Some(tx.last_index),
        }

        let slot = self.slots.entry(tx.current_index).or_insert_with(|| BundleSlot {
            address: tx.address,
            value: tx.value,
            hashes: Vec::new(),
        });
        if slot.address != tx.address || slot.value != tx.value {
            return Err(TangleError::malformed(format!(
                "bundle {} has conflicting transactions at index {}",
                self.hash.short(),
                tx.current_index
            )));
        }
        if !slot.hashes.contains(&tx.hash) {
            slot.hashes.push(tx.hash);
        }
        Ok(())
    }

    pub fn last_index(&self) -> Option<u64> {
        self.last_index
    }

    /// Every index `0..=last_index` is occupied.
    pub fn is_complete(&self) -> bool {
        match self.last_index {
            Some(last) => (0..=last).all(|i| self.slots.contains_key(&i)),
            None => false,
        }
    }

    /// Sum of values, one per slot.
    pub fn sum(&self) -> i64 {
        let total: i128 = self.slots.values().map(|s| s.value as i128).sum();
        total.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    pub fn slots(&self) -> impl Iterator<Item = (&u64, &BundleSlot)> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::transaction::TransactionBuilder;
    use crate::dag::trytes::tryte_char;

    fn member(bundle: BundleHash, index: u64, last: u64, value: i64) -> Transaction {
        TransactionBuilder::new()
            .bundle(bundle)
            .address(TryteHash::label(&format!("ADDR{}", tryte_char(index as i8))).unwrap())
            .value(value)
            .index(index, last)
            .timestamp(1)
            .build()
            .unwrap()
    }

    #[test]
    fn completeness_and_sum() {
        let h = TryteHash::label("TRANSFER").unwrap();
        let a = member(h, 0, 1, 50);
        let b = member(h, 1, 1, -50);

        let partial = Bundle::collect(h, [&a]).unwrap();
        assert!(!partial.is_complete());

        let full = Bundle::collect(h, [&a, &b]).unwrap();
        assert!(full.is_complete());
        assert_eq!(full.sum(), 0);
        assert_eq!(full.len(), 2);
    }

    #[test]
    fn disagreeing_last_index_is_malformed() {
        let h = TryteHash::label("TRANSFER").unwrap();
        let a = member(h, 0, 1, 50);
        let b = member(h, 1, 2, -50);
        assert!(matches!(
            Bundle::collect(h, [&a, &b]),
            Err(TangleError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn conflicting_slot_is_malformed() {
        let h = TryteHash::label("TRANSFER").unwrap();
        let a = member(h, 0, 0, 50);
        let b = member(h, 0, 0, 60);
        assert!(Bundle::collect(h, [&a, &b]).is_err());
    }
}
