// src/dag/validation.rs
use std::sync::Arc;

use super::bundle::Bundle;
use super::hash::{BundleHash, HASH_TRYTES};
use super::store::TangleState;
use super::transaction::{Transaction, MAX_TIMESTAMP, SUPPLY, TRANSACTION_TRYTES};
use super::trytes::{is_blank, is_trytes_of_len};
use crate::error::{Result, TangleError};

/// The other members of a transaction's bundle, as far as they are known.
#[derive(Debug, Clone, Default)]
pub struct BundleContext {
    members: Vec<Arc<Transaction>>,
}

impl BundleContext {
    pub fn new(members: Vec<Arc<Transaction>>) -> Self {
        Self { members }
    }

    /// Members already admitted to the store.
    pub fn from_view(state: &TangleState, bundle: &BundleHash) -> Self {
        Self { members: state.bundle_members(bundle) }
    }

    pub fn members(&self) -> &[Arc<Transaction>] {
        &self.members
    }
}

/// Gatekeeper for admission: structural checks on a single transaction and
/// the zero-sum rule once its bundle is complete.
#[derive(Debug, Clone, Default)]
pub struct LedgerValidator;

impl LedgerValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, tx: &Transaction, bundle: &BundleContext) -> Result<()> {
        self.validate_structure(tx)?;
        self.validate_bundle(tx, bundle)
    }

    pub fn validate_structure(&self, tx: &Transaction) -> Result<()> {
        if !is_trytes_of_len(&tx.trytes, TRANSACTION_TRYTES) {
            return Err(TangleError::malformed(format!(
                "payload of {} must be {} trytes",
                tx.hash.short(),
                TRANSACTION_TRYTES
            )));
        }
        for (name, id) in [
            ("hash", &tx.hash),
            ("address", &tx.address),
            ("bundle", &tx.bundle),
            ("trunk", &tx.trunk),
            ("branch", &tx.branch),
        ] {
            if !is_trytes_of_len(id.as_str(), HASH_TRYTES) {
                return Err(TangleError::malformed(format!(
                    "{} is not a {}-tryte identifier",
                    name, HASH_TRYTES
                )));
            }
        }
        if tx.content_hash() != tx.hash {
            return Err(TangleError::malformed(format!(
                "hash {} does not match payload",
                tx.hash.short()
            )));
        }
        // parsed fields must agree with the payload they claim to come from
        let reparsed = Transaction::from_trytes(&tx.trytes)?;
        if &reparsed != tx {
            return Err(TangleError::malformed(format!(
                "fields of {} do not match its payload",
                tx.hash.short()
            )));
        }
        if tx.current_index > tx.last_index {
            return Err(TangleError::malformed(format!(
                "current index {} exceeds last index {}",
                tx.current_index, tx.last_index
            )));
        }
        if tx.value.unsigned_abs() > SUPPLY as u64 {
            return Err(TangleError::malformed(format!("value {} exceeds total supply", tx.value)));
        }
        if tx.timestamp > MAX_TIMESTAMP as u64 {
            return Err(TangleError::malformed(format!("timestamp {} out of range", tx.timestamp)));
        }
        if tx.value < 0 && is_blank(&tx.signature_fragment) {
            return Err(TangleError::malformed(format!(
                "spending transaction {} carries no signature fragment",
                tx.hash.short()
            )));
        }
        Ok(())
    }

    /// Zero-sum check, only once every index of the bundle is present.
    pub fn validate_bundle(&self, tx: &Transaction, context: &BundleContext) -> Result<()> {
        let others = context.members.iter().map(|m| m.as_ref()).filter(|m| m.hash != tx.hash);
        let bundle = Bundle::collect(tx.bundle, others.chain(std::iter::once(tx)))?;
        if bundle.is_complete() {
            let sum = bundle.sum();
            if sum != 0 {
                return Err(TangleError::BundleBalance {
                    bundle: tx.bundle,
                    sum,
                });
            }
        }
        Ok(())
    }
}
