// src/dag/transaction.rs
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::hash::{Address, BundleHash, TryteHash, HASH_TRYTES};
use super::trytes::{int_to_trytes, is_trytes_of_len, pad_trytes, trytes_to_int};
use crate::error::{Result, TangleError};

pub const SIGNATURE_FRAGMENT_TRYTES: usize = 2187;
pub const VALUE_TRYTES: usize = 27;
pub const TAG_TRYTES: usize = 27;
pub const TIMESTAMP_TRYTES: usize = 9;
pub const INDEX_TRYTES: usize = 9;
pub const NONCE_TRYTES: usize = 27;

/// Fixed width of a raw transaction payload.
pub const TRANSACTION_TRYTES: usize = SIGNATURE_FRAGMENT_TRYTES
    + HASH_TRYTES // address
    + VALUE_TRYTES
    + TAG_TRYTES // obsolete tag
    + TIMESTAMP_TRYTES
    + 2 * INDEX_TRYTES
    + 3 * HASH_TRYTES // bundle, trunk, branch
    + TAG_TRYTES
    + 3 * TIMESTAMP_TRYTES // attachment timestamp + bounds
    + NONCE_TRYTES;

/// Largest value a 9-tryte timestamp field can hold.
pub const MAX_TIMESTAMP: i64 = (3i64.pow(27) - 1) / 2;

/// Total token supply; no balance or value may exceed it.
pub const SUPPLY: i64 = 2_779_530_283_277_761;

/// An admitted (or candidate) transaction. Parsed fields mirror `trytes`,
/// which is the raw payload the hash was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TryteHash,
    pub signature_fragment: String,
    pub address: Address,
    pub value: i64,
    pub obsolete_tag: String,
    pub timestamp: u64,
    pub current_index: u64,
    pub last_index: u64,
    pub bundle: BundleHash,
    pub trunk: TryteHash,
    pub branch: TryteHash,
    pub tag: String,
    pub attachment_timestamp: u64,
    pub attachment_timestamp_lower: u64,
    pub attachment_timestamp_upper: u64,
    pub nonce: String,
    pub trytes: String,
}

/// Sequential reader over the fixed-width payload layout.
struct FieldCursor<'a> {
    raw: &'a str,
    offset: usize,
}

impl<'a> FieldCursor<'a> {
    fn take(&mut self, len: usize) -> &'a str {
        let field = &self.raw[self.offset..self.offset + len];
        self.offset += len;
        field
    }

    fn hash(&mut self) -> Result<TryteHash> {
        TryteHash::parse(self.take(HASH_TRYTES))
    }

    fn unsigned(&mut self, len: usize, name: &str) -> Result<u64> {
        let v = trytes_to_int(self.take(len))?;
        u64::try_from(v).map_err(|_| TangleError::malformed(format!("negative {} ({})", name, v)))
    }
}

impl Transaction {
    /// Parse a raw payload and derive its hash.
    pub fn from_trytes(raw: &str) -> Result<Self> {
        if !is_trytes_of_len(raw, TRANSACTION_TRYTES) {
            return Err(TangleError::malformed(format!(
                "payload must be {} trytes, got {} characters",
                TRANSACTION_TRYTES,
                raw.len()
            )));
        }
        let mut cur = FieldCursor { raw, offset: 0 };
        let signature_fragment = cur.take(SIGNATURE_FRAGMENT_TRYTES).to_string();
        let address = cur.hash()?;
        let value = trytes_to_int(cur.take(VALUE_TRYTES))?;
        let obsolete_tag = cur.take(TAG_TRYTES).to_string();
        let timestamp = cur.unsigned(TIMESTAMP_TRYTES, "timestamp")?;
        let current_index = cur.unsigned(INDEX_TRYTES, "current index")?;
        let last_index = cur.unsigned(INDEX_TRYTES, "last index")?;
        let bundle = cur.hash()?;
        let trunk = cur.hash()?;
        let branch = cur.hash()?;
        let tag = cur.take(TAG_TRYTES).to_string();
        let attachment_timestamp = cur.unsigned(TIMESTAMP_TRYTES, "attachment timestamp")?;
        let attachment_timestamp_lower = cur.unsigned(TIMESTAMP_TRYTES, "attachment lower bound")?;
        let attachment_timestamp_upper = cur.unsigned(TIMESTAMP_TRYTES, "attachment upper bound")?;
        let nonce = cur.take(NONCE_TRYTES).to_string();

        Ok(Transaction {
            hash: TryteHash::digest(raw.as_bytes()),
            signature_fragment,
            address,
            value,
            obsolete_tag,
            timestamp,
            current_index,
            last_index,
            bundle,
            trunk,
            branch,
            tag,
            attachment_timestamp,
            attachment_timestamp_lower,
            attachment_timestamp_upper,
            nonce,
            trytes: raw.to_string(),
        })
    }

    /// Hash recomputed from the raw payload.
    pub fn content_hash(&self) -> TryteHash {
        TryteHash::digest(self.trytes.as_bytes())
    }

    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }

    /// The two transactions this one approves.
    pub fn parents(&self) -> [TryteHash; 2] {
        [self.trunk, self.branch]
    }
}

/// Assembles a transaction payload from fields. Unset fields are blank (`9`s).
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    signature_fragment: String,
    address: Address,
    value: i64,
    obsolete_tag: String,
    timestamp: u64,
    current_index: u64,
    last_index: u64,
    bundle: BundleHash,
    trunk: TryteHash,
    branch: TryteHash,
    tag: String,
    attachment_timestamp: u64,
    nonce: String,
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self {
            signature_fragment: String::new(),
            address: TryteHash::NULL,
            value: 0,
            obsolete_tag: String::new(),
            timestamp: Utc::now().timestamp().max(0) as u64,
            current_index: 0,
            last_index: 0,
            bundle: TryteHash::NULL,
            trunk: TryteHash::NULL,
            branch: TryteHash::NULL,
            tag: String::new(),
            attachment_timestamp: 0,
            nonce: String::new(),
        }
    }
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn value(mut self, value: i64) -> Self {
        self.value = value;
        self
    }

    pub fn signature_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.signature_fragment = fragment.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn obsolete_tag(mut self, tag: impl Into<String>) -> Self {
        self.obsolete_tag = tag.into();
        self
    }

    pub fn timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Position `current` in a bundle of `last + 1` transactions.
    pub fn index(mut self, current: u64, last: u64) -> Self {
        self.current_index = current;
        self.last_index = last;
        self
    }

    pub fn bundle(mut self, bundle: BundleHash) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn trunk(mut self, trunk: TryteHash) -> Self {
        self.trunk = trunk;
        self
    }

    pub fn branch(mut self, branch: TryteHash) -> Self {
        self.branch = branch;
        self
    }

    pub fn parents(self, trunk: TryteHash, branch: TryteHash) -> Self {
        self.trunk(trunk).branch(branch)
    }

    pub fn attachment_timestamp(mut self, ts: u64) -> Self {
        self.attachment_timestamp = ts;
        self
    }

    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = nonce.into();
        self
    }

    pub fn to_trytes(&self) -> Result<String> {
        let to_i64 = |v: u64| {
            i64::try_from(v).map_err(|_| TangleError::malformed(format!("{} out of range", v)))
        };
        let mut out = String::with_capacity(TRANSACTION_TRYTES);
        out.push_str(&pad_trytes(&self.signature_fragment, SIGNATURE_FRAGMENT_TRYTES)?);
        out.push_str(self.address.as_str());
        out.push_str(&int_to_trytes(self.value, VALUE_TRYTES)?);
        out.push_str(&pad_trytes(&self.obsolete_tag, TAG_TRYTES)?);
        out.push_str(&int_to_trytes(to_i64(self.timestamp)?, TIMESTAMP_TRYTES)?);
        out.push_str(&int_to_trytes(to_i64(self.current_index)?, INDEX_TRYTES)?);
        out.push_str(&int_to_trytes(to_i64(self.last_index)?, INDEX_TRYTES)?);
        out.push_str(self.bundle.as_str());
        out.push_str(self.trunk.as_str());
        out.push_str(self.branch.as_str());
        out.push_str(&pad_trytes(&self.tag, TAG_TRYTES)?);
        out.push_str(&int_to_trytes(to_i64(self.attachment_timestamp)?, TIMESTAMP_TRYTES)?);
        out.push_str(&int_to_trytes(0, TIMESTAMP_TRYTES)?);
        out.push_str(&int_to_trytes(MAX_TIMESTAMP, TIMESTAMP_TRYTES)?);
        out.push_str(&pad_trytes(&self.nonce, NONCE_TRYTES)?);
        Ok(out)
    }

    pub fn build(&self) -> Result<Transaction> {
        Transaction::from_trytes(&self.to_trytes()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_width_matches_layout() {
        assert_eq!(TRANSACTION_TRYTES, 2673);
    }

    #[test]
    fn builder_fields_survive_parsing() {
        let addr = TryteHash::label("TEST9TRANSACTION").unwrap();
        let bundle = TryteHash::label("BUNDLE").unwrap();
        let trunk = TryteHash::label("TRUNK").unwrap();
        let tx = TransactionBuilder::new()
            .address(addr)
            .value(-100)
            .signature_fragment("SIG")
            .timestamp(1_550_000_000)
            .index(1, 3)
            .bundle(bundle)
            .parents(trunk, TryteHash::NULL)
            .tag("IOTA")
            .build()
            .unwrap();

        assert_eq!(tx.trytes.len(), TRANSACTION_TRYTES);
        assert_eq!(tx.address, addr);
        assert_eq!(tx.value, -100);
        assert_eq!(tx.timestamp, 1_550_000_000);
        assert_eq!((tx.current_index, tx.last_index), (1, 3));
        assert_eq!(tx.bundle, bundle);
        assert_eq!(tx.parents(), [trunk, TryteHash::NULL]);
        assert!(tx.tag.starts_with("IOTA"));
        assert!(!tx.is_tail());
        assert_eq!(tx.hash, tx.content_hash());
    }

    #[test]
    fn all_nines_payload_parses_as_null_transaction() {
        let tx = Transaction::from_trytes(&"9".repeat(TRANSACTION_TRYTES)).unwrap();
        assert_eq!(tx.value, 0);
        assert!(tx.address.is_null());
        assert!(tx.trunk.is_null() && tx.branch.is_null());
    }

    #[test]
    fn short_or_invalid_payload_is_malformed() {
        let err = Transaction::from_trytes("ABC").unwrap_err();
        assert!(matches!(err, TangleError::MalformedTransaction(_)));
        let mut raw = "9".repeat(TRANSACTION_TRYTES - 1);
        raw.push('x');
        assert!(Transaction::from_trytes(&raw).is_err());
    }
}
