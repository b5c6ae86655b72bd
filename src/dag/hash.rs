// src/dag/hash.rs
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use super::trytes::{is_trytes_of_len, TRYTE_ALPHABET};
use crate::error::{Result, TangleError};

pub const HASH_TRYTES: usize = 81;

/// 81-tryte identifier used for transaction hashes, addresses and bundles.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TryteHash([u8; HASH_TRYTES]);

pub type Address = TryteHash;
pub type BundleHash = TryteHash;

impl TryteHash {
    /// The genesis / null reference.
    pub const NULL: TryteHash = TryteHash([b'9'; HASH_TRYTES]);

    pub fn parse(s: &str) -> Result<Self> {
        if !is_trytes_of_len(s, HASH_TRYTES) {
            return Err(TangleError::malformed(format!(
                "'{}' is not a {}-tryte identifier",
                s, HASH_TRYTES
            )));
        }
        let mut out = [0u8; HASH_TRYTES];
        out.copy_from_slice(s.as_bytes());
        Ok(TryteHash(out))
    }

    /// Pads a short readable label with `9`s, e.g. `TryteHash::label("ALICE")`.
    pub fn label(prefix: &str) -> Result<Self> {
        Self::parse(&super::trytes::pad_trytes(prefix, HASH_TRYTES)?)
    }

    /// Content hash of a tryte payload: SHA-256 blocks over `counter || payload`,
    /// each output byte folded onto the tryte alphabet.
    pub fn digest(payload: &[u8]) -> Self {
        let mut out = [0u8; HASH_TRYTES];
        let mut filled = 0;
        let mut counter = 0u8;
        while filled < HASH_TRYTES {
            let mut hasher = Sha256::new();
            hasher.update([counter]);
            hasher.update(payload);
            for byte in hasher.finalize() {
                if filled == HASH_TRYTES {
                    break;
                }
                out[filled] = TRYTE_ALPHABET[(byte % 27) as usize];
                filled += 1;
            }
            counter += 1;
        }
        TryteHash(out)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn as_str(&self) -> &str {
        // always built from the ASCII tryte alphabet
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// First 9 trytes, for compact log output.
    pub fn short(&self) -> &str {
        &self.as_str()[..9]
    }
}

impl fmt::Display for TryteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for TryteHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TryteHash({})", self.short())
    }
}

impl FromStr for TryteHash {
    type Err = TangleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TryteHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TryteHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TryteHash::parse(&s).map_err(serde::de::Error::custom)
    }
}
