// src/ledger/snapshot.rs
// Ledger state at the pruning boundary, balance diffs, and snapshot files.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dag::hash::{Address, TryteHash};
use crate::dag::transaction::SUPPLY;
use crate::error::TangleError;

pub const LEDGER_STATE_FILE_PREFIX: &str = "ledgerState";

/// Address balances at a given milestone index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub index: u64,
    pub balances: HashMap<Address, i64>,
}

/// Balance changes that move a state from one index to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateDiff {
    pub changes: HashMap<Address, i64>,
}

impl StateDiff {
    pub fn new(changes: HashMap<Address, i64>) -> Self {
        Self { changes }
    }

    /// A diff neither creates nor destroys tokens.
    pub fn is_consistent(&self) -> bool {
        self.changes.values().map(|v| *v as i128).sum::<i128>() == 0
    }
}

impl SnapshotState {
    pub fn new(index: u64, balances: HashMap<Address, i64>) -> Self {
        Self { index, balances }
    }

    pub fn balance(&self, address: &Address) -> Option<i64> {
        self.balances.get(address).copied()
    }

    /// No address holds a negative balance.
    pub fn is_consistent(&self) -> bool {
        self.balances.values().all(|b| *b >= 0)
    }

    pub fn has_correct_supply(&self) -> bool {
        self.balances.values().map(|v| *v as i128).sum::<i128>() == SUPPLY as i128
    }

    /// Apply `diff` in place. Rejected diffs leave the state untouched.
    pub fn apply_diff(&mut self, diff: &StateDiff) -> Result<(), TangleError> {
        if !diff.is_consistent() {
            return Err(TangleError::Snapshot("state diff does not sum to zero".into()));
        }
        let patched = self.patched_state(diff);
        if !patched.is_consistent() {
            return Err(TangleError::Snapshot(
                "applying the diff would leave a negative balance".into(),
            ));
        }
        self.balances = patched.balances;
        Ok(())
    }

    /// Copy of this state with `diff` added; zero balances are dropped.
    pub fn patched_state(&self, diff: &StateDiff) -> SnapshotState {
        let mut balances = self.balances.clone();
        for (address, change) in &diff.changes {
            let entry = balances.entry(*address).or_insert(0);
            *entry = entry.saturating_add(*change);
        }
        balances.retain(|_, v| *v != 0);
        SnapshotState {
            index: self.index,
            balances,
        }
    }

    /// `ADDRESS;BALANCE` lines for every non-zero balance, sorted by address.
    pub fn to_ledger_lines(&self) -> String {
        let mut entries: Vec<_> = self.balances.iter().filter(|(_, v)| **v != 0).collect();
        entries.sort_by_key(|(a, _)| **a);
        let mut out = String::new();
        for (address, balance) in entries {
            let _ = writeln!(out, "{};{}", address, balance);
        }
        out
    }

    /// Write the ledger state to `<dir>/ledgerState-<index>` and return the path.
    pub fn write_ledger_state(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(format!("{}-{}", LEDGER_STATE_FILE_PREFIX, self.index));
        fs::write(&path, self.to_ledger_lines())
            .with_context(|| format!("writing ledger state to {}", path.display()))?;
        info!(path = %path.display(), "ledger state written");
        Ok(path)
    }
}

/// What a persistence collaborator hands the store at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub state: SnapshotState,
    pub solid_entry_points: HashSet<TryteHash>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Snapshot {
    pub fn new(
        state: SnapshotState,
        solid_entry_points: impl IntoIterator<Item = TryteHash>,
    ) -> Self {
        Self {
            state,
            solid_entry_points: solid_entry_points.into_iter().collect(),
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }

    /// Load a snapshot file; `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            index = snapshot.state.index,
            fingerprint = %snapshot.fingerprint(),
            "snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }

    /// Hex SHA-256 over the ledger lines and sorted entry points; stable across
    /// map ordering.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.state.index.to_be_bytes());
        hasher.update(self.state.to_ledger_lines().as_bytes());
        let mut eps: Vec<_> = self.solid_entry_points.iter().collect();
        eps.sort();
        for ep in eps {
            hasher.update(ep.as_str().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}
