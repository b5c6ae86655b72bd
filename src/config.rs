// src/config.rs
// Node configuration from the environment, plus startup validation

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TangleError};
use crate::tipselection::TipSelectionConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TangleConfig {
    pub alpha: f64,
    pub walk_count: usize,
    pub max_walk_steps: usize,
    pub weight_window: usize,
    pub pending_capacity: usize,
    /// Fixed master seed for tip selection; OS entropy when unset.
    pub rng_seed: Option<u64>,
    pub snapshot_path: Option<PathBuf>,
}

impl Default for TangleConfig {
    fn default() -> Self {
        let walks = TipSelectionConfig::default();
        Self {
            alpha: walks.alpha,
            walk_count: walks.walk_count,
            max_walk_steps: walks.max_walk_steps,
            weight_window: 50_000,
            pending_capacity: 10_000,
            rng_seed: None,
            snapshot_path: None,
        }
    }
}

impl TangleConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse(&lookup, "TANGLE_ALPHA")? {
            config.alpha = v;
        }
        if let Some(v) = parse(&lookup, "TANGLE_WALK_COUNT")? {
            config.walk_count = v;
        }
        if let Some(v) = parse(&lookup, "TANGLE_MAX_WALK_STEPS")? {
            config.max_walk_steps = v;
        }
        if let Some(v) = parse(&lookup, "TANGLE_WEIGHT_WINDOW")? {
            config.weight_window = v;
        }
        if let Some(v) = parse(&lookup, "TANGLE_PENDING_CAPACITY")? {
            config.pending_capacity = v;
        }
        config.rng_seed = parse(&lookup, "TANGLE_RNG_SEED")?;
        config.snapshot_path = lookup("TANGLE_SNAPSHOT_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Ok(config)
    }

    pub fn tip_selection(&self) -> TipSelectionConfig {
        TipSelectionConfig {
            alpha: self.alpha,
            walk_count: self.walk_count,
            max_walk_steps: self.max_walk_steps,
        }
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| TangleError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(None),
    }
}

/// Validation result for configuration checks
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        if !self.warnings.is_empty() {
            warn!("⚠️  Configuration Warnings:");
            for w in &self.warnings {
                warn!("   - {}", w);
            }
        }

        if !self.errors.is_empty() {
            error!("❌ Configuration Errors:");
            for e in &self.errors {
                error!("   - {}", e);
            }
        }

        if self.valid && self.warnings.is_empty() {
            info!("✅ Configuration validation passed");
        }
    }
}

/// Validate a configuration before the node starts
pub fn validate_config(config: &TangleConfig) -> ConfigValidation {
    let mut validation = ConfigValidation::new();

    info!("🔍 Validating configuration...");

    validate_walks(config, &mut validation);
    validate_capacities(config, &mut validation);

    if let Some(path) = &config.snapshot_path {
        if !path.exists() {
            validation.add_warning(format!(
                "TANGLE_SNAPSHOT_PATH points to missing file {} - starting from an empty ledger",
                path.display()
            ));
        } else {
            info!("✓ Snapshot file {}", path.display());
        }
    }

    validation
}

fn validate_walks(config: &TangleConfig, validation: &mut ConfigValidation) {
    if !config.alpha.is_finite() || config.alpha < 0.0 {
        validation.add_error(format!(
            "TANGLE_ALPHA must be a finite number >= 0 (got {})",
            config.alpha
        ));
    } else if config.alpha > 10.0 {
        validation.add_warning(format!(
            "TANGLE_ALPHA={} is very large - walks will almost always follow the heaviest branch",
            config.alpha
        ));
    }

    match config.walk_count {
        0 => validation.add_error("TANGLE_WALK_COUNT must be at least 1".into()),
        1 => validation
            .add_warning("TANGLE_WALK_COUNT=1 - trunk and branch will be the same tip".into()),
        n => info!("✓ {} walks per selection", n),
    }

    if config.max_walk_steps == 0 {
        validation.add_error("TANGLE_MAX_WALK_STEPS must be at least 1".into());
    }
}

fn validate_capacities(config: &TangleConfig, validation: &mut ConfigValidation) {
    if config.weight_window == 0 {
        validation.add_warning(
            "TANGLE_WEIGHT_WINDOW=0 - the weight cache is cleared on every admission".into(),
        );
    }
    if config.pending_capacity == 0 {
        validation.add_error("TANGLE_PENDING_CAPACITY must be at least 1".into());
    }
}
