//! Reconciliation loop primitives.
//!
//! This library provides the pieces shared by every reconciler that converges
//! declared topology to infrastructure resources:
//!
//! - **Outcome**: what the trigger mechanism should do after a pass.
//! - **Spec hash**: a stable digest for "did the desired spec change".
//! - **Convergence**: desired vs. observed replica counts.
//! - **Backoff**: per-key exponential delay after failed passes.
//!
//! # Invariants
//!
//! - Every pass is idempotent; running it twice against an unchanged store
//!   issues no writes the second time.
//! - A readiness wait is an [`Outcome`], never an error.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Delay before re-checking a cluster whose tablets are not all ready.
pub const READINESS_RECHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Default base delay after a failed pass.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default ceiling for the failed-pass delay.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5 * 60);

/// Result of one reconciliation pass, consumed by the trigger mechanism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Run the pass again.
    pub requeue: bool,

    /// Wait this long before running it again. Implies `requeue`.
    pub requeue_after: Option<Duration>,
}

impl Outcome {
    /// Nothing left to do until the next change notification.
    pub fn done() -> Self {
        Self::default()
    }

    /// Run again as soon as the caller's backoff policy allows.
    pub fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Run again after `delay`.
    pub fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(delay),
        }
    }

    /// Returns true if the caller should schedule another pass.
    pub fn is_requeue(&self) -> bool {
        self.requeue || self.requeue_after.is_some()
    }
}

/// Convergence status for a replicated resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Observed ready replicas match the desired count.
    Converged,

    /// Still moving toward the desired count.
    Converging,
}

impl ConvergenceStatus {
    /// Compare desired replicas with what the resource reports ready.
    pub fn from_replicas(desired: i32, ready: i32) -> Self {
        if desired == ready {
            Self::Converged
        } else {
            Self::Converging
        }
    }

    /// Returns true if the resource has converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }
}

/// A spec hash for deterministic comparison.
///
/// Used to decide whether an existing resource must be patched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Compute a spec hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(json).as_bytes());
        let digest = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&digest[..16])))
    }

    /// Hash any serializable value.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::from_json(&serde_json::to_value(value)?))
    }

    /// Get the hash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SpecHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical JSON: object keys sorted, no whitespace.
fn canonical_json(value: &serde_json::Value) -> String {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", items.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Exponential backoff for keys whose passes keep failing.
#[derive(Debug, Clone)]
pub struct FailureBackoff {
    base: Duration,
    max: Duration,

    /// Consecutive failures per key.
    failures: BTreeMap<String, u32>,
}

impl Default for FailureBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

impl FailureBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: BTreeMap::new(),
        }
    }

    /// Record a failure and return how long to wait before retrying.
    ///
    /// The first failure waits `base`; each further one doubles it, capped at `max`.
    pub fn record_failure(&mut self, key: &str) -> Duration {
        let count = self.failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);

        let exponent = (*count - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Consecutive failures recorded for `key`.
    pub fn failures(&self, key: &str) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Forget failures for `key` (on success).
    pub fn clear(&mut self, key: &str) {
        self.failures.remove(key);
    }
}
