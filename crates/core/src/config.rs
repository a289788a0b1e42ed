//! Backfill configuration.
//!
//! Injected explicitly into the orchestrator and scheduler at construction
//! — never read from process-wide state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one backfill run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Upper bound on rows per fetch call.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Per-fetch-call timeout in seconds.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Transient-failure retries before a run gives up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Verification tolerance: completed when
    /// `actual >= expected * (1 - verify_tolerance)`.
    ///
    /// Configurable because the upstream total-count semantics are an
    /// assumption, not a guarantee.
    #[serde(default = "default_verify_tolerance")]
    pub verify_tolerance: f64,

    /// Concurrent jobs in the scheduler's worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_batch_size() -> u32 {
    1000
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    5
}

fn default_verify_tolerance() -> f64 {
    0.01
}

fn default_workers() -> usize {
    4
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            verify_tolerance: default_verify_tolerance(),
            workers: default_workers(),
        }
    }
}

impl BackfillConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: BackfillConfig = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.max_retries, 5);
        assert!((config.verify_tolerance - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_partial_override() {
        let config: BackfillConfig = serde_json::from_value(serde_json::json!({
            "batch_size": 50,
            "verify_tolerance": 0.05,
        }))
        .unwrap();
        assert_eq!(config.batch_size, 50);
        assert!((config.verify_tolerance - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 5);
    }
}
