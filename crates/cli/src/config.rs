use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use quorum_core::BackfillConfig;
use quorum_source::SourceConfig;

/// Application configuration loaded from TOML:
///
/// ```toml
/// database_url = "postgres://localhost/quorum"
///
/// [source]
/// base_url = "https://records.example.gov/api/v1"
/// api_token = "${QUORUM_API_TOKEN}"
///
/// [backfill]
/// batch_size = 1000
/// verify_tolerance = 0.01
/// ```
///
/// `database_url` falls back to the `DATABASE_URL` environment variable.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,

    #[serde(default)]
    pub database_url: Option<String>,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read config file '{path}'"))?;
        let config: AppConfig =
            toml::from_str(&raw).with_context(|| format!("invalid config file '{path}'"))?;
        debug!(path, "configuration loaded");
        Ok(config)
    }

    pub fn resolve_database_url(&self) -> Result<String> {
        if let Some(url) = &self.database_url {
            return Ok(url.clone());
        }
        std::env::var("DATABASE_URL")
            .context("database_url not in config and DATABASE_URL is not set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [source]
            base_url = "https://records.example.gov/api/v1"
            "#,
        )
        .unwrap();
        assert_eq!(config.source.base_url, "https://records.example.gov/api/v1");
        assert!(config.source.api_token.is_none());
        assert_eq!(config.backfill.batch_size, 1000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            database_url = "postgres://localhost/quorum"

            [source]
            base_url = "https://records.example.gov/api/v1"
            api_token = "${QUORUM_API_TOKEN}"

            [backfill]
            batch_size = 250
            max_retries = 3
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.resolve_database_url().unwrap(), "postgres://localhost/quorum");
        assert_eq!(config.backfill.batch_size, 250);
        assert_eq!(config.backfill.max_retries, 3);
        assert_eq!(config.backfill.workers, 8);
        // Untouched fields keep their defaults.
        assert_eq!(config.backfill.fetch_timeout_secs, 120);
    }
}
