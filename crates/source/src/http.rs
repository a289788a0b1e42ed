//! HTTP implementation of [`SourceClient`] over a JSON page envelope.
//!
//! Expected wire shape for `GET {base}/entities/{entity}/{kind}/pages`:
//!
//! ```json
//! {
//!   "rows": [
//!     { "document_id": "doc-1", "page_number": 1, "payload": { ... } }
//!   ],
//!   "next_cursor": "opaque-token-or-null",
//!   "total_count": 123
//! }
//! ```
//!
//! `next_cursor: null` (or absent) is the end marker. The count endpoint
//! `GET {base}/entities/{entity}/{kind}/count` returns `{ "total": n }`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use quorum_core::{JobKey, PageRow};

use crate::client::{Cursor, FetchPage, SourceClient};
use crate::error::FetchError;

/// Connection settings for the source-of-record API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL, no trailing slash (e.g. `https://records.example.gov/api/v1`).
    pub base_url: String,

    /// Bearer token. A `${VAR}` value is resolved from the environment.
    #[serde(default)]
    pub api_token: Option<String>,
}

impl SourceConfig {
    /// Resolve `${VAR}` token references against the environment.
    fn resolved_token(&self) -> Result<Option<String>, FetchError> {
        let Some(raw) = self.api_token.as_deref() else {
            return Ok(None);
        };
        if let Some(inner) = raw.strip_prefix("${") {
            let var_name = inner.strip_suffix('}').ok_or_else(|| {
                FetchError::Permanent(format!("malformed env var reference: {raw}"))
            })?;
            let value = std::env::var(var_name).map_err(|_| {
                FetchError::Permanent(format!("environment variable '{var_name}' is not set"))
            })?;
            Ok(Some(value))
        } else {
            Ok(Some(raw.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct PageEnvelope {
    #[serde(default)]
    rows: Vec<WireRow>,
    #[serde(default)]
    next_cursor: Option<String>,
    #[serde(default)]
    total_count: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    document_id: String,
    page_number: i32,
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CountEnvelope {
    total: Option<i64>,
}

/// Reqwest-backed source client.
pub struct HttpSourceClient {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpSourceClient {
    /// Build a client with a per-request timeout.
    pub fn new(config: &SourceConfig, timeout: Duration) -> Result<Self, FetchError> {
        let api_token = config.resolved_token()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn pages_url(&self, key: &JobKey) -> String {
        format!(
            "{}/entities/{}/{}/pages",
            self.base_url, key.entity_key, key.kind
        )
    }

    fn count_url(&self, key: &JobKey) -> String {
        format!(
            "{}/entities/{}/{}/count",
            self.base_url, key.entity_key, key.kind
        )
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let response = self
            .authed(self.client.get(&url).query(query))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let hint: String = body.chars().take(200).collect();
            return Err(FetchError::from_status(status, &hint));
        }

        // A 2xx with an undecodable body is a schema problem, not a blip.
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| FetchError::Permanent(format!("malformed response envelope: {e}")))
    }
}

#[async_trait::async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(
        &self,
        key: &JobKey,
        cursor: &Cursor,
        batch_size: u32,
    ) -> Result<FetchPage, FetchError> {
        let mut query = vec![("limit", batch_size.to_string())];
        match cursor.token() {
            Some("") | None => {}
            Some(token) => query.push(("cursor", token.to_string())),
        }

        debug!(job = %key, cursor = ?cursor.token(), limit = batch_size, "fetching page batch");
        let envelope: PageEnvelope = self.get_json(self.pages_url(key), &query).await?;

        let total_count = envelope.total_count;
        let rows = envelope
            .rows
            .into_iter()
            .map(|w| PageRow {
                entity_key: key.entity_key.clone(),
                kind: key.kind,
                document_id: w.document_id,
                page_number: w.page_number,
                payload: w.payload,
                total_hint: total_count,
            })
            .collect();

        let next_cursor = match envelope.next_cursor {
            Some(token) if !token.is_empty() => Cursor::from_token(token),
            _ => Cursor::end(),
        };

        Ok(FetchPage {
            rows,
            next_cursor,
            total_count,
        })
    }

    async fn total_count(&self, key: &JobKey) -> Result<Option<i64>, FetchError> {
        let envelope: CountEnvelope = self.get_json(self.count_url(key), &[]).await?;
        Ok(envelope.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::DocumentKind;

    #[test]
    fn test_urls() {
        let client = HttpSourceClient::new(
            &SourceConfig {
                base_url: "https://records.example.gov/api/v1/".into(),
                api_token: None,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let key = JobKey::new("springfield", DocumentKind::Agenda);
        assert_eq!(
            client.pages_url(&key),
            "https://records.example.gov/api/v1/entities/springfield/agenda/pages"
        );
        assert_eq!(
            client.count_url(&key),
            "https://records.example.gov/api/v1/entities/springfield/agenda/count"
        );
    }

    #[test]
    fn test_envelope_end_marker() {
        let envelope: PageEnvelope =
            serde_json::from_str(r#"{"rows": [], "next_cursor": null}"#).unwrap();
        assert!(envelope.next_cursor.is_none());
        assert!(envelope.total_count.is_none());

        let envelope: PageEnvelope = serde_json::from_str(
            r#"{"rows": [{"document_id": "d1", "page_number": 2, "payload": {}}],
                "next_cursor": "tok", "total_count": 9}"#,
        )
        .unwrap();
        assert_eq!(envelope.rows.len(), 1);
        assert_eq!(envelope.next_cursor.as_deref(), Some("tok"));
        assert_eq!(envelope.total_count, Some(9));
    }

    #[test]
    fn test_token_env_resolution() {
        let config = SourceConfig {
            base_url: "http://x".into(),
            api_token: Some("${QUORUM_TEST_TOKEN_UNSET}".into()),
        };
        assert!(config.resolved_token().is_err());

        let config = SourceConfig {
            base_url: "http://x".into(),
            api_token: Some("literal-token".into()),
        };
        assert_eq!(config.resolved_token().unwrap().as_deref(), Some("literal-token"));
    }
}
