//! The paginated source client contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quorum_core::{JobKey, PageRow};

use crate::error::FetchError;

/// Opaque pagination token.
///
/// The caller never parses or mutates the inner value; the only
/// distinguished states are "start" (empty) and "end" (upstream signalled
/// exhaustion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(Option<String>);

impl Cursor {
    /// Beginning of the sequence.
    pub fn start() -> Self {
        Cursor(Some(String::new()))
    }

    /// Past the last page.
    pub fn end() -> Self {
        Cursor(None)
    }

    /// Rehydrate from a persisted token (empty string = start).
    pub fn from_token(token: impl Into<String>) -> Self {
        Cursor(Some(token.into()))
    }

    pub fn is_end(&self) -> bool {
        self.0.is_none()
    }

    /// Token to persist in the checkpoint. `None` at the end marker —
    /// a finished job has nothing left to resume from.
    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// One page of results from the source.
#[derive(Debug, Clone)]
pub struct FetchPage {
    /// Rows in upstream order. May be fewer than the requested batch size.
    pub rows: Vec<PageRow>,
    /// Where to resume after this batch.
    pub next_cursor: Cursor,
    /// Upstream's reported total for this (entity, kind), when present.
    pub total_count: Option<i64>,
}

/// Black-box client for the source-of-record API.
///
/// Implementations hold no job state; the orchestrator owns the cursor.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch up to `batch_size` rows at `cursor`.
    ///
    /// `batch_size` is an upper bound, not a guarantee.
    async fn fetch(
        &self,
        key: &JobKey,
        cursor: &Cursor,
        batch_size: u32,
    ) -> Result<FetchPage, FetchError>;

    /// Authoritative total for one (entity, kind), if the source offers a
    /// count endpoint. Used by verification when fetch metadata carried
    /// no total.
    async fn total_count(&self, key: &JobKey) -> Result<Option<i64>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_states() {
        assert!(!Cursor::start().is_end());
        assert!(Cursor::end().is_end());
        assert_eq!(Cursor::start().token(), Some(""));
        assert_eq!(Cursor::end().token(), None);
        assert_eq!(Cursor::from_token("abc").token(), Some("abc"));
    }
}
