//! Source-of-record client for paginated meeting documents.
//!
//! The backfill core sees the upstream API only through the
//! [`SourceClient`] trait: an opaque-cursor paginated fetch plus an
//! optional dedicated count endpoint. Errors are classified into
//! transient (retryable) and permanent (stop-the-job) so the orchestrator
//! can apply the right policy without inspecting transport details.

pub mod client;
pub mod error;
pub mod http;

pub use client::{Cursor, FetchPage, SourceClient};
pub use error::FetchError;
pub use http::{HttpSourceClient, SourceConfig};
