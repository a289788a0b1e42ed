//! Local persistence for the backfill core.
//!
//! Two narrow contracts: [`RowSink`] (idempotent page upserts keyed by
//! natural identity) and [`CheckpointStore`] (durable `BackfillJob`
//! records). The PostgreSQL implementation backs production; the
//! in-memory implementation backs tests and dry runs. Everything above
//! this crate treats the store as an opaque sink — index and parallelism
//! tuning live with the database, not here.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::{CheckpointStore, RowSink};
