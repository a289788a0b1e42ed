use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A single row the sink refused to write. The orchestrator skips
    /// the row and continues the batch.
    #[error("row rejected: {0}")]
    RowRejected(String),

    /// A persisted record that cannot be interpreted (bad status or kind
    /// string written by foreign tooling).
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}
