//! Error taxonomy for the store.
//!
//! `QueryError` covers caller mistakes caught before any engine access;
//! `StoreError` covers everything the engine and session layer can raise.
//! Commit failures are deliberately absent: they surface as a
//! `CommitOutcome` value at the session boundary, never as an error.

use thiserror::Error;

/// Caller errors raised at descriptor compile / entity build time.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("table '{0}' is not registered")]
    UnknownTable(String),

    #[error("field '{field}' does not exist on table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("'{0}' operation not supported")]
    UnsupportedOperation(String),

    #[error("invalid where clause: {0}")]
    InvalidPredicate(String),

    #[error("'{0}' is not a valid group operator")]
    InvalidGroupOperator(String),

    #[error("schema mismatch on table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },
}

/// Errors raised by the engine and session layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("there should only be one file date present in the batch, found {0}")]
    MultipleDatesInBatch(usize),

    #[error("table '{0}' does not declare a date column")]
    UndatedTable(String),

    #[error("write failed for table '{table}': {detail}")]
    Write { table: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
