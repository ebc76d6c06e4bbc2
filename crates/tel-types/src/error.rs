use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Reasons a [`Record`](crate::Record) violates its structural invariants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record id cannot be empty")]
    EmptyId,

    #[error("record stream cannot be empty")]
    EmptyStream,

    #[error("record timestamp cannot be zero")]
    ZeroTimestamp,

    #[error("record payload must be a map or a list, got {0}")]
    ScalarPayload(&'static str),
}
