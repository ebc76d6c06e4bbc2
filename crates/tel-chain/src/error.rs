use tel_types::{Hash, RecordError};

/// Errors from entry construction, chain verification, and checkpointing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("malformed record in entry {entry_id}: {reason}")]
    MalformedRecord {
        entry_id: String,
        reason: RecordError,
    },

    #[error("hash mismatch at entry {entry_id}: computed {computed}, stored {stored}")]
    HashMismatch {
        entry_id: String,
        computed: Hash,
        stored: Hash,
    },

    #[error("chain link broken at entry {entry_id}: expected prev_hash {expected:?}, found {found:?}")]
    ChainLinkBroken {
        entry_id: String,
        expected: Option<Hash>,
        found: Option<Hash>,
    },

    #[error("timestamp out of order at entry {entry_id}: {current} precedes {previous}")]
    TimestampOutOfOrder {
        entry_id: String,
        previous: u64,
        current: u64,
    },

    #[error("signature invalid for entry {entry_id}")]
    SignatureInvalid { entry_id: String },

    #[error("signature missing for entry {entry_id}")]
    SignatureMissing { entry_id: String },

    #[error("cannot checkpoint an empty hash range")]
    EmptyRange,

    #[error("invalid anchor: {0}")]
    InvalidAnchor(String),
}
