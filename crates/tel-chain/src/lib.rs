//! Hash chain for the tamper-evident ledger.
//!
//! - [`ChainEntry`] binds a record to its content hash and to the previous
//!   entry's hash, optionally with a detached signature
//! - [`ChainVerifier`] replays a sequence of entries and reports every fault
//!   it finds, grouped by category
//! - [`Anchor`] is a (signed) Merkle root over a contiguous hash range

pub mod checkpoint;
pub mod entry;
pub mod error;
pub mod verifier;

pub use checkpoint::{create_checkpoint, Anchor, CheckpointWindow};
pub use entry::{signing_message, ChainEntry};
pub use error::ChainError;
pub use verifier::{verify_chain, ChainVerifier, VerificationResult};
