//! Foundation types for the tamper-evident ledger (TEL).
//!
//! Every other TEL crate depends on `tel-types`.
//!
//! # Key Types
//!
//! - [`Hash`]: 32-byte digest with lowercase-hex round-trip
//! - [`Record`]: the immutable unit of business data appended to a ledger

pub mod error;
pub mod hash;
pub mod record;

pub use error::{RecordError, TypeError};
pub use hash::Hash;
pub use record::Record;
