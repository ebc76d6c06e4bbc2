//! Tamper-evident, append-only ledger engine.
//!
//! [`LedgerEngine`] ties the pieces together:
//!
//! - records pass through the registered modules before they are linked into
//!   the hash chain, signed when a key is configured, and persisted through a
//!   [`StorageBackend`]
//! - appends are serialised, and a failed append or batch leaves both the
//!   in-memory chain and storage unchanged
//! - the stored chain is re-verified on start-up; a broken chain is refused
//! - queries combine stream, id and time filters with module narrowing
//! - Merkle checkpoints anchor contiguous ranges and yield inclusion proofs
//! - an optional grant store restricts appends to requesters holding `write`
//!
//! ```no_run
//! use serde_json::json;
//! use tel_engine::{LedgerConfig, LedgerEngine, QueryFilters};
//! use tel_module::ModuleConfig;
//! use tel_types::Record;
//!
//! let config = LedgerConfig::new("main")
//!     .with_module(ModuleConfig::new("proof", "1.0.0", json!({})));
//! let engine = LedgerEngine::new(config)?;
//!
//! engine.append(Record::new(
//!     "p-1",
//!     "proofs",
//!     1_700_000_000_000,
//!     json!({"subject_oid": "oid:alice", "issuer_oid": "oid:acme"}),
//! ))?;
//!
//! let hits = engine.query(&QueryFilters::new().with_stream("proofs"))?;
//! assert_eq!(hits.total, 1);
//! assert!(engine.verify()?.valid);
//! # Ok::<(), tel_engine::EngineError>(())
//! ```

pub mod acl;
pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod state;
pub mod storage;

pub use acl::{AclBackend, AclError, Grant, MemoryAcl, Permission};
pub use config::{AclMode, ConfigError, LedgerConfig};
pub use engine::{AppendOutcome, BatchOutcome, LedgerEngine, LedgerEngineBuilder};
pub use error::{EngineError, ErrorKind, Result};
pub use query::{QueryFilters, QueryResult};
pub use state::LedgerState;
pub use storage::{FileStorage, MemoryStorage, StorageBackend, StorageError, StoreResult};

pub use tel_chain::{Anchor, ChainEntry, CheckpointWindow, VerificationResult};
pub use tel_types::{Hash, Record};
