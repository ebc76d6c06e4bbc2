//! Cryptographic primitives for the tamper-evident ledger.
//!
//! Provides the canonical record encoding, BLAKE3 record hashing, Ed25519
//! signing/verification, and binary Merkle trees with inclusion proofs.
//!
//! All crypto operations wrap established libraries. No custom cryptography.

pub mod canonical;
pub mod hasher;
pub mod merkle;
pub mod signer;

pub use canonical::{canonical_value, serialize_canonical};
pub use hasher::{compute_hash, digest, verify_hash};
pub use merkle::{build_merkle_root, hash_pair, MerkleError, MerkleProof, MerkleTree, Side};
pub use signer::{verify, Signature, SignatureError, SigningKey, VerifyingKey};
