use serde::{Deserialize, Serialize};
use tel_crypto::{compute_hash, Signature, SigningKey, VerifyingKey};
use tel_types::{Hash, Record};

use crate::error::ChainError;

/// A record plus its cryptographic position in the chain.
///
/// `hash` is always the content hash of `record`; `prev_hash` is the hash of
/// the entry appended immediately before, or `None` for the genesis entry.
/// Entries written by a ledger that holds a signing key also carry a detached
/// signature over `hash ++ prev_hash`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub record: Record,
    pub hash: Hash,
    #[serde(default)]
    pub prev_hash: Option<Hash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl ChainEntry {
    /// Validate `record` and bind it to `prev_hash`.
    pub fn new(record: Record, prev_hash: Option<Hash>) -> Result<Self, ChainError> {
        record.validate()?;
        let hash = compute_hash(&record);
        Ok(Self {
            record,
            hash,
            prev_hash,
            signature: None,
        })
    }

    /// The first entry of a chain.
    pub fn genesis(record: Record) -> Result<Self, ChainError> {
        Self::new(record, None)
    }

    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_none()
    }

    pub fn id(&self) -> &str {
        &self.record.id
    }

    /// Attach a signature over this entry's link.
    pub fn signed(mut self, key: &SigningKey) -> Self {
        self.signature = Some(key.sign(&self.signing_message()));
        self
    }

    /// Bytes covered by the entry signature.
    pub fn signing_message(&self) -> Vec<u8> {
        signing_message(&self.hash, self.prev_hash.as_ref())
    }

    /// Recompute the content hash and compare it with the stored one.
    pub fn verify_self(&self) -> Result<(), ChainError> {
        let computed = compute_hash(&self.record);
        if computed != self.hash {
            return Err(ChainError::HashMismatch {
                entry_id: self.record.id.clone(),
                computed,
                stored: self.hash,
            });
        }
        Ok(())
    }

    /// Check the detached signature against `key`.
    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), ChainError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| ChainError::SignatureMissing {
                entry_id: self.record.id.clone(),
            })?;
        key.verify(&self.signing_message(), signature)
            .map_err(|_| ChainError::SignatureInvalid {
                entry_id: self.record.id.clone(),
            })
    }
}

/// `hash` followed by `prev_hash` (genesis entries sign `hash` alone).
pub fn signing_message(hash: &Hash, prev_hash: Option<&Hash>) -> Vec<u8> {
    let mut message = Vec::with_capacity(2 * Hash::LEN);
    message.extend_from_slice(hash.as_bytes());
    if let Some(prev) = prev_hash {
        message.extend_from_slice(prev.as_bytes());
    }
    message
}
