use serde::{Deserialize, Serialize};
use tel_crypto::{build_merkle_root, Signature, SigningKey, VerifyingKey};
use tel_types::Hash;
use tracing::debug;

use crate::error::ChainError;

/// Identity and time of a checkpoint, supplied by whoever schedules it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointWindow {
    pub id: String,
    pub timestamp: u64,
}

impl CheckpointWindow {
    pub fn new(id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            timestamp,
        }
    }
}

/// A Merkle root over a contiguous, ordered range of entry hashes.
///
/// Anchors are never mutated. An auditor holding the same ordered hashes
/// can rebuild `root_hash` without replaying the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub root_hash: Hash,
    pub timestamp: u64,
    pub entry_count: u64,
    /// Hash of the first entry in the range.
    pub first_hash: Hash,
    /// Hash of the last entry in the range.
    pub last_hash: Hash,
    /// Signature over the raw root bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Anchor {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Structural checks that do not need the underlying hashes.
    pub fn validate(&self) -> Result<(), ChainError> {
        if self.id.is_empty() {
            return Err(ChainError::InvalidAnchor("empty anchor id".into()));
        }
        if self.entry_count == 0 {
            return Err(ChainError::InvalidAnchor("entry_count must be >= 1".into()));
        }
        if self.entry_count == 1
            && (self.first_hash != self.last_hash || self.root_hash != self.first_hash)
        {
            return Err(ChainError::InvalidAnchor(
                "single-entry anchor must have root == first == last".into(),
            ));
        }
        Ok(())
    }

    /// Rebuild the root from `hashes` and compare it, together with the
    /// recorded count and range bounds.
    pub fn verify_root(&self, hashes: &[Hash]) -> bool {
        let (Some(first), Some(last)) = (hashes.first(), hashes.last()) else {
            return false;
        };
        if hashes.len() as u64 != self.entry_count
            || *first != self.first_hash
            || *last != self.last_hash
        {
            return false;
        }
        build_merkle_root(hashes).is_ok_and(|root| root == self.root_hash)
    }

    pub fn verify_signature(&self, key: &VerifyingKey) -> Result<(), ChainError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or_else(|| ChainError::SignatureMissing {
                entry_id: self.id.clone(),
            })?;
        key.verify(self.root_hash.as_bytes(), signature)
            .map_err(|_| ChainError::SignatureInvalid {
                entry_id: self.id.clone(),
            })
    }
}

/// Build an anchor over `hashes`, signing the root when a key is supplied.
pub fn create_checkpoint(
    hashes: &[Hash],
    window: CheckpointWindow,
    signing_key: Option<&SigningKey>,
) -> Result<Anchor, ChainError> {
    let (Some(first), Some(last)) = (hashes.first(), hashes.last()) else {
        return Err(ChainError::EmptyRange);
    };
    let root_hash = build_merkle_root(hashes).map_err(|_| ChainError::EmptyRange)?;
    let signature = signing_key.map(|key| key.sign(root_hash.as_bytes()));

    debug!(
        anchor_id = %window.id,
        entries = hashes.len(),
        root = %root_hash.short_hex(),
        signed = signature.is_some(),
        "checkpoint created"
    );

    Ok(Anchor {
        id: window.id,
        root_hash,
        timestamp: window.timestamp,
        entry_count: hashes.len() as u64,
        first_hash: *first,
        last_hash: *last,
        signature,
    })
}
