use tel_crypto::VerifyingKey;
use tracing::debug;

use crate::entry::ChainEntry;
use crate::error::ChainError;

/// Outcome of replaying a sequence of entries.
///
/// Verification never stops at the first fault: every detected problem is
/// recorded in `errors` and counted in its category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    /// `true` iff every category count is zero.
    pub valid: bool,
    pub entries_checked: usize,
    pub hash_mismatches: usize,
    pub chain_link_errors: usize,
    pub timestamp_errors: usize,
    pub signature_failures: usize,
    pub payload_errors: usize,
    pub errors: Vec<ChainError>,
}

impl VerificationResult {
    fn new() -> Self {
        Self {
            valid: true,
            entries_checked: 0,
            hash_mismatches: 0,
            chain_link_errors: 0,
            timestamp_errors: 0,
            signature_failures: 0,
            payload_errors: 0,
            errors: Vec::new(),
        }
    }

    /// Total number of faults across all categories.
    pub fn fault_count(&self) -> usize {
        self.hash_mismatches
            + self.chain_link_errors
            + self.timestamp_errors
            + self.signature_failures
            + self.payload_errors
    }

    fn record(&mut self, error: ChainError) {
        match &error {
            ChainError::HashMismatch { .. } => self.hash_mismatches += 1,
            ChainError::ChainLinkBroken { .. } => self.chain_link_errors += 1,
            ChainError::TimestampOutOfOrder { .. } => self.timestamp_errors += 1,
            ChainError::SignatureInvalid { .. } | ChainError::SignatureMissing { .. } => {
                self.signature_failures += 1
            }
            _ => self.payload_errors += 1,
        }
        self.valid = false;
        self.errors.push(error);
    }
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain integrity verifier.
///
/// Per entry it runs four independent checks: hash recomputation, chain
/// link, timestamp ordering, and (with a verifying key) the detached
/// signature. Record structure is checked as well and reported under
/// `payload_errors`. Callers supply entries in append order.
#[derive(Clone, Debug)]
pub struct ChainVerifier {
    verifying_key: Option<VerifyingKey>,
    limit: Option<usize>,
    expect_genesis: bool,
}

impl ChainVerifier {
    /// Verifier for a full chain starting at genesis, without signature checks.
    pub fn new() -> Self {
        Self {
            verifying_key: None,
            limit: None,
            expect_genesis: true,
        }
    }

    /// Also verify every entry's signature against `key`.
    pub fn with_verifying_key(mut self, key: VerifyingKey) -> Self {
        self.verifying_key = Some(key);
        self
    }

    /// Only check the first `limit` entries of the supplied sequence.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Treat the first entry as a local genesis: its `prev_hash` is not
    /// checked. Used for windows that start mid-chain.
    pub fn as_window(mut self) -> Self {
        self.expect_genesis = false;
        self
    }

    pub fn verify(&self, entries: &[ChainEntry]) -> VerificationResult {
        let mut result = VerificationResult::new();
        let take = self.limit.unwrap_or(entries.len()).min(entries.len());
        let window = &entries[..take];
        result.entries_checked = window.len();

        let mut previous: Option<&ChainEntry> = None;
        for entry in window {
            if let Err(reason) = entry.record.validate() {
                result.record(ChainError::MalformedRecord {
                    entry_id: entry.record.id.clone(),
                    reason,
                });
            }

            if let Err(e) = entry.verify_self() {
                result.record(e);
            }

            match previous {
                Some(prev) => {
                    if entry.prev_hash != Some(prev.hash) {
                        result.record(ChainError::ChainLinkBroken {
                            entry_id: entry.record.id.clone(),
                            expected: Some(prev.hash),
                            found: entry.prev_hash,
                        });
                    }
                    if entry.record.timestamp < prev.record.timestamp {
                        result.record(ChainError::TimestampOutOfOrder {
                            entry_id: entry.record.id.clone(),
                            previous: prev.record.timestamp,
                            current: entry.record.timestamp,
                        });
                    }
                }
                None if self.expect_genesis && entry.prev_hash.is_some() => {
                    result.record(ChainError::ChainLinkBroken {
                        entry_id: entry.record.id.clone(),
                        expected: None,
                        found: entry.prev_hash,
                    });
                }
                None => {}
            }

            if let Some(key) = &self.verifying_key {
                if let Err(e) = entry.verify_signature(key) {
                    result.record(e);
                }
            }

            previous = Some(entry);
        }

        debug!(
            entries = result.entries_checked,
            faults = result.fault_count(),
            valid = result.valid,
            "chain verified"
        );
        result
    }
}

impl Default for ChainVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify a full chain from genesis without signature checks.
pub fn verify_chain(entries: &[ChainEntry]) -> VerificationResult {
    ChainVerifier::new().verify(entries)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tel_crypto::SigningKey;
    use tel_types::{Hash, Record};

    use super::*;

    fn build_chain(count: usize, key: Option<&SigningKey>) -> Vec<ChainEntry> {
        let mut chain = Vec::with_capacity(count);
        let mut prev_hash = None;
        for i in 0..count {
            let record = Record::new(
                format!("entry-{i}"),
                "proofs",
                1000 + i as u64,
                json!({"index": i}),
            );
            let mut entry = ChainEntry::new(record, prev_hash).unwrap();
            if let Some(key) = key {
                entry = entry.signed(key);
            }
            prev_hash = Some(entry.hash);
            chain.push(entry);
        }
        chain
    }

    #[test]
    fn empty_chain_is_valid() {
        let result = verify_chain(&[]);
        assert!(result.valid);
        assert_eq!(result.entries_checked, 0);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn five_entry_chain_is_valid() {
        let chain = build_chain(5, None);
        let result = verify_chain(&chain);
        assert!(result.valid);
        assert_eq!(result.entries_checked, 5);
        assert_eq!(result.fault_count(), 0);
    }

    #[test]
    fn flipped_hash_bit_is_a_mismatch() {
        let mut chain = build_chain(3, None);
        let mut bytes = *chain[1].hash.as_bytes();
        bytes[0] ^= 0x01;
        chain[1].hash = Hash::from_bytes(bytes);

        let result = verify_chain(&chain);
        assert!(!result.valid);
        assert_eq!(result.hash_mismatches, 1);
        // entry-2 still points at the original hash of entry-1.
        assert_eq!(result.chain_link_errors, 1);
    }

    #[test]
    fn corrupted_prev_hash_breaks_the_link() {
        let mut chain = build_chain(3, None);
        chain[2].prev_hash = Some(Hash::from_bytes([0x99; 32]));
        let result = verify_chain(&chain);
        assert!(!result.valid);
        assert_eq!(result.chain_link_errors, 1);
        assert_eq!(result.hash_mismatches, 0);
    }

    #[test]
    fn missing_prev_hash_breaks_the_link() {
        let mut chain = build_chain(3, None);
        chain[1].prev_hash = None;
        let result = verify_chain(&chain);
        assert_eq!(result.chain_link_errors, 1);
        assert!(matches!(
            &result.errors[0],
            ChainError::ChainLinkBroken { found: None, .. }
        ));
    }

    #[test]
    fn genesis_with_prev_hash_is_rejected_unless_windowed() {
        let mut chain = build_chain(2, None);
        chain[0].prev_hash = Some(Hash::from_bytes([1; 32]));

        assert_eq!(verify_chain(&chain).chain_link_errors, 1);
        assert!(ChainVerifier::new().as_window().verify(&chain).valid);
    }

    #[test]
    fn window_starting_mid_chain_is_valid() {
        let chain = build_chain(6, None);
        let result = ChainVerifier::new().as_window().verify(&chain[3..]);
        assert!(result.valid);
        assert_eq!(result.entries_checked, 3);
    }

    #[test]
    fn timestamp_regression_is_reported() {
        let first = ChainEntry::genesis(Record::new("a", "s", 2000, json!({}))).unwrap();
        let second =
            ChainEntry::new(Record::new("b", "s", 1000, json!({})), Some(first.hash)).unwrap();
        let result = verify_chain(&[first, second]);
        assert!(!result.valid);
        assert_eq!(result.timestamp_errors, 1);
        assert_eq!(result.chain_link_errors, 0);
    }

    #[test]
    fn equal_timestamps_are_allowed() {
        let first = ChainEntry::genesis(Record::new("a", "s", 1000, json!({}))).unwrap();
        let second =
            ChainEntry::new(Record::new("b", "s", 1000, json!({})), Some(first.hash)).unwrap();
        assert!(verify_chain(&[first, second]).valid);
    }

    #[test]
    fn all_faults_are_accumulated() {
        let mut chain = build_chain(5, None);
        chain[1].record.payload = json!({"index": "tampered"});
        chain[3].prev_hash = None;
        chain[4].record.timestamp = 1;

        let result = verify_chain(&chain);
        assert_eq!(result.entries_checked, 5);
        assert_eq!(result.hash_mismatches, 2);
        assert_eq!(result.chain_link_errors, 1);
        assert_eq!(result.timestamp_errors, 1);
        assert_eq!(result.errors.len(), result.fault_count());
    }

    #[test]
    fn malformed_record_counts_as_payload_error() {
        let mut chain = build_chain(2, None);
        chain[1].record.payload = json!(42);
        let result = verify_chain(&chain);
        assert_eq!(result.payload_errors, 1);
        assert_eq!(result.hash_mismatches, 1);
    }

    #[test]
    fn limit_bounds_the_check() {
        let mut chain = build_chain(5, None);
        chain[4].prev_hash = None;

        let bounded = ChainVerifier::new().with_limit(3).verify(&chain);
        assert!(bounded.valid);
        assert_eq!(bounded.entries_checked, 3);

        let oversized = ChainVerifier::new().with_limit(50).verify(&chain);
        assert_eq!(oversized.entries_checked, 5);
        assert!(!oversized.valid);
    }

    #[test]
    fn signatures_are_checked_with_a_key() {
        let key = SigningKey::from_bytes([5; 32]);
        let chain = build_chain(4, Some(&key));
        let verifier = ChainVerifier::new().with_verifying_key(key.verifying_key());
        assert!(verifier.verify(&chain).valid);

        let other = SigningKey::from_bytes([6; 32]).verifying_key();
        let result = ChainVerifier::new().with_verifying_key(other).verify(&chain);
        assert_eq!(result.signature_failures, 4);
        assert_eq!(result.hash_mismatches, 0);
    }

    #[test]
    fn unsigned_entries_fail_when_signatures_are_expected() {
        let chain = build_chain(2, None);
        let key = SigningKey::from_bytes([5; 32]).verifying_key();
        let result = ChainVerifier::new().with_verifying_key(key).verify(&chain);
        assert_eq!(result.signature_failures, 2);
        assert!(matches!(result.errors[0], ChainError::SignatureMissing { .. }));
    }
}
