use tel_types::{Hash, Record};

use crate::canonical::serialize_canonical;

/// BLAKE3-256 digest of raw bytes.
pub fn digest(data: &[u8]) -> Hash {
    Hash::from_bytes(*blake3::hash(data).as_bytes())
}

/// Content hash of a record: the digest of its canonical encoding.
pub fn compute_hash(record: &Record) -> Hash {
    digest(&serialize_canonical(record))
}

/// Verify that a record produces the expected hash.
pub fn verify_hash(record: &Record, expected: &Hash) -> bool {
    compute_hash(record) == *expected
}
