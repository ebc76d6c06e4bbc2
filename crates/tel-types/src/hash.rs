use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// A 256-bit digest identifying a record, a chain entry, or a Merkle node.
///
/// Serializes as a 64-character lowercase hex string so persisted entries
/// stay readable and diffable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Length of a digest in bytes.
    pub const LEN: usize = 32;

    /// Wrap a pre-computed digest.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Copy a digest out of a slice that must be exactly 32 bytes long.
    pub fn from_slice(slice: &[u8]) -> Result<Self, TypeError> {
        let bytes: [u8; 32] = slice.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: slice.len(),
        })?;
        Ok(Self(bytes))
    }

    /// The all-zero digest.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex representation (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.short_hex())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<Hash> for [u8; 32] {
    fn from(hash: Hash) -> Self {
        hash.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::str::FromStr for Hash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_requires_32_bytes() {
        assert!(Hash::from_slice(&[7u8; 32]).is_ok());
        assert_eq!(
            Hash::from_slice(&[7u8; 31]).unwrap_err(),
            TypeError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
        assert!(Hash::from_slice(&[7u8; 33]).is_err());
    }

    #[test]
    fn hex_roundtrip() {
        let hash = Hash::from_bytes([0xab; 32]);
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(hex, hex.to_lowercase());
        assert_eq!(Hash::from_hex(&hex).unwrap(), hash);
    }

    #[test]
    fn from_hex_rejects_malformed_input() {
        assert!(matches!(
            Hash::from_hex("not hex at all"),
            Err(TypeError::InvalidHex(_))
        ));
        // Valid hex, wrong length.
        assert!(matches!(
            Hash::from_hex("abcd"),
            Err(TypeError::InvalidLength { actual: 2, .. })
        ));
    }

    #[test]
    fn zero_is_all_zeros() {
        let zero = Hash::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.as_bytes(), &[0u8; 32]);
        assert!(!Hash::from_bytes([1; 32]).is_zero());
    }

    #[test]
    fn display_is_full_hex() {
        let hash = Hash::from_bytes([0x11; 32]);
        assert_eq!(format!("{hash}"), hash.to_hex());
        assert_eq!(hash.short_hex().len(), 8);
    }

    #[test]
    fn serde_uses_hex_string() {
        let hash = Hash::from_bytes([0x42; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash.to_hex()));
        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }

    #[test]
    fn serde_rejects_bad_hex() {
        let result: Result<Hash, _> = serde_json::from_str("\"zz\"");
        assert!(result.is_err());
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(Hash::from_bytes([0; 32]) < Hash::from_bytes([1; 32]));
    }
}
