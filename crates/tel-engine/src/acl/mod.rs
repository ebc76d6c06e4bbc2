//! Access control for ledger writes.
//!
//! A [`Grant`] gives a subject one action on one resource, optionally until
//! an expiry time. When a ledger runs with an ACL, every append names a
//! requester and is refused unless that requester holds an active `write`
//! grant on the ledger's resource OID.

mod memory;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use memory::MemoryAcl;

/// Action checked before an append.
pub const WRITE: &str = "write";

/// Errors from ACL backends.
#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("invalid grant: {0}")]
    InvalidGrant(String),

    #[error("acl lock poisoned")]
    LockPoisoned,
}

/// Result alias for ACL operations.
pub type AclResult<T> = Result<T, AclError>;

/// Subject, resource and action: the key a grant is stored and checked under.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Permission {
    pub subject_oid: String,
    pub resource_oid: String,
    pub action: String,
}

impl Permission {
    pub fn new(
        subject_oid: impl Into<String>,
        resource_oid: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject_oid: subject_oid.into(),
            resource_oid: resource_oid.into(),
            action: action.into(),
        }
    }
}

/// A permission given to a subject.
///
/// Times are Unix seconds. A grant is active up to and including
/// `expires_at`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(flatten)]
    pub permission: Permission,
    pub granted_by: String,
    pub granted_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Grant {
    pub fn new(permission: Permission, granted_by: impl Into<String>, granted_at: u64) -> Self {
        Self {
            permission,
            granted_by: granted_by.into(),
            granted_at,
            expires_at: None,
            metadata: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: u64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn is_active(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |expires_at| now <= expires_at)
    }

    pub fn validate(&self) -> AclResult<()> {
        let p = &self.permission;
        for (field, value) in [
            ("subject_oid", &p.subject_oid),
            ("resource_oid", &p.resource_oid),
            ("action", &p.action),
            ("granted_by", &self.granted_by),
        ] {
            if value.trim().is_empty() {
                return Err(AclError::InvalidGrant(format!("{field} must not be empty")));
            }
        }
        if self.expires_at.is_some_and(|e| e < self.granted_at) {
            return Err(AclError::InvalidGrant("expires_at precedes granted_at".into()));
        }
        Ok(())
    }
}

/// Grant store consulted by the engine.
///
/// `now` is supplied by the caller so expiry is decided against one clock.
pub trait AclBackend: Send + Sync {
    /// Store `grant`, replacing any grant for the same permission.
    fn grant(&self, grant: Grant) -> AclResult<()>;

    /// Whether an active grant exists for `permission`.
    fn check(&self, permission: &Permission, now: u64) -> AclResult<bool>;

    /// Remove the grant for `permission`. Returns whether one existed.
    fn revoke(&self, permission: &Permission) -> AclResult<bool>;

    /// Active grants held by `subject_oid`.
    fn list_grants(&self, subject_oid: &str, now: u64) -> AclResult<Vec<Grant>>;

    fn clear(&self) -> AclResult<()>;
}
