use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{AclBackend, AclError, AclResult, Grant, Permission};

/// In-memory grant store.
#[derive(Debug, Default)]
pub struct MemoryAcl {
    grants: RwLock<BTreeMap<Permission, Grant>>,
}

impl MemoryAcl {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AclBackend for MemoryAcl {
    fn grant(&self, grant: Grant) -> AclResult<()> {
        grant.validate()?;
        self.grants
            .write()
            .map_err(|_| AclError::LockPoisoned)?
            .insert(grant.permission.clone(), grant);
        Ok(())
    }

    fn check(&self, permission: &Permission, now: u64) -> AclResult<bool> {
        let grants = self.grants.read().map_err(|_| AclError::LockPoisoned)?;
        Ok(grants.get(permission).is_some_and(|g| g.is_active(now)))
    }

    fn revoke(&self, permission: &Permission) -> AclResult<bool> {
        Ok(self
            .grants
            .write()
            .map_err(|_| AclError::LockPoisoned)?
            .remove(permission)
            .is_some())
    }

    fn list_grants(&self, subject_oid: &str, now: u64) -> AclResult<Vec<Grant>> {
        let grants = self.grants.read().map_err(|_| AclError::LockPoisoned)?;
        Ok(grants
            .values()
            .filter(|g| g.permission.subject_oid == subject_oid && g.is_active(now))
            .cloned()
            .collect())
    }

    fn clear(&self) -> AclResult<()> {
        self.grants
            .write()
            .map_err(|_| AclError::LockPoisoned)?
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::WRITE;

    fn alice_write() -> Permission {
        Permission::new("oid:alice", "oid:ledger:main", WRITE)
    }

    #[test]
    fn check_requires_a_grant() {
        let acl = MemoryAcl::new();
        assert!(!acl.check(&alice_write(), 10).unwrap());

        acl.grant(Grant::new(alice_write(), "oid:admin", 1)).unwrap();
        assert!(acl.check(&alice_write(), 10).unwrap());

        let read = Permission::new("oid:alice", "oid:ledger:main", "read");
        assert!(!acl.check(&read, 10).unwrap());
    }

    #[test]
    fn expired_grants_are_ignored() {
        let acl = MemoryAcl::new();
        acl.grant(Grant::new(alice_write(), "oid:admin", 1).expiring_at(100))
            .unwrap();

        assert!(acl.check(&alice_write(), 100).unwrap());
        assert!(!acl.check(&alice_write(), 101).unwrap());
        assert!(acl.list_grants("oid:alice", 101).unwrap().is_empty());
        assert_eq!(acl.list_grants("oid:alice", 50).unwrap().len(), 1);
    }

    #[test]
    fn revoke_removes_and_reports() {
        let acl = MemoryAcl::new();
        acl.grant(Grant::new(alice_write(), "oid:admin", 1)).unwrap();

        assert!(acl.revoke(&alice_write()).unwrap());
        assert!(!acl.revoke(&alice_write()).unwrap());
        assert!(!acl.check(&alice_write(), 10).unwrap());
    }

    #[test]
    fn regrant_replaces_and_invalid_grants_are_refused() {
        let acl = MemoryAcl::new();
        acl.grant(Grant::new(alice_write(), "oid:admin", 1).expiring_at(5))
            .unwrap();
        acl.grant(Grant::new(alice_write(), "oid:admin", 6)).unwrap();
        assert!(acl.check(&alice_write(), 1_000).unwrap());
        assert_eq!(acl.list_grants("oid:alice", 1_000).unwrap().len(), 1);

        let blank = Grant::new(Permission::new("", "oid:ledger:main", WRITE), "oid:admin", 1);
        assert!(acl.grant(blank).is_err());

        acl.clear().unwrap();
        assert!(acl.list_grants("oid:alice", 1_000).unwrap().is_empty());
    }
}
