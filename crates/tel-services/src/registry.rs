use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::ServiceError;

struct ServiceEntry {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
    owner: Option<String>,
}

/// Public description of a registered service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub type_name: &'static str,
    pub owner: Option<String>,
}

/// Name-keyed container of shared singletons.
///
/// Each name is registered at most once. Values are stored behind `Arc` so
/// a resolved handle stays valid after the registry is cleared.
#[derive(Default)]
pub struct ServiceRegistry {
    services: BTreeMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `value` under `name`, optionally owned by a module.
    ///
    /// Fails with [`ServiceError::AlreadyRegistered`] if the name is taken;
    /// the existing service is left in place.
    pub fn register<T>(
        &mut self,
        name: impl Into<String>,
        value: T,
        owner: Option<&str>,
    ) -> Result<(), ServiceError>
    where
        T: Any + Send + Sync,
    {
        self.register_arc(name, Arc::new(value), owner)
    }

    /// Register an already shared value.
    pub fn register_arc<T>(
        &mut self,
        name: impl Into<String>,
        value: Arc<T>,
        owner: Option<&str>,
    ) -> Result<(), ServiceError>
    where
        T: Any + Send + Sync,
    {
        let name = name.into();
        if self.services.contains_key(&name) {
            return Err(ServiceError::AlreadyRegistered(name));
        }
        debug!(service = %name, ty = type_name::<T>(), owner = ?owner, "service registered");
        self.services.insert(
            name,
            ServiceEntry {
                value,
                type_name: type_name::<T>(),
                owner: owner.map(str::to_owned),
            },
        );
        Ok(())
    }

    /// Look up `name` and downcast it to `T`.
    pub fn resolve<T>(&self, name: &str) -> Result<Arc<T>, ServiceError>
    where
        T: Any + Send + Sync,
    {
        let entry = self
            .services
            .get(name)
            .ok_or_else(|| ServiceError::NotFound(name.to_owned()))?;
        Arc::clone(&entry.value)
            .downcast::<T>()
            .map_err(|_| ServiceError::WrongType {
                name: name.to_owned(),
                expected: type_name::<T>(),
                actual: entry.type_name,
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.services.keys().map(String::as_str).collect()
    }

    pub fn info(&self, name: &str) -> Option<ServiceInfo> {
        self.services.get(name).map(|entry| ServiceInfo {
            name: name.to_owned(),
            type_name: entry.type_name,
            owner: entry.owner.clone(),
        })
    }

    /// Names of the services registered by `owner`.
    pub fn owned_by(&self, owner: &str) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, entry)| entry.owner.as_deref() == Some(owner))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Remove every service registered by `owner`, returning how many were removed.
    pub fn remove_owned_by(&mut self, owner: &str) -> usize {
        let before = self.services.len();
        self.services
            .retain(|_, entry| entry.owner.as_deref() != Some(owner));
        before - self.services.len()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.services.clear();
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.services.iter().map(|(k, v)| (k, v.type_name)))
            .finish()
    }
}
