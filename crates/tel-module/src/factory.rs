use std::collections::BTreeMap;

use crate::config::ModuleConfig;
use crate::error::ModuleError;
use crate::module::LedgerModule;
use crate::modules::{AssetModule, ProofModule};

type Constructor =
    Box<dyn Fn(&ModuleConfig) -> Result<Box<dyn LedgerModule>, ModuleError> + Send + Sync>;

/// Builds module instances from their configuration, keyed on `ModuleConfig::id`.
#[derive(Default)]
pub struct ModuleFactory {
    constructors: BTreeMap<String, Constructor>,
}

impl ModuleFactory {
    /// A factory with no constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that knows the `proof` and `asset` modules.
    pub fn with_builtins() -> Self {
        let mut factory = Self::new();
        factory.register(ProofModule::ID, |cfg| {
            Ok(Box::new(ProofModule::new(cfg.clone())))
        });
        factory.register(AssetModule::ID, |cfg| {
            Ok(Box::new(AssetModule::new(cfg.clone())))
        });
        factory
    }

    /// Add or replace the constructor for `id`.
    pub fn register<F>(&mut self, id: impl Into<String>, constructor: F)
    where
        F: Fn(&ModuleConfig) -> Result<Box<dyn LedgerModule>, ModuleError> + Send + Sync + 'static,
    {
        self.constructors.insert(id.into(), Box::new(constructor));
    }

    pub fn knows(&self, id: &str) -> bool {
        self.constructors.contains_key(id)
    }

    /// Known module ids in sorted order.
    pub fn ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn create(&self, config: &ModuleConfig) -> Result<Box<dyn LedgerModule>, ModuleError> {
        let constructor = self
            .constructors
            .get(&config.id)
            .ok_or_else(|| ModuleError::UnknownModule(config.id.clone()))?;
        constructor(config)
    }
}

impl std::fmt::Debug for ModuleFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactory")
            .field("modules", &self.ids())
            .finish()
    }
}
