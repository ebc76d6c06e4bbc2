use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tel_module::ModuleConfig;

/// Errors from loading or validating a [`LedgerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ledger config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid ledger config: {0}")]
    Invalid(String),

    #[error("module '{0}' is configured more than once")]
    DuplicateModuleId(String),
}

/// Which access-control backend guards appends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AclMode {
    /// Appends are not checked.
    #[default]
    None,
    /// Grants are kept in memory for the engine's lifetime.
    InMemory,
}

/// Configuration of one ledger instance.
///
/// ```toml
/// id = "main"
/// max_entries = 100000
/// require_signatures = false
/// acl = "in_memory"
///
/// [[modules]]
/// id = "proof"
/// version = "1.0.0"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub id: String,
    /// Hard cap on the number of entries; `None` is unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
    /// Refuse to start without a signing key and check signatures on load.
    #[serde(default)]
    pub require_signatures: bool,
    #[serde(default)]
    pub acl: AclMode,
    /// Modules to instantiate, in registration order.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl LedgerConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_entries: None,
            require_signatures: false,
            acl: AclMode::None,
            modules: Vec::new(),
        }
    }

    pub fn with_module(mut self, module: ModuleConfig) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    pub fn with_required_signatures(mut self) -> Self {
        self.require_signatures = true;
        self
    }

    pub fn with_acl(mut self, acl: AclMode) -> Self {
        self.acl = acl;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML file. Does not validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger id must not be empty".into()));
        }
        if self.max_entries == Some(0) {
            return Err(ConfigError::Invalid("max_entries must be at least 1".into()));
        }
        let mut seen = HashSet::new();
        for module in &self.modules {
            if module.id.is_empty() {
                return Err(ConfigError::Invalid("module id must not be empty".into()));
            }
            if !seen.insert(module.id.as_str()) {
                return Err(ConfigError::DuplicateModuleId(module.id.clone()));
            }
        }
        Ok(())
    }
}
