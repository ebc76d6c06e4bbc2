use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-module configuration supplied when the ledger is built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module id; selects the constructor in the factory.
    pub id: String,
    pub version: String,
    /// Opaque module-specific settings.
    #[serde(default = "empty_object")]
    pub config: Value,
    /// Ids of modules that must be registered before this one.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ModuleConfig {
    pub fn new(id: impl Into<String>, version: impl Into<String>, config: Value) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            config,
            depends_on: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.depends_on.push(id.into());
        self
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}
