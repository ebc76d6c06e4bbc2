use std::any::Any;
use std::fmt;

use serde_json::Value;
use tel_services::{ServiceError, ServiceRegistry};
use tel_types::{Hash, Record};

use crate::error::ModuleError;

/// Lifecycle state of a registered module.
///
/// Transitions only move forward: `Registered -> Initialized -> Started ->
/// Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    Registered,
    Initialized,
    Started,
    Stopped,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Registered => "registered",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Stopped => "stopped",
        })
    }
}

/// What a module sees during a lifecycle transition.
pub struct ModuleContext<'a> {
    pub ledger_id: &'a str,
    pub module_id: &'a str,
    /// The module's own configuration value.
    pub config: &'a Value,
    pub services: &'a mut ServiceRegistry,
}

impl ModuleContext<'_> {
    /// Publish a service owned by the current module.
    pub fn provide<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), ServiceError>
    where
        T: Any + Send + Sync,
    {
        self.services.register(name, value, Some(self.module_id))
    }
}

/// A pluggable unit that validates, normalises, observes and filters records.
///
/// Implementations must be cheap in `before_append`: it runs inside the
/// ledger's single-writer section.
pub trait LedgerModule: Send + Sync {
    fn id(&self) -> &str;

    fn version(&self) -> &str;

    /// Ids of modules that must be registered before this one.
    fn depends_on(&self) -> &[String] {
        &[]
    }

    /// Whether this module owns records of `stream` for query narrowing.
    fn claims_stream(&self, _stream: &str) -> bool {
        false
    }

    fn init(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    fn start(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    fn stop(&mut self, _ctx: &mut ModuleContext<'_>) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Reject `record` or normalise fields this module owns.
    fn before_append(&self, record: &mut Record) -> Result<(), ModuleError>;

    /// React to a committed record. Failures are reported, never rolled back.
    fn after_append(&self, _record: &Record, _hash: &Hash) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Stateless check usable outside the append path.
    fn validate(&self, record: &Record) -> Result<(), ModuleError>;

    /// The subset of `records` this module considers a match for `filters`,
    /// in input order.
    fn query<'a>(&self, records: &[&'a Record], filters: &Value) -> Vec<&'a Record>;
}

impl fmt::Debug for dyn LedgerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerModule")
            .field("id", &self.id())
            .field("version", &self.version())
            .finish()
    }
}
