use std::fmt;

/// Lifecycle transition that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    Init,
    Start,
    Stop,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Stop => "stop",
        })
    }
}

/// Errors raised by modules and the module registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModuleError {
    /// A module declined a record.
    #[error("module '{module}' rejected record: {reason}")]
    Rejected { module: String, reason: String },

    #[error("module already registered: {0}")]
    DuplicateModuleId(String),

    #[error("module '{module}' depends on unregistered module '{dependency}'")]
    MissingDependency { module: String, dependency: String },

    /// No constructor is known for the configured module id.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    #[error("module '{module}' {phase} failed: {reason}")]
    Lifecycle {
        module: String,
        phase: LifecyclePhase,
        reason: String,
    },

    #[error("module '{module}' configuration error: {reason}")]
    Config { module: String, reason: String },
}

impl ModuleError {
    pub fn rejected(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            module: module.into(),
            reason: reason.into(),
        }
    }

    pub fn lifecycle(
        module: impl Into<String>,
        phase: LifecyclePhase,
        reason: impl fmt::Display,
    ) -> Self {
        Self::Lifecycle {
            module: module.into(),
            phase,
            reason: reason.to_string(),
        }
    }
}
