//! Ledger modules.
//!
//! A module validates or normalises records before they are appended,
//! reacts after they are committed, and narrows queries over the streams it
//! claims. The [`ModuleRegistry`] holds modules in registration order, which
//! doubles as dependency order, and drives their lifecycle.

pub mod config;
pub mod error;
pub mod factory;
pub mod module;
pub mod modules;
pub mod registry;

pub use config::ModuleConfig;
pub use error::{LifecyclePhase, ModuleError};
pub use factory::ModuleFactory;
pub use module::{LedgerModule, ModuleContext, ModuleState};
pub use modules::{AssetModule, ProofModule};
pub use registry::{ModuleMeta, ModuleRegistry};
