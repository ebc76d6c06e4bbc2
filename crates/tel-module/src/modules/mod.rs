//! Built-in modules.

pub mod asset;
pub mod proof;

pub use asset::AssetModule;
pub use proof::ProofModule;

use tel_types::Record;

use crate::error::ModuleError;

/// Require a non-empty string field in the record payload.
pub(crate) fn require_str<'r>(
    module: &str,
    record: &'r Record,
    field: &str,
) -> Result<&'r str, ModuleError> {
    match record.payload_str(field) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(ModuleError::rejected(
            module,
            format!("'{field}' must not be empty"),
        )),
        None => Err(ModuleError::rejected(
            module,
            format!("{} record must have string '{field}'", record.stream),
        )),
    }
}
