use serde_json::{json, Value};
use tel_types::{Hash, Record};
use tracing::debug;

use super::require_str;
use crate::config::ModuleConfig;
use crate::error::ModuleError;
use crate::module::LedgerModule;

/// Ownership records on the `assets` stream.
///
/// `owner_oid` is required and owned by this module: surrounding whitespace
/// is stripped before the record is hashed.
#[derive(Debug, Clone)]
pub struct AssetModule {
    config: ModuleConfig,
}

impl AssetModule {
    pub const ID: &'static str = "asset";
    pub const STREAM: &'static str = "assets";

    pub fn new(config: ModuleConfig) -> Self {
        Self { config }
    }
}

impl LedgerModule for AssetModule {
    fn id(&self) -> &str {
        &self.config.id
    }

    fn version(&self) -> &str {
        &self.config.version
    }

    fn depends_on(&self) -> &[String] {
        &self.config.depends_on
    }

    fn claims_stream(&self, stream: &str) -> bool {
        stream == Self::STREAM
    }

    fn before_append(&self, record: &mut Record) -> Result<(), ModuleError> {
        if record.stream != Self::STREAM {
            return Ok(());
        }
        let owner = require_str(self.id(), record, "owner_oid")?;
        let trimmed = owner.trim();
        if trimmed.len() != owner.len() {
            let trimmed = trimmed.to_owned();
            record.set_payload_field("owner_oid", json!(trimmed));
        }
        Ok(())
    }

    fn after_append(&self, record: &Record, hash: &Hash) -> Result<(), ModuleError> {
        if record.stream == Self::STREAM {
            debug!(record_id = %record.id, hash = %hash.short_hex(), "asset committed");
        }
        Ok(())
    }

    fn validate(&self, record: &Record) -> Result<(), ModuleError> {
        if record.stream != Self::STREAM {
            return Ok(());
        }
        require_str(self.id(), record, "owner_oid").map(|_| ())
    }

    fn query<'a>(&self, records: &[&'a Record], filters: &Value) -> Vec<&'a Record> {
        let owner = filters.get("owner_oid").and_then(Value::as_str);
        records
            .iter()
            .copied()
            .filter(|r| r.stream == Self::STREAM)
            .filter(|r| owner.map_or(true, |o| r.payload_str("owner_oid") == Some(o)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> AssetModule {
        AssetModule::new(ModuleConfig::new("asset", "2.0.0", json!({})))
    }

    #[test]
    fn owner_is_required() {
        let mut record = Record::new("a-1", "assets", 1, json!({"name": "deed"}));
        assert!(module().before_append(&mut record).is_err());
        assert!(module().validate(&record).is_err());

        let blank = Record::new("a-2", "assets", 1, json!({"owner_oid": "   "}));
        assert!(module().validate(&blank).is_err());
    }

    #[test]
    fn owner_is_trimmed_before_append() {
        let mut record = Record::new("a-1", "assets", 1, json!({"owner_oid": "  oid:alice \n"}));
        module().before_append(&mut record).unwrap();
        assert_eq!(record.payload_str("owner_oid"), Some("oid:alice"));
    }

    #[test]
    fn clean_owner_is_left_alone() {
        let original = Record::new("a-1", "assets", 1, json!({"owner_oid": "oid:alice"}));
        let mut record = original.clone();
        module().before_append(&mut record).unwrap();
        assert_eq!(record, original);
    }

    #[test]
    fn query_filters_by_owner() {
        let records = [
            Record::new("a-1", "assets", 1, json!({"owner_oid": "oid:alice"})),
            Record::new("a-2", "assets", 2, json!({"owner_oid": "oid:bob"})),
            Record::new("p-1", "proofs", 3, json!({"owner_oid": "oid:alice"})),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let hits = module().query(&refs, &json!({"owner_oid": "oid:alice"}));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a-1");
    }
}
