use serde_json::Value;
use tel_types::{Hash, Record};
use tracing::debug;

use super::require_str;
use crate::config::ModuleConfig;
use crate::error::ModuleError;
use crate::module::LedgerModule;

/// Attestation records on the `proofs` stream.
///
/// Every proof names a subject and an issuer by OID; queries can narrow on
/// either.
#[derive(Debug, Clone)]
pub struct ProofModule {
    config: ModuleConfig,
}

impl ProofModule {
    pub const ID: &'static str = "proof";
    pub const STREAM: &'static str = "proofs";

    pub fn new(config: ModuleConfig) -> Self {
        Self { config }
    }

    fn check(&self, record: &Record) -> Result<(), ModuleError> {
        if record.stream != Self::STREAM {
            return Ok(());
        }
        require_str(self.id(), record, "subject_oid")?;
        require_str(self.id(), record, "issuer_oid")?;
        Ok(())
    }
}

impl LedgerModule for ProofModule {
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
        self.check(record)
    }

    fn after_append(&self, record: &Record, hash: &Hash) -> Result<(), ModuleError> {
        if record.stream == Self::STREAM {
            debug!(
                record_id = %record.id,
                hash = %hash.short_hex(),
                subject = record.payload_str("subject_oid").unwrap_or_default(),
                "proof committed"
            );
        }
        Ok(())
    }

    fn validate(&self, record: &Record) -> Result<(), ModuleError> {
        self.check(record)
    }

    fn query<'a>(&self, records: &[&'a Record], filters: &Value) -> Vec<&'a Record> {
        let subject = filters.get("subject_oid").and_then(Value::as_str);
        let issuer = filters.get("issuer_oid").and_then(Value::as_str);
        records
            .iter()
            .copied()
            .filter(|r| r.stream == Self::STREAM)
            .filter(|r| subject.map_or(true, |s| r.payload_str("subject_oid") == Some(s)))
            .filter(|r| issuer.map_or(true, |i| r.payload_str("issuer_oid") == Some(i)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn module() -> ProofModule {
        ProofModule::new(ModuleConfig::new("proof", "1.0.0", json!({})))
    }

    fn proof(id: &str, subject: &str, issuer: &str) -> Record {
        Record::new(
            id,
            "proofs",
            1_700_000_000_000,
            json!({"type": "proof", "subject_oid": subject, "issuer_oid": issuer}),
        )
    }

    #[test]
    fn identity_comes_from_config() {
        let m = module();
        assert_eq!(m.id(), "proof");
        assert_eq!(m.version(), "1.0.0");
        assert!(m.claims_stream("proofs"));
        assert!(!m.claims_stream("assets"));
    }

    #[test]
    fn complete_proof_is_accepted() {
        let mut record = proof("p-1", "oid:human:alice", "oid:org:acme");
        assert!(module().before_append(&mut record).is_ok());
        assert!(module().validate(&record).is_ok());
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut record = Record::new("p-1", "proofs", 1, json!({"type": "proof"}));
        let err = module().before_append(&mut record).unwrap_err();
        assert!(matches!(err, ModuleError::Rejected { ref module, .. } if module == "proof"));

        let mut record = Record::new("p-2", "proofs", 1, json!({"subject_oid": "oid:a"}));
        assert!(module().validate(&record).is_err());
        assert!(module().before_append(&mut record).is_err());

        let record = Record::new("p-3", "proofs", 1, json!({"subject_oid": 7, "issuer_oid": "x"}));
        assert!(module().validate(&record).is_err());
    }

    #[test]
    fn other_streams_are_ignored() {
        let mut record = Record::new("a-1", "assets", 1, json!({}));
        assert!(module().before_append(&mut record).is_ok());
    }

    #[test]
    fn query_filters_by_subject_and_issuer() {
        let records = [
            proof("p-1", "oid:alice", "oid:acme"),
            proof("p-2", "oid:bob", "oid:acme"),
            proof("p-3", "oid:alice", "oid:globex"),
            Record::new("a-1", "assets", 1, json!({"subject_oid": "oid:alice"})),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let m = module();

        let ids = |v: Vec<&Record>| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(m.query(&refs, &json!({"subject_oid": "oid:alice"}))), ["p-1", "p-3"]);
        assert_eq!(
            ids(m.query(&refs, &json!({"subject_oid": "oid:alice", "issuer_oid": "oid:acme"}))),
            ["p-1"]
        );
        assert_eq!(m.query(&refs, &json!({})).len(), 3);
    }
}
