use std::fmt;

use tel_chain::{ChainError, VerificationResult};
use tel_module::ModuleError;
use tel_services::ServiceError;
use tel_types::RecordError;

use crate::acl::AclError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Machine-readable classification of an [`EngineError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidRecord,
    HashMismatch,
    ChainLinkBroken,
    TimestampOutOfOrder,
    SignatureInvalid,
    EmptyRange,
    DuplicateModuleId,
    MissingDependency,
    ModuleRejected,
    /// A module failed a lifecycle transition or could not be built.
    Module,
    ServiceNotFound,
    ServiceAlreadyRegistered,
    ServiceWrongType,
    StorageError,
    Config,
    NotFound,
    CapacityExceeded,
    /// The chain failed verification as a whole.
    ChainInvalid,
    /// The requester holds no active write grant.
    AccessDenied,
    /// The grant store refused an operation.
    Acl,
    Lock,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRecord => "invalid_record",
            Self::HashMismatch => "hash_mismatch",
            Self::ChainLinkBroken => "chain_link_broken",
            Self::TimestampOutOfOrder => "timestamp_out_of_order",
            Self::SignatureInvalid => "signature_invalid",
            Self::EmptyRange => "empty_range",
            Self::DuplicateModuleId => "duplicate_module_id",
            Self::MissingDependency => "missing_dependency",
            Self::ModuleRejected => "module_rejected",
            Self::Module => "module",
            Self::ServiceNotFound => "service_not_found",
            Self::ServiceAlreadyRegistered => "service_already_registered",
            Self::ServiceWrongType => "service_wrong_type",
            Self::StorageError => "storage_error",
            Self::Config => "config",
            Self::NotFound => "not_found",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::ChainInvalid => "chain_invalid",
            Self::AccessDenied => "access_denied",
            Self::Acl => "acl",
            Self::Lock => "lock",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the ledger engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid record: {0}")]
    InvalidRecord(#[from] RecordError),

    #[error("record id already exists in ledger: {0}")]
    DuplicateRecordId(String),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("signing key required: ledger '{0}' is configured to require signatures")]
    SigningKeyRequired(String),

    #[error("chain verification failed with {} fault(s)", .0.fault_count())]
    ChainInvalid(Box<VerificationResult>),

    #[error("ledger is full: max_entries = {max}")]
    CapacityExceeded { max: usize },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("acl error: {0}")]
    Acl(#[from] AclError),

    #[error("access control is not enabled for ledger '{0}'")]
    AclDisabled(String),

    #[error("{} may not write to {resource}", .requester.as_deref().unwrap_or("anonymous requester"))]
    AccessDenied {
        requester: Option<String>,
        resource: String,
    },

    #[error("entry range {start}..{end} is outside the chain (len {len})")]
    RangeOutOfBounds { start: usize, end: usize, len: usize },

    #[error("ledger state lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRecord(_) | Self::DuplicateRecordId(_) => ErrorKind::InvalidRecord,
            Self::Chain(e) => match e {
                ChainError::InvalidRecord(_) | ChainError::MalformedRecord { .. } => {
                    ErrorKind::InvalidRecord
                }
                ChainError::HashMismatch { .. } => ErrorKind::HashMismatch,
                ChainError::ChainLinkBroken { .. } => ErrorKind::ChainLinkBroken,
                ChainError::TimestampOutOfOrder { .. } => ErrorKind::TimestampOutOfOrder,
                ChainError::SignatureInvalid { .. } | ChainError::SignatureMissing { .. } => {
                    ErrorKind::SignatureInvalid
                }
                ChainError::EmptyRange => ErrorKind::EmptyRange,
                ChainError::InvalidAnchor(_) => ErrorKind::ChainInvalid,
            },
            Self::Module(e) => match e {
                ModuleError::Rejected { .. } => ErrorKind::ModuleRejected,
                ModuleError::DuplicateModuleId(_) => ErrorKind::DuplicateModuleId,
                ModuleError::MissingDependency { .. } => ErrorKind::MissingDependency,
                ModuleError::UnknownModule(_)
                | ModuleError::Lifecycle { .. }
                | ModuleError::Config { .. } => ErrorKind::Module,
            },
            Self::Service(e) => match e {
                ServiceError::NotFound(_) => ErrorKind::ServiceNotFound,
                ServiceError::AlreadyRegistered(_) => ErrorKind::ServiceAlreadyRegistered,
                ServiceError::WrongType { .. } => ErrorKind::ServiceWrongType,
            },
            Self::Storage(_) => ErrorKind::StorageError,
            Self::Config(ConfigError::DuplicateModuleId(_)) => ErrorKind::DuplicateModuleId,
            Self::Config(_) | Self::SigningKeyRequired(_) | Self::AclDisabled(_) => {
                ErrorKind::Config
            }
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Acl(AclError::LockPoisoned) => ErrorKind::Lock,
            Self::Acl(_) => ErrorKind::Acl,
            Self::ChainInvalid(_) => ErrorKind::ChainInvalid,
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::NotFound(_) | Self::RangeOutOfBounds { .. } => ErrorKind::NotFound,
            Self::LockPoisoned => ErrorKind::Lock,
        }
    }

    /// The verification report, if this error came from a failed verification.
    pub fn verification(&self) -> Option<&VerificationResult> {
        match self {
            Self::ChainInvalid(result) => Some(result),
            _ => None,
        }
    }
}

impl From<VerificationResult> for EngineError {
    fn from(result: VerificationResult) -> Self {
        Self::ChainInvalid(Box::new(result))
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use tel_types::Hash;

    use super::*;

    #[test]
    fn kinds_follow_the_taxonomy() {
        assert_eq!(
            EngineError::from(RecordError::EmptyId).kind(),
            ErrorKind::InvalidRecord
        );
        assert_eq!(
            EngineError::from(ModuleError::rejected("proof", "nope")).kind(),
            ErrorKind::ModuleRejected
        );
        assert_eq!(
            EngineError::from(ServiceError::NotFound("db".into())).kind(),
            ErrorKind::ServiceNotFound
        );
        assert_eq!(
            EngineError::from(ChainError::HashMismatch {
                entry_id: "e".into(),
                computed: Hash::zero(),
                stored: Hash::zero(),
            })
            .kind(),
            ErrorKind::HashMismatch
        );
        assert_eq!(
            EngineError::from(ConfigError::DuplicateModuleId("proof".into())).kind(),
            ErrorKind::DuplicateModuleId
        );
        assert_eq!(EngineError::LockPoisoned.kind(), ErrorKind::Lock);
        assert_eq!(
            EngineError::from(AclError::InvalidGrant("x".into())).kind(),
            ErrorKind::Acl
        );
    }

    #[test]
    fn chain_invalid_exposes_the_report() {
        let report = VerificationResult {
            valid: false,
            hash_mismatches: 1,
            entries_checked: 2,
            ..VerificationResult::default()
        };
        let err = EngineError::from(report);
        assert_eq!(err.kind(), ErrorKind::ChainInvalid);
        assert_eq!(err.verification().map(|r| r.hash_mismatches), Some(1));
        assert_eq!(err.to_string(), "chain verification failed with 1 fault(s)");
    }

    #[test]
    fn access_denied_names_the_requester() {
        let err = EngineError::AccessDenied {
            requester: Some("oid:bob".into()),
            resource: "oid:ledger:main".into(),
        };
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert_eq!(err.to_string(), "oid:bob may not write to oid:ledger:main");

        let anonymous = EngineError::AccessDenied {
            requester: None,
            resource: "oid:ledger:main".into(),
        };
        assert!(anonymous.to_string().starts_with("anonymous requester"));
    }

    #[test]
    fn kind_has_a_stable_name() {
        assert_eq!(ErrorKind::ModuleRejected.to_string(), "module_rejected");
    }
}
