/// Errors from service registration and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service not found: {0}")]
    NotFound(String),

    #[error("service already registered: {0}")]
    AlreadyRegistered(String),

    #[error("service '{name}' has type {actual}, requested {expected}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
}
