//! Control-plane error taxonomy

use stratus_core::ResourceKind;
use thiserror::Error;

/// Typed errors a control-plane call can raise.
///
/// Which of these are transient is a property of the call site, not the
/// error: a `NotFound` right after a create is eventual consistency, a
/// `NotFound` on a dependency lookup is a user error. Call sites declare
/// their retryable kinds when wrapping a call in the retry policy.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("not found: {entity}")]
    NotFound { entity: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("throttled: {0}")]
    Throttled(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A non-unique lookup key matched more than one resource.
    #[error("ambiguous lookup for {what}: matched {}", matches.join(", "))]
    Ambiguous { what: String, matches: Vec<String> },
}

/// Discriminant of `CloudError`, used to declare retryable kinds per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    Throttled,
    MalformedInput,
    Unauthorized,
    Ambiguous,
}

impl CloudError {
    pub fn not_found(kind: ResourceKind, name: &str) -> Self {
        CloudError::NotFound {
            entity: format!("{} {}", kind, name),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::NotFound { .. } => ErrorKind::NotFound,
            CloudError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            CloudError::Conflict(_) => ErrorKind::Conflict,
            CloudError::Throttled(_) => ErrorKind::Throttled,
            CloudError::MalformedInput(_) => ErrorKind::MalformedInput,
            CloudError::Unauthorized(_) => ErrorKind::Unauthorized,
            CloudError::Ambiguous { .. } => ErrorKind::Ambiguous,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
