//! Reconciliation error taxonomy
//!
//! Transient control-plane errors never surface from here directly; they
//! are absorbed by the retry policy or converted into the same typed
//! `CloudError` once the budget runs out. Everything below is structural:
//! retrying cannot fix it, so it propagates immediately with enough
//! context (kind, name, offending path) to act on.

use stratus_cloud::CloudError;
use stratus_core::{DiffError, ResourceKind, SpecError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    /// Converging this field would require replacing the resource.
    #[error("{kind} {name}: {source}")]
    ImmutableField {
        kind: ResourceKind,
        name: String,
        #[source]
        source: DiffError,
    },

    /// A referenced upstream resource does not exist.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A non-unique lookup matched more than one candidate.
    #[error("ambiguous match for {what}: {}", matches.join(", "))]
    AmbiguousMatch { what: String, matches: Vec<String> },

    /// An existing binding disagrees with the requested attributes on a
    /// field that cannot change after creation.
    #[error("binding for {resource} diverges at {path}: existing {observed}, requested {desired}")]
    BindingMismatch {
        resource: String,
        path: String,
        desired: String,
        observed: String,
    },

    /// A schedule rule's single binding points at a different target.
    #[error("schedule rule {rule} is bound to a foreign target: {target}")]
    ForeignScheduleTarget { rule: String, target: String },

    #[error(transparent)]
    Cloud(#[from] CloudError),
}

impl ReconcileError {
    pub(crate) fn immutable(kind: ResourceKind, name: &str, source: DiffError) -> Self {
        ReconcileError::ImmutableField {
            kind,
            name: name.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
