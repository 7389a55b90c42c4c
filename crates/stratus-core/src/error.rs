//! Spec and diff error types

use crate::attr::AttrValue;
use crate::kind::ResourceKind;
use thiserror::Error;

/// Errors raised while constructing or validating a resource spec.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("unknown attribute for {kind}: {path}")]
    UnknownAttribute { kind: ResourceKind, path: String },

    #[error("invalid value for {path}: {message}")]
    InvalidValue { path: String, message: String },

    #[error("invalid column definition: {0} (expected name:type:keytype)")]
    InvalidColumn(String),

    #[error("read and write capacity must both be provisioned, or neither for on-demand")]
    PartialThroughput,
}

/// Errors raised by the diff engine.
#[derive(Error, Debug)]
pub enum DiffError {
    /// The desired spec changes a field that cannot change on an existing
    /// resource. Raised before any additive entry is computed so partial
    /// application is never attempted.
    #[error("immutable field {path} cannot change on an existing resource ({} -> {})",
            display_opt(observed), display_opt(desired))]
    ImmutableField {
        path: String,
        desired: Option<AttrValue>,
        observed: Option<AttrValue>,
    },
}

fn display_opt(value: &Option<AttrValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "<absent>".to_string(),
    }
}
