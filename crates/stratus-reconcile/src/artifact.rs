//! Deployment artifact boundary
//!
//! Packaging (dependency installation, archive construction) is an
//! external collaborator. The engine only asks it to produce a deployable
//! artifact for an entry path plus a dependency list, and feeds the
//! resulting digest into the function spec so code changes show up in the
//! diff like any other attribute.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// A built deployment artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Content digest, stored as the function's `CodeSha256` attribute.
    pub digest: String,
}

/// Produces a deployable artifact for an entry path and dependency list.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn build(&self, entry: &Path, requires: &[String]) -> std::io::Result<Artifact>;
}
