//! Prebuilt artifact source
//!
//! Packaging is out of scope for the CLI; the entry path is expected to be
//! an already-built archive. Hashing it feeds code changes into the diff
//! the same way any attribute change would surface.

use async_trait::async_trait;
use std::path::Path;
use stratus_reconcile::{Artifact, ArtifactSource};

pub struct PrebuiltArtifact;

#[async_trait]
impl ArtifactSource for PrebuiltArtifact {
    async fn build(&self, entry: &Path, requires: &[String]) -> std::io::Result<Artifact> {
        if !requires.is_empty() {
            tracing::debug!(
                "artifact {} is prebuilt; {} requirement(s) assumed bundled",
                entry.display(),
                requires.len()
            );
        }
        let bytes = tokio::fs::read(entry).await?;
        Ok(Artifact {
            path: entry.to_path_buf(),
            digest: blake3::hash(&bytes).to_hex().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn digest_is_stable_per_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        tokio::fs::write(&path, b"payload").await.unwrap();

        let first = PrebuiltArtifact.build(&path, &[]).await.unwrap();
        let second = PrebuiltArtifact.build(&path, &[]).await.unwrap();
        assert_eq!(first.digest, second.digest);

        tokio::fs::write(&path, b"changed").await.unwrap();
        let third = PrebuiltArtifact.build(&path, &[]).await.unwrap();
        assert_ne!(first.digest, third.digest);
    }
}
