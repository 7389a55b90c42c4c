//! On-disk spec and plan formats
//!
//! JSON files deserialize into these shapes and convert into validated
//! engine types; validation errors surface before any control-plane call.

use crate::artifact::PrebuiltArtifact;
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use stratus_core::{AttrMap, AttrValue, ResourceKind, ResourceSpec};
use stratus_reconcile::{ArtifactSource, DeployPlan, RoleGrants, TriggerBinding};

#[derive(Debug, Deserialize)]
pub struct SpecFile {
    pub kind: ResourceKind,
    pub name: String,

    /// Table key-schema columns, `name:type:keytype`.
    #[serde(default)]
    pub columns: Vec<String>,

    #[serde(default)]
    pub attributes: AttrMap,

    /// Prebuilt artifact for a function; its digest becomes `CodeSha256`.
    #[serde(default)]
    pub code: Option<PathBuf>,

    #[serde(default)]
    pub requires: Vec<String>,
}

impl SpecFile {
    pub async fn into_spec(self) -> anyhow::Result<ResourceSpec> {
        let mut attributes = self.attributes;

        if let Some(code) = &self.code {
            anyhow::ensure!(
                self.kind == ResourceKind::Function,
                "code only applies to functions, not {}",
                self.kind
            );
            let artifact = PrebuiltArtifact
                .build(code, &self.requires)
                .await
                .with_context(|| format!("reading artifact {}", code.display()))?;
            attributes.insert("CodeSha256".to_string(), AttrValue::Str(artifact.digest));
        }

        let spec = if self.kind == ResourceKind::Table && !self.columns.is_empty() {
            let columns: Vec<&str> = self.columns.iter().map(String::as_str).collect();
            ResourceSpec::table(self.name, &columns, attributes)?
        } else {
            ResourceSpec::new(self.kind, self.name, attributes)?
        };
        Ok(spec)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanFile {
    #[serde(default)]
    pub resources: Vec<SpecFile>,

    #[serde(default)]
    pub grants: Option<RoleGrants>,

    #[serde(default)]
    pub triggers: Vec<TriggerBinding>,
}

impl PlanFile {
    pub async fn into_plan(self) -> anyhow::Result<DeployPlan> {
        let mut resources = Vec::with_capacity(self.resources.len());
        for spec in self.resources {
            resources.push(spec.into_spec().await?);
        }
        Ok(DeployPlan {
            resources,
            grants: self.grants,
            triggers: self.triggers,
        })
    }
}

pub async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
