use crate::spec_file::{SpecFile, read_json};
use std::path::Path;
use stratus_cloud::RetryPolicy;
use stratus_cloud_memory::MemoryCloud;
use stratus_core::Mode;
use stratus_reconcile::{PassReport, Reconciler, StepOutcome};

pub async fn run(
    cloud: &MemoryCloud,
    policy: &RetryPolicy,
    path: &Path,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let file: SpecFile = read_json(path).await?;
    let spec = file.into_spec().await?;

    let reconciler = Reconciler::with_policy(cloud, policy.clone());
    let ensured = reconciler.ensure(&spec, mode).await?;

    Ok(PassReport {
        steps: vec![StepOutcome {
            label: format!("{} {}", spec.kind, spec.name),
            outcome: ensured.outcome,
        }],
    })
}
