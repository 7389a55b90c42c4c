use stratus_cloud::RetryPolicy;
use stratus_cloud_memory::MemoryCloud;
use stratus_core::{Mode, ResourceKind};
use stratus_reconcile::{PassReport, Reconciler, StepOutcome};

pub async fn run(
    cloud: &MemoryCloud,
    policy: &RetryPolicy,
    kind: ResourceKind,
    name: &str,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let reconciler = Reconciler::with_policy(cloud, policy.clone());
    let outcome = reconciler.remove(kind, name, mode).await?;

    Ok(PassReport {
        steps: vec![StepOutcome {
            label: format!("{} {}", kind, name),
            outcome,
        }],
    })
}
