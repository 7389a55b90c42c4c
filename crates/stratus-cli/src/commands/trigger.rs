use crate::spec_file::read_json;
use std::path::Path;
use stratus_cloud::{Env, RetryPolicy};
use stratus_cloud_memory::MemoryCloud;
use stratus_core::Mode;
use stratus_reconcile::{PassReport, StepOutcome, TriggerBinder, TriggerBinding};

pub async fn run(
    cloud: &MemoryCloud,
    env: &Env,
    policy: &RetryPolicy,
    path: &Path,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let binding: TriggerBinding = read_json(path).await?;

    let binder = TriggerBinder::with_policy(cloud, env.clone(), policy.clone());
    let outcome = binder.reconcile_trigger(&binding, mode).await?;

    Ok(PassReport {
        steps: vec![StepOutcome {
            label: format!("trigger {} -> {}", binding.source.label(), binding.target),
            outcome,
        }],
    })
}
