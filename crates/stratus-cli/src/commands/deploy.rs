use crate::spec_file::{PlanFile, read_json};
use std::path::Path;
use stratus_cloud::{Env, RetryPolicy};
use stratus_cloud_memory::MemoryCloud;
use stratus_core::Mode;
use stratus_reconcile::{PassReport, run_pass, teardown};

pub async fn run(
    cloud: &MemoryCloud,
    env: &Env,
    policy: &RetryPolicy,
    path: &Path,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let file: PlanFile = read_json(path).await?;
    let plan = file.into_plan().await?;
    Ok(run_pass(cloud, env, policy, &plan, mode).await?)
}

pub async fn down(
    cloud: &MemoryCloud,
    policy: &RetryPolicy,
    path: &Path,
    mode: Mode,
) -> anyhow::Result<PassReport> {
    let file: PlanFile = read_json(path).await?;
    let plan = file.into_plan().await?;
    Ok(teardown(cloud, policy, &plan, mode).await?)
}
