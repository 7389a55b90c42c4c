//! Pass orchestration
//!
//! One pass converges one deploy plan in a fixed order: base resources in
//! caller-supplied order, then grants, then triggers — dependents always
//! after what they reference. Teardown unwinds the same plan in reverse.
//! Everything runs sequentially; the only suspension points are the
//! control-plane calls themselves.

use crate::error::{ReconcileError, Result};
use crate::grants::{GrantReport, GrantSpec, Grantor, KeyGrantOutcome};
use crate::reconciler::Reconciler;
use crate::triggers::{TriggerBinder, TriggerBinding, TriggerSource};
use serde::{Deserialize, Serialize};
use stratus_cloud::{CloudClient, Env, Identity, RetryPolicy, SubKind};
use stratus_core::{AttrValue, Diff, Mode, Outcome, ResourceKind, ResourceSpec};

/// Grants carried by a plan, all owned by one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleGrants {
    pub role: String,

    /// Inline allow statements.
    #[serde(default)]
    pub allows: Vec<GrantSpec>,

    /// Managed policy names to attach.
    #[serde(default)]
    pub policies: Vec<String>,

    /// Encryption key whose policy should allow the role to use it.
    #[serde(default)]
    pub key: Option<String>,
}

/// A full deploy plan: resources in dependency order, grants, triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployPlan {
    pub resources: Vec<ResourceSpec>,

    #[serde(default)]
    pub grants: Option<RoleGrants>,

    #[serde(default)]
    pub triggers: Vec<TriggerBinding>,
}

/// One labeled step of a pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub label: String,
    pub outcome: Outcome,
}

/// Everything a pass did (or would do, in preview).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub steps: Vec<StepOutcome>,
}

impl PassReport {
    fn push(&mut self, label: impl Into<String>, outcome: Outcome) {
        self.steps.push(StepOutcome {
            label: label.into(),
            outcome,
        });
    }

    pub fn changed(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_change()).count()
    }
}

/// Converge one plan. A fatal error aborts the remaining steps of this
/// plan — dependents of a failed resource cannot proceed — but the unit
/// of atomicity stays one resource: whatever already converged stays
/// converged.
pub async fn run_pass<C: CloudClient + ?Sized>(
    client: &C,
    env: &Env,
    policy: &RetryPolicy,
    plan: &DeployPlan,
    mode: Mode,
) -> Result<PassReport> {
    let reconciler = Reconciler::with_policy(client, policy.clone());
    let mut report = PassReport::default();

    for spec in &plan.resources {
        let ensured = reconciler.ensure(spec, mode).await?;
        report.push(format!("{} {}", spec.kind, spec.name), ensured.outcome);
    }

    if let Some(grants) = &plan.grants {
        reconcile_role_grants(client, policy, grants, mode, &mut report).await?;
    }

    let binder = TriggerBinder::with_policy(client, env.clone(), policy.clone());
    for binding in &plan.triggers {
        let outcome = binder.reconcile_trigger(binding, mode).await?;
        report.push(
            format!("trigger {} -> {}", binding.source.label(), binding.target),
            outcome,
        );
    }

    Ok(report)
}

async fn reconcile_role_grants<C: CloudClient + ?Sized>(
    client: &C,
    policy: &RetryPolicy,
    grants: &RoleGrants,
    mode: Mode,
    report: &mut PassReport,
) -> Result<()> {
    let grantor = Grantor::with_policy(client, policy.clone());
    let role = grants.role.as_str();

    let observed = match client.describe(ResourceKind::Role, role).await {
        Ok(observed) => Some(observed),
        Err(err) if err.is_not_found() => None,
        Err(err) => return Err(err.into()),
    };

    let Some(observed) = observed else {
        if mode.is_preview() {
            // The role itself is only planned; grants follow once it exists.
            report.push(format!("grants {}", role), Outcome::WouldCreate);
            return Ok(());
        }
        return Err(ReconcileError::MissingDependency(format!("role {}", role)));
    };

    let inline = grantor.reconcile_grants(role, &grants.allows, mode).await?;
    report.push(format!("allows {}", role), grant_outcome(&inline, mode));

    let attached = grantor
        .reconcile_attached(role, &grants.policies, mode)
        .await?;
    report.push(format!("policies {}", role), grant_outcome(&attached, mode));

    if let Some(key) = &grants.key {
        let outcome = grantor
            .ensure_key_grant(key, &observed.identity, mode)
            .await?;
        report.push(
            format!("key grant {} -> {}", key, role),
            match outcome {
                KeyGrantOutcome::WouldGrant => Outcome::WouldUpdate {
                    diff: Diff::default(),
                },
                KeyGrantOutcome::Granted => Outcome::Updated {
                    diff: Diff::default(),
                },
                KeyGrantOutcome::AlreadyGranted => Outcome::Unchanged,
            },
        );
    }

    Ok(())
}

fn grant_outcome(report: &GrantReport, mode: Mode) -> Outcome {
    if report.is_noop() {
        Outcome::Unchanged
    } else if mode.is_preview() {
        Outcome::WouldUpdate {
            diff: Diff::default(),
        }
    } else {
        Outcome::Updated {
            diff: Diff::default(),
        }
    }
}

/// Unwind a plan in reverse: triggers, then grants, then base resources
/// (deleted in reverse declaration order). Deletion must unwind the
/// wiring first to avoid dangling references.
pub async fn teardown<C: CloudClient + ?Sized>(
    client: &C,
    policy: &RetryPolicy,
    plan: &DeployPlan,
    mode: Mode,
) -> Result<PassReport> {
    let reconciler = Reconciler::with_policy(client, policy.clone());
    let grantor = Grantor::with_policy(client, policy.clone());
    let mut report = PassReport::default();

    for binding in &plan.triggers {
        let outcome = unwind_trigger(client, binding, mode).await?;
        report.push(
            format!("trigger {} -> {}", binding.source.label(), binding.target),
            outcome,
        );
    }

    if let Some(grants) = &plan.grants {
        let role = grants.role.as_str();
        match client.describe(ResourceKind::Role, role).await {
            Ok(_) => {
                let inline = grantor.reconcile_grants(role, &[], mode).await?;
                let attached = grantor.reconcile_attached(role, &[], mode).await?;
                let outcome = if inline.is_noop() && attached.is_noop() {
                    Outcome::Unchanged
                } else if mode.is_preview() {
                    Outcome::WouldDelete
                } else {
                    Outcome::Deleted
                };
                report.push(format!("grants {}", role), outcome);
            }
            Err(err) if err.is_not_found() => {
                report.push(format!("grants {}", role), Outcome::Absent);
            }
            Err(err) => return Err(err.into()),
        }
    }

    for spec in plan.resources.iter().rev() {
        let outcome = reconciler.remove(spec.kind, &spec.name, mode).await?;
        report.push(format!("{} {}", spec.kind, spec.name), outcome);
    }

    Ok(report)
}

/// Remove the binding a trigger created; the gateway API itself is left
/// in place, only this engine's bindings are unwound.
async fn unwind_trigger<C: CloudClient + ?Sized>(
    client: &C,
    binding: &TriggerBinding,
    mode: Mode,
) -> Result<Outcome> {
    let function = &binding.target;

    let target = match client.describe(ResourceKind::Function, function).await {
        Ok(observed) => observed.identity,
        Err(err) if err.is_not_found() => return Ok(Outcome::Absent),
        Err(err) => return Err(err.into()),
    };

    match &binding.source {
        TriggerSource::Stream { .. } | TriggerSource::Queue { .. } => {
            let source_arn = match &binding.source {
                TriggerSource::Stream { table } => {
                    match client.describe(ResourceKind::Table, table).await {
                        Ok(observed) => observed
                            .attributes
                            .get("LatestStreamArn")
                            .and_then(AttrValue::as_str)
                            .map(Identity::new),
                        Err(err) if err.is_not_found() => None,
                        Err(err) => return Err(err.into()),
                    }
                }
                TriggerSource::Queue { name } => match client.queue_arn(name).await {
                    Ok(identity) => Some(identity),
                    Err(err) if err.is_not_found() => None,
                    Err(err) => return Err(err.into()),
                },
                _ => None,
            };
            let Some(source_arn) = source_arn else {
                return Ok(Outcome::Absent);
            };
            let bindings = client
                .list_sub(ResourceKind::Function, function, SubKind::EventBinding)
                .await?;
            let matched: Vec<&str> = bindings
                .iter()
                .filter(|sub| {
                    sub.attributes
                        .get("EventSourceArn")
                        .and_then(AttrValue::as_str)
                        == Some(source_arn.arn())
                })
                .map(|sub| sub.id.as_str())
                .collect();
            if matched.is_empty() {
                return Ok(Outcome::Absent);
            }
            if mode.is_preview() {
                return Ok(Outcome::WouldDelete);
            }
            for id in matched {
                client
                    .delete_sub(ResourceKind::Function, function, SubKind::EventBinding, id)
                    .await?;
            }
            Ok(Outcome::Deleted)
        }
        TriggerSource::ObjectEvents { bucket } => {
            let notifications = match client
                .list_sub(ResourceKind::Bucket, bucket, SubKind::Notification)
                .await
            {
                Ok(notifications) => notifications,
                Err(err) if err.is_not_found() => return Ok(Outcome::Absent),
                Err(err) => return Err(err.into()),
            };
            let matched: Vec<&str> = notifications
                .iter()
                .filter(|sub| {
                    sub.attributes.get("Target").and_then(AttrValue::as_str) == Some(target.arn())
                })
                .map(|sub| sub.id.as_str())
                .collect();
            if matched.is_empty() {
                return Ok(Outcome::Absent);
            }
            if mode.is_preview() {
                return Ok(Outcome::WouldDelete);
            }
            for id in matched {
                client
                    .delete_sub(ResourceKind::Bucket, bucket, SubKind::Notification, id)
                    .await?;
            }
            Ok(Outcome::Deleted)
        }
        TriggerSource::Schedule { .. } => {
            let rule = function.as_str();
            let targets = match client.list_schedule_targets(rule).await {
                Ok(targets) => targets,
                Err(err) if err.is_not_found() => return Ok(Outcome::Absent),
                Err(err) => return Err(err.into()),
            };
            let ours: Vec<String> = targets
                .iter()
                .filter(|t| t.target == target)
                .map(|t| t.id.clone())
                .collect();
            if ours.is_empty() {
                return Ok(Outcome::Absent);
            }
            if mode.is_preview() {
                return Ok(Outcome::WouldDelete);
            }
            client.remove_schedule_targets(rule, &ours).await?;
            Ok(Outcome::Deleted)
        }
        TriggerSource::Gateway => {
            // Integrations and the API carry no per-pass identity to
            // unwind selectively; the API is shared surface and stays.
            Ok(Outcome::Absent)
        }
    }
}
