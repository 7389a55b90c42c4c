//! Trigger binder
//!
//! Wires event sources (stream, queue, object notifications, schedule,
//! gateway) to a compute target. Every path first grants the source
//! principal permission to invoke the target under a deterministic
//! statement id, then dedups against the live binding listing. Binding
//! attributes on an existing binding are compared, not overwritten:
//! changing them after creation needs an explicit update call this
//! engine does not issue.

use crate::error::{ReconcileError, Result};
use crate::grants::Grantor;
use serde::{Deserialize, Serialize};
use stratus_cloud::{
    CloudClient, CloudError, Env, ErrorKind, Identity, RetryPolicy, SubKind, SubResource, retry,
};
use stratus_core::{AttrMap, AttrValue, Diff, Mode, Outcome, ResourceKind};

/// Fixed deployment stage for gateway wiring.
pub const GATEWAY_STAGE: &str = "main";

/// Object events every notification binding subscribes to.
const OBJECT_EVENTS: &str = "s3:ObjectCreated:*,s3:ObjectRemoved:*";

const PROXY_PATH: &str = "/{proxy+}";

/// The event source side of a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSource {
    /// Change stream of a table.
    Stream { table: String },
    /// Message queue.
    Queue { name: String },
    /// Object-created/removed notifications of a bucket.
    ObjectEvents { bucket: String },
    /// Schedule rule with a cron/rate expression.
    Schedule { expression: String },
    /// HTTP gateway catch-all proxy.
    Gateway,
}

impl TriggerSource {
    /// Service principal that invokes the target for this source.
    pub fn principal(&self) -> &'static str {
        match self {
            TriggerSource::Stream { .. } => "dynamodb.amazonaws.com",
            TriggerSource::Queue { .. } => "sqs.amazonaws.com",
            TriggerSource::ObjectEvents { .. } => "s3.amazonaws.com",
            TriggerSource::Schedule { .. } => "events.amazonaws.com",
            TriggerSource::Gateway => "apigateway.amazonaws.com",
        }
    }

    pub fn label(&self) -> String {
        match self {
            TriggerSource::Stream { table } => format!("stream {}", table),
            TriggerSource::Queue { name } => format!("queue {}", name),
            TriggerSource::ObjectEvents { bucket } => format!("object events {}", bucket),
            TriggerSource::Schedule { expression } => format!("schedule {}", expression),
            TriggerSource::Gateway => "gateway".to_string(),
        }
    }
}

/// Tunable attributes of an event-source binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<i64>,

    /// Where to start reading; cannot change after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_position: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<i64>,
}

impl BindingAttrs {
    /// Control-plane attribute representation.
    pub fn to_attrs(&self) -> AttrMap {
        let mut attrs = AttrMap::new();
        if let Some(batch) = self.batch_size {
            attrs.insert("BatchSize".into(), AttrValue::Int(batch));
        }
        if let Some(start) = &self.starting_position {
            attrs.insert(
                "StartingPosition".into(),
                AttrValue::Str(start.to_ascii_uppercase()),
            );
        }
        if let Some(parallel) = self.parallelism {
            attrs.insert("ParallelizationFactor".into(), AttrValue::Int(parallel));
        }
        if let Some(retries) = self.retry_attempts {
            attrs.insert("MaximumRetryAttempts".into(), AttrValue::Int(retries));
        }
        attrs
    }
}

/// One desired wiring between an event source and a compute target.
/// Identity for dedup is (source kind, source id, target).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerBinding {
    pub source: TriggerSource,
    pub target: String,
    #[serde(default)]
    pub attrs: BindingAttrs,
}

impl TriggerBinding {
    pub fn new(source: TriggerSource, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            attrs: BindingAttrs::default(),
        }
    }

    pub fn with_attrs(mut self, attrs: BindingAttrs) -> Self {
        self.attrs = attrs;
        self
    }
}

/// Converges trigger wiring for targets that already exist.
pub struct TriggerBinder<'a, C: CloudClient + ?Sized> {
    client: &'a C,
    policy: RetryPolicy,
    env: Env,
}

impl<'a, C: CloudClient + ?Sized> TriggerBinder<'a, C> {
    pub fn new(client: &'a C, env: Env) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
            env,
        }
    }

    pub fn with_policy(client: &'a C, env: Env, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            env,
        }
    }

    fn grantor(&self) -> Grantor<'a, C> {
        Grantor::with_policy(self.client, self.policy.clone())
    }

    /// Converge one trigger binding. The target function must exist;
    /// a missing target or source is a fatal user error, reported before
    /// any mutating call.
    pub async fn reconcile_trigger(
        &self,
        binding: &TriggerBinding,
        mode: Mode,
    ) -> Result<Outcome> {
        let function = self
            .client
            .describe(ResourceKind::Function, &binding.target)
            .await
            .map_err(|err| missing_if_not_found(err, format!("function {}", binding.target)))?;
        let target = function.identity;

        match &binding.source {
            TriggerSource::Stream { table } => {
                let source = self.stream_arn(table).await?;
                self.bind_event_source(binding, source, mode).await
            }
            TriggerSource::Queue { name } => {
                let source = self
                    .client
                    .queue_arn(name)
                    .await
                    .map_err(|err| missing_if_not_found(err, format!("queue {}", name)))?;
                self.bind_event_source(binding, source, mode).await
            }
            TriggerSource::ObjectEvents { bucket } => {
                self.bind_notifications(bucket, &binding.target, &target, mode)
                    .await
            }
            TriggerSource::Schedule { expression } => {
                self.bind_schedule(expression, &binding.target, &target, mode)
                    .await
            }
            TriggerSource::Gateway => self.bind_gateway(&binding.target, &target, mode).await,
        }
    }

    /// Resolve a table's change-stream identity from observed state.
    async fn stream_arn(&self, table: &str) -> Result<Identity> {
        let observed = self
            .client
            .describe(ResourceKind::Table, table)
            .await
            .map_err(|err| missing_if_not_found(err, format!("table {}", table)))?;
        observed
            .attributes
            .get("LatestStreamArn")
            .and_then(AttrValue::as_str)
            .map(Identity::new)
            .ok_or_else(|| {
                ReconcileError::MissingDependency(format!("stream for table {}", table))
            })
    }

    /// Stream and queue sources share the pull-model binding shape.
    async fn bind_event_source(
        &self,
        binding: &TriggerBinding,
        source: Identity,
        mode: Mode,
    ) -> Result<Outcome> {
        let function = &binding.target;
        if !mode.is_preview() {
            self.grantor()
                .ensure_invoke_permission(function, binding.source.principal(), &source)
                .await?;
        }

        let existing = self
            .client
            .list_sub(ResourceKind::Function, function, SubKind::EventBinding)
            .await?;
        let matched: Vec<&SubResource> = existing
            .iter()
            .filter(|sub| {
                sub.attributes
                    .get("EventSourceArn")
                    .and_then(AttrValue::as_str)
                    == Some(source.arn())
            })
            .collect();

        match matched.len() {
            0 => {
                if mode.is_preview() {
                    return Ok(Outcome::WouldCreate);
                }
                let mut attrs = binding.attrs.to_attrs();
                attrs.insert("EventSourceArn".into(), AttrValue::from(source.arn()));
                attrs.insert("Enabled".into(), AttrValue::Bool(true));
                let sub = SubResource::new(SubKind::EventBinding, "", attrs);
                let created = retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client.put_sub(ResourceKind::Function, function, &sub)
                })
                .await;
                match created {
                    Ok(()) => {
                        tracing::info!(
                            "bound {} to {}",
                            binding.source.label(),
                            function
                        );
                        Ok(Outcome::Created)
                    }
                    // Lost a race with a concurrent bind of the same
                    // source; fall back to comparing the winner.
                    Err(CloudError::Conflict(_)) => {
                        let existing = self
                            .client
                            .list_sub(ResourceKind::Function, function, SubKind::EventBinding)
                            .await?;
                        let winner = existing.iter().find(|sub| {
                            sub.attributes
                                .get("EventSourceArn")
                                .and_then(AttrValue::as_str)
                                == Some(source.arn())
                        });
                        match winner {
                            Some(winner) => {
                                self.assert_binding_attrs(binding, winner)?;
                                Ok(Outcome::Unchanged)
                            }
                            None => Err(ReconcileError::MissingDependency(format!(
                                "binding for {}",
                                binding.source.label()
                            ))),
                        }
                    }
                    Err(err) => Err(err.into()),
                }
            }
            1 => {
                self.assert_binding_attrs(binding, matched[0])?;
                Ok(Outcome::Unchanged)
            }
            _ => Err(ReconcileError::AmbiguousMatch {
                what: format!("binding for {}", binding.source.label()),
                matches: matched.iter().map(|sub| sub.id.clone()).collect(),
            }),
        }
    }

    /// An existing binding must agree with the requested attributes.
    /// `StartingPosition` is exempt: it only applies at creation and is
    /// not reported back by the control plane.
    fn assert_binding_attrs(
        &self,
        binding: &TriggerBinding,
        existing: &SubResource,
    ) -> Result<()> {
        for (path, want) in binding.attrs.to_attrs() {
            if path == "StartingPosition" {
                continue;
            }
            let seen = existing.attributes.get(&path);
            if seen != Some(&want) {
                return Err(ReconcileError::BindingMismatch {
                    resource: binding.source.label(),
                    path,
                    desired: want.to_string(),
                    observed: seen
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "<absent>".to_string()),
                });
            }
        }
        Ok(())
    }

    async fn bind_notifications(
        &self,
        bucket: &str,
        function: &str,
        target: &Identity,
        mode: Mode,
    ) -> Result<Outcome> {
        self.client
            .describe(ResourceKind::Bucket, bucket)
            .await
            .map_err(|err| missing_if_not_found(err, format!("bucket {}", bucket)))?;
        let source = Identity::bucket(bucket);

        if !mode.is_preview() {
            self.grantor()
                .ensure_invoke_permission(function, "s3.amazonaws.com", &source)
                .await?;
        }

        let existing = self
            .client
            .list_sub(ResourceKind::Bucket, bucket, SubKind::Notification)
            .await?;
        let already = existing.iter().any(|sub| {
            sub.attributes.get("Target").and_then(AttrValue::as_str) == Some(target.arn())
                && sub.attributes.get("Events").and_then(AttrValue::as_str) == Some(OBJECT_EVENTS)
        });
        if already {
            return Ok(Outcome::Unchanged);
        }
        if mode.is_preview() {
            return Ok(Outcome::WouldCreate);
        }

        let mut attrs = AttrMap::new();
        attrs.insert("Target".into(), AttrValue::from(target.arn()));
        attrs.insert("Events".into(), AttrValue::from(OBJECT_EVENTS));
        let sub = SubResource::new(SubKind::Notification, "", attrs);
        retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.put_sub(ResourceKind::Bucket, bucket, &sub)
        })
        .await?;
        tracing::info!("bound object events of {} to {}", bucket, function);
        Ok(Outcome::Created)
    }

    /// One rule per target; the rule carries exactly one binding. Extras
    /// are trimmed keeping the earliest, and a single foreign binding is
    /// fatal rather than silently replaced.
    async fn bind_schedule(
        &self,
        expression: &str,
        function: &str,
        target: &Identity,
        mode: Mode,
    ) -> Result<Outcome> {
        let rule = function;

        if mode.is_preview() {
            return match self.client.list_schedule_targets(rule).await {
                Ok(targets) if targets.iter().any(|t| &t.target == target) => {
                    Ok(Outcome::Unchanged)
                }
                Ok(_) => Ok(Outcome::WouldCreate),
                Err(err) if err.is_not_found() => Ok(Outcome::WouldCreate),
                Err(err) => Err(err.into()),
            };
        }

        let rule_arn = retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.put_schedule_rule(rule, expression)
        })
        .await?;
        self.grantor()
            .ensure_invoke_permission(function, "events.amazonaws.com", &rule_arn)
            .await?;

        // The listing right after put_rule can trail the write.
        let targets = retry(
            &self.policy,
            &[ErrorKind::Throttled, ErrorKind::NotFound],
            || self.client.list_schedule_targets(rule),
        )
        .await?;

        let outcome = match targets.len() {
            0 => {
                self.client
                    .put_schedule_target(rule, "1", target)
                    .await?;
                tracing::info!("scheduled {} ({})", function, expression);
                Outcome::Created
            }
            1 => {
                if &targets[0].target != target {
                    return Err(ReconcileError::ForeignScheduleTarget {
                        rule: rule.to_string(),
                        target: targets[0].target.arn().to_string(),
                    });
                }
                Outcome::Unchanged
            }
            _ => {
                let mut sorted = targets.clone();
                sorted.sort_by(|a, b| a.id.cmp(&b.id));
                let extras: Vec<String> = sorted[1..].iter().map(|t| t.id.clone()).collect();
                self.client.remove_schedule_targets(rule, &extras).await?;
                tracing::info!(
                    "removed {} extra targets from schedule rule {}",
                    extras.len(),
                    rule
                );
                Outcome::Updated {
                    diff: Diff::default(),
                }
            }
        };

        // Re-check under retry: target listings converge slowly.
        retry(&self.policy, &[ErrorKind::Conflict], || async {
            let targets = self.client.list_schedule_targets(rule).await?;
            if targets.len() == 1 {
                Ok(())
            } else {
                Err(CloudError::Conflict(format!(
                    "schedule rule {} has {} targets",
                    rule,
                    targets.len()
                )))
            }
        })
        .await?;

        Ok(outcome)
    }

    /// Gateway wiring: find-or-create the API, the catch-all proxy route,
    /// method+integration on root and proxy, then a deployment of the
    /// fixed stage. Each sub-step treats a conflict as already-present.
    async fn bind_gateway(&self, function: &str, target: &Identity, mode: Mode) -> Result<Outcome> {
        let found = self.client.find_gateway(function).await?;

        if mode.is_preview() {
            return Ok(match found {
                Some(_) => Outcome::Unchanged,
                None => Outcome::WouldCreate,
            });
        }

        let (api, created_api) = match found {
            Some(api) => (api, false),
            None => {
                let api = retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client.create_gateway(function)
                })
                .await?;
                tracing::info!("created gateway {} ({})", function, api);
                (api, true)
            }
        };

        let root = self
            .client
            .find_route(&api, "/")
            .await?
            .ok_or_else(|| {
                ReconcileError::MissingDependency(format!("root route of gateway {}", function))
            })?;
        let proxy = match self.client.find_route(&api, PROXY_PATH).await? {
            Some(route) => route,
            None => {
                retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client.create_route(&api, &root, PROXY_PATH)
                })
                .await?
            }
        };

        let mut attached = false;
        for route in [&root, &proxy] {
            match self.client.attach_integration(&api, route, target).await {
                Ok(()) => attached = true,
                Err(CloudError::Conflict(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.create_deployment(&api, GATEWAY_STAGE)
        })
        .await?;

        let execute = Identity::gateway_execute(&self.env.region, &self.env.account, api.arn());
        self.grantor()
            .ensure_invoke_permission(function, "apigateway.amazonaws.com", &execute)
            .await?;

        Ok(if created_api {
            Outcome::Created
        } else if attached {
            Outcome::Updated {
                diff: Diff::default(),
            }
        } else {
            Outcome::Unchanged
        })
    }
}

fn missing_if_not_found(err: CloudError, what: String) -> ReconcileError {
    if err.is_not_found() {
        ReconcileError::MissingDependency(what)
    } else {
        ReconcileError::Cloud(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_attrs_map_to_control_plane_names() {
        let attrs = BindingAttrs {
            batch_size: Some(100),
            starting_position: Some("trim_horizon".into()),
            parallelism: Some(4),
            retry_attempts: Some(2),
        };
        let map = attrs.to_attrs();
        assert_eq!(map.get("BatchSize"), Some(&AttrValue::Int(100)));
        assert_eq!(
            map.get("StartingPosition"),
            Some(&AttrValue::Str("TRIM_HORIZON".into()))
        );
        assert_eq!(map.get("ParallelizationFactor"), Some(&AttrValue::Int(4)));
        assert_eq!(map.get("MaximumRetryAttempts"), Some(&AttrValue::Int(2)));
    }

    #[test]
    fn source_principals() {
        assert_eq!(
            TriggerSource::Schedule {
                expression: "rate(5 minutes)".into()
            }
            .principal(),
            "events.amazonaws.com"
        );
        assert_eq!(TriggerSource::Gateway.principal(), "apigateway.amazonaws.com");
    }
}
