//! Generic resource reconciler
//!
//! One ensure/diff/apply skeleton for every resource kind; kind-specific
//! behavior (immutable path prefixes, identity formats) is configuration
//! on `ResourceKind`, not duplicated code. The state machine per
//! `(kind, name)` is: absent → creating → exists; exists → converged when
//! the diff is empty, diverged otherwise; diverged + apply → updating →
//! converged.

use crate::error::{ReconcileError, Result};
use stratus_cloud::{CloudClient, CloudError, ErrorKind, Identity, RetryPolicy, retry};
use stratus_core::{Diff, Mode, Outcome, ResourceKind, ResourceSpec, diff};

/// Result of an `ensure`: the outcome plus, whenever the resource is known
/// to exist, its identity for downstream wiring (grants, triggers).
#[derive(Debug, Clone)]
pub struct Ensured {
    pub outcome: Outcome,
    pub identity: Option<Identity>,
}

/// Per-kind state machine over an abstract control plane.
pub struct Reconciler<'a, C: CloudClient + ?Sized> {
    client: &'a C,
    policy: RetryPolicy,
}

impl<'a, C: CloudClient + ?Sized> Reconciler<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(client: &'a C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Converge one resource toward its spec.
    ///
    /// Never deletes resources of the same kind that the spec simply does
    /// not mention; this engine reconciles what it is told about, it does
    /// not sync the whole account.
    pub async fn ensure(&self, spec: &ResourceSpec, mode: Mode) -> Result<Ensured> {
        let ensured = self.ensure_resource(spec, mode).await?;
        if spec.kind == ResourceKind::InstanceProfile && !mode.is_preview() {
            self.ensure_profile_role(spec).await?;
        }
        Ok(ensured)
    }

    async fn ensure_resource(&self, spec: &ResourceSpec, mode: Mode) -> Result<Ensured> {
        let kind = spec.kind;
        let name = spec.name.as_str();

        let observed = match self.client.describe(kind, name).await {
            Ok(observed) => Some(observed),
            Err(err) if err.is_not_found() => None,
            Err(err) => return Err(err.into()),
        };

        let Some(observed) = observed else {
            if mode.is_preview() {
                return Ok(Ensured {
                    outcome: Outcome::WouldCreate,
                    identity: None,
                });
            }
            // Conflicts here are usually a deletion of the same name still
            // completing; wait it out within the budget.
            let identity = retry(
                &self.policy,
                &[ErrorKind::Conflict, ErrorKind::Throttled],
                || self.client.create(kind, name, &spec.attributes),
            )
            .await?;
            tracing::info!(%identity, "created {} {}", kind, name);
            return Ok(Ensured {
                outcome: Outcome::Created,
                identity: Some(identity),
            });
        };

        let delta = diff(
            &spec.attributes,
            &observed.attributes,
            kind.immutable_prefixes(),
        )
        .map_err(|err| ReconcileError::immutable(kind, name, err))?;

        if delta.is_empty() {
            return Ok(Ensured {
                outcome: Outcome::Unchanged,
                identity: Some(observed.identity),
            });
        }

        if mode.is_preview() {
            return Ok(Ensured {
                outcome: Outcome::WouldUpdate { diff: delta },
                identity: Some(observed.identity),
            });
        }

        if !delta.changes.is_empty() {
            let additive = Diff {
                changes: delta.changes.clone(),
                removals: Vec::new(),
            };
            retry(
                &self.policy,
                &[ErrorKind::Conflict, ErrorKind::Throttled],
                || self.client.update(kind, name, &additive),
            )
            .await?;
        }

        let removed = delta.removed_tag_keys();
        if !removed.is_empty() {
            retry(&self.policy, &[ErrorKind::Throttled], || {
                self.client.untag(kind, name, &removed)
            })
            .await?;
        }

        tracing::info!("updated {} {} ({})", kind, name, delta);
        Ok(Ensured {
            outcome: Outcome::Updated { diff: delta },
            identity: Some(observed.identity),
        })
    }

    /// Idempotent delete: already-absent and a deletion of the same name
    /// still in flight both count as success.
    pub async fn remove(&self, kind: ResourceKind, name: &str, mode: Mode) -> Result<Outcome> {
        if mode.is_preview() {
            return match self.client.describe(kind, name).await {
                Ok(_) => Ok(Outcome::WouldDelete),
                Err(err) if err.is_not_found() => Ok(Outcome::Absent),
                Err(err) => Err(err.into()),
            };
        }

        if kind == ResourceKind::Role {
            self.unwind_role(name).await?;
        }

        let result = retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.delete(kind, name)
        })
        .await;

        match result {
            Ok(()) => {
                tracing::info!("deleted {} {}", kind, name);
                Ok(Outcome::Deleted)
            }
            Err(err) if err.is_not_found() => Ok(Outcome::Absent),
            Err(CloudError::Conflict(message)) if is_same_name_deletion(&message, name) => {
                Ok(Outcome::Deleted)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// An instance profile spec may name the role it carries; membership
    /// is additive, matching the control plane's add-only call.
    async fn ensure_profile_role(&self, spec: &ResourceSpec) -> Result<()> {
        use stratus_cloud::{SubKind, SubResource};
        use stratus_core::AttrMap;

        let Some(role) = spec.attributes.get("Role").and_then(|v| v.as_str()) else {
            return Ok(());
        };
        let members = self
            .client
            .list_sub(
                ResourceKind::InstanceProfile,
                &spec.name,
                SubKind::ProfileRole,
            )
            .await?;
        if members.iter().any(|member| member.id == role) {
            return Ok(());
        }
        let sub = SubResource::new(SubKind::ProfileRole, role, AttrMap::new());
        retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client
                .put_sub(ResourceKind::InstanceProfile, &spec.name, &sub)
        })
        .await?;
        tracing::info!("added role {} to instance profile {}", role, spec.name);
        Ok(())
    }

    /// A role cannot be deleted while policies hang off it.
    async fn unwind_role(&self, name: &str) -> Result<()> {
        use stratus_cloud::SubKind;

        for sub_kind in [SubKind::AttachedPolicy, SubKind::InlinePolicy] {
            let subs = match self.client.list_sub(ResourceKind::Role, name, sub_kind).await {
                Ok(subs) => subs,
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err.into()),
            };
            for sub in subs {
                self.client
                    .delete_sub(ResourceKind::Role, name, sub_kind, &sub.id)
                    .await?;
                tracing::debug!("detached {} from role {}", sub.id, name);
            }
        }
        Ok(())
    }
}

/// A delete-in-progress conflict counts as success only when the parallel
/// deletion targets the exact same name.
fn is_same_name_deletion(message: &str, name: &str) -> bool {
    message.ends_with(&format!("being deleted: {}", name))
}
