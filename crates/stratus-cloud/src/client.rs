//! Cloud client trait definition

use crate::error::Result;
use crate::ident::Identity;
use crate::policy::PolicyDocument;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_core::{AttrMap, Diff, ResourceKind};

/// Live snapshot of one resource, fetched fresh per reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub identity: Identity,
    pub attributes: AttrMap,
}

impl ObservedState {
    pub fn new(identity: Identity, attributes: AttrMap) -> Self {
        Self {
            identity,
            attributes,
        }
    }
}

/// Kinds of sub-resources hanging off an owning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubKind {
    /// Inline policy statement on a role.
    InlinePolicy,
    /// Managed policy attachment on a role.
    AttachedPolicy,
    /// Invoke-permission statement on a function.
    InvokePermission,
    /// Event-source binding feeding a function.
    EventBinding,
    /// Object-event notification entry on a bucket.
    Notification,
    /// Role membership of an instance profile.
    ProfileRole,
}

/// One sub-resource instance: identity within the owner plus attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub kind: SubKind,
    pub id: String,
    pub attributes: AttrMap,
}

impl SubResource {
    pub fn new(kind: SubKind, id: impl Into<String>, attributes: AttrMap) -> Self {
        Self {
            kind,
            id: id.into(),
            attributes,
        }
    }
}

/// One target of a schedule rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleTarget {
    pub id: String,
    pub target: Identity,
}

/// Abstract control-plane client.
///
/// Each method maps to one control-plane call and may raise any
/// `CloudError`; retry decisions are made by the caller, per call site.
/// Implementations must not retry internally.
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Fetch the live state of `(kind, name)`; `NotFound` if absent.
    async fn describe(&self, kind: ResourceKind, name: &str) -> Result<ObservedState>;

    /// Create the resource from its full desired attribute set.
    async fn create(&self, kind: ResourceKind, name: &str, attributes: &AttrMap)
    -> Result<Identity>;

    /// Apply additive/updating changes to an existing resource.
    async fn update(&self, kind: ResourceKind, name: &str, diff: &Diff) -> Result<()>;

    /// Remove tags by key. Separate from `update` because the control
    /// plane exposes removal only for tags.
    async fn untag(&self, kind: ResourceKind, name: &str, keys: &[String]) -> Result<()>;

    /// Delete the resource. Raises `NotFound` when absent and `Conflict`
    /// when a deletion is already in flight; the reconciler maps both to
    /// idempotent success.
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// List sub-resources of the given kind under an owner.
    async fn list_sub(
        &self,
        owner: ResourceKind,
        name: &str,
        kind: SubKind,
    ) -> Result<Vec<SubResource>>;

    /// Create or overwrite one sub-resource under an owner.
    async fn put_sub(&self, owner: ResourceKind, name: &str, sub: &SubResource) -> Result<()>;

    /// Remove one sub-resource by id.
    async fn delete_sub(
        &self,
        owner: ResourceKind,
        name: &str,
        kind: SubKind,
        id: &str,
    ) -> Result<()>;

    /// Account-wide managed policy lookup by (non-unique) name.
    async fn find_managed_policies(&self, name: &str) -> Result<Vec<Identity>>;

    /// Read the shared policy document of an encryption key.
    async fn read_key_policy(&self, key_name: &str) -> Result<PolicyDocument>;

    /// Replace the shared policy document of an encryption key.
    async fn write_key_policy(&self, key_name: &str, document: &PolicyDocument) -> Result<()>;

    /// Resolve a queue name to its identity.
    async fn queue_arn(&self, name: &str) -> Result<Identity>;

    /// Create or update a schedule rule; returns the rule identity.
    async fn put_schedule_rule(&self, name: &str, expression: &str) -> Result<Identity>;

    async fn list_schedule_targets(&self, rule: &str) -> Result<Vec<ScheduleTarget>>;

    async fn put_schedule_target(&self, rule: &str, id: &str, target: &Identity) -> Result<()>;

    async fn remove_schedule_targets(&self, rule: &str, ids: &[String]) -> Result<()>;

    /// Find a gateway API by name; `Ambiguous` if the name is not unique.
    async fn find_gateway(&self, name: &str) -> Result<Option<Identity>>;

    async fn create_gateway(&self, name: &str) -> Result<Identity>;

    /// Find a route by path under a gateway (e.g. `/` or `/{proxy+}`).
    async fn find_route(&self, gateway: &Identity, path: &str) -> Result<Option<Identity>>;

    async fn create_route(
        &self,
        gateway: &Identity,
        parent: &Identity,
        path: &str,
    ) -> Result<Identity>;

    /// Attach method + proxy integration for `target` to a route.
    /// Raises `Conflict` when the route already carries one.
    async fn attach_integration(
        &self,
        gateway: &Identity,
        route: &Identity,
        target: &Identity,
    ) -> Result<()>;

    /// Create a deployment of the gateway to a named stage.
    async fn create_deployment(&self, gateway: &Identity, stage: &str) -> Result<()>;
}
