//! Permission grantor
//!
//! Grants are reconciled as an additive-then-subtractive set operation
//! over an owner's live statement listing. Identity is a deterministic
//! name derived from the grant's logical content, so the same grant maps
//! to the same statement across passes with no persisted state — and a
//! statement whose name does not parse under the scheme was created by
//! someone else and is never touched.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use stratus_cloud::{
    CloudClient, ErrorKind, Identity, PolicyStatement, Principal, RetryPolicy, SubKind,
    SubResource, retry,
};
use stratus_core::{AttrMap, AttrValue, Mode, ResourceKind};

/// Sid of the key-policy statement this engine manages.
pub const KEY_USE_SID: &str = "Allow use of the key";

const KEY_USE_ACTIONS: [&str; 5] = [
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ReEncrypt*",
    "kms:GenerateDataKey*",
    "kms:DescribeKey",
];

/// One permission statement: allow `action` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantSpec {
    pub action: String,
    pub resource: String,
}

impl GrantSpec {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// Deterministic statement name for this grant. Restricted to the
    /// character set statement names allow; `__` separates the halves.
    pub fn statement_name(&self) -> String {
        let action = self.action.replace('*', "ALL").replace(':', ".");
        let resource = self
            .resource
            .replace('*', "ALL")
            .replace(':', ".")
            .replace('/', "_");
        format!("{}__{}", action, resource)
    }
}

impl std::fmt::Display for GrantSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.resource)
    }
}

/// Whether a statement name was produced by `statement_name`. Mangled
/// actions never contain underscores, so the first `__` is the separator.
pub fn owns_statement(name: &str) -> bool {
    let Some((action, resource)) = name.split_once("__") else {
        return false;
    };
    !action.is_empty()
        && !resource.is_empty()
        && action
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.')
        && resource
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Deterministic statement id for an invoke permission, derived from the
/// source principal and the source identity.
pub fn invoke_statement_id(principal: &str, source: &Identity) -> String {
    let suffix = source
        .leaf()
        .replace('-', "_")
        .replace('/', "__")
        .replace('*', "ALL");
    format!("{}__{}", principal.replace('.', "-"), suffix)
}

/// What a grant reconciliation did (or, in preview, would do).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
}

impl GrantReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl std::fmt::Display for GrantReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} unchanged",
            self.added.len(),
            self.removed.len(),
            self.unchanged
        )
    }
}

/// Result of converging one key-usage grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGrantOutcome {
    WouldGrant,
    Granted,
    AlreadyGranted,
}

/// Reconciles permission grants under an owner the caller has already
/// ensured exists.
pub struct Grantor<'a, C: CloudClient + ?Sized> {
    client: &'a C,
    policy: RetryPolicy,
}

impl<'a, C: CloudClient + ?Sized> Grantor<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(client: &'a C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Converge a role's inline statements toward `desired`.
    ///
    /// Additive pass first, then removal of statements this engine owns
    /// that are no longer desired. Foreign statements survive regardless
    /// of the desired set.
    pub async fn reconcile_grants(
        &self,
        role: &str,
        desired: &[GrantSpec],
        mode: Mode,
    ) -> Result<GrantReport> {
        let existing = self
            .client
            .list_sub(ResourceKind::Role, role, SubKind::InlinePolicy)
            .await?;
        let mut report = GrantReport::default();
        let desired_names: Vec<String> = desired.iter().map(GrantSpec::statement_name).collect();

        for (grant, name) in desired.iter().zip(&desired_names) {
            if existing.iter().any(|sub| &sub.id == name) {
                report.unchanged += 1;
                continue;
            }
            if !mode.is_preview() {
                let mut attributes = AttrMap::new();
                attributes.insert("Action".into(), AttrValue::from(grant.action.clone()));
                attributes.insert("Resource".into(), AttrValue::from(grant.resource.clone()));
                let sub = SubResource::new(SubKind::InlinePolicy, name.clone(), attributes);
                retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client.put_sub(ResourceKind::Role, role, &sub)
                })
                .await?;
                tracing::info!("granted to role {}: {}", role, grant);
            }
            report.added.push(name.clone());
        }

        for sub in &existing {
            if !owns_statement(&sub.id) || desired_names.contains(&sub.id) {
                continue;
            }
            if !mode.is_preview() {
                retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client
                        .delete_sub(ResourceKind::Role, role, SubKind::InlinePolicy, &sub.id)
                })
                .await?;
                tracing::info!("revoked from role {}: {}", role, sub.id);
            }
            report.removed.push(sub.id.clone());
        }

        Ok(report)
    }

    /// Converge a role's managed-policy attachments toward `desired`
    /// policy names. Resolution is account-wide: zero matches is a missing
    /// dependency, more than one an ambiguous match — both fatal.
    pub async fn reconcile_attached(
        &self,
        role: &str,
        desired: &[String],
        mode: Mode,
    ) -> Result<GrantReport> {
        let existing = self
            .client
            .list_sub(ResourceKind::Role, role, SubKind::AttachedPolicy)
            .await?;
        let mut report = GrantReport::default();

        for name in desired {
            if existing.iter().any(|sub| &sub.id == name) {
                report.unchanged += 1;
                continue;
            }
            if mode.is_preview() {
                report.added.push(name.clone());
                continue;
            }
            let matches = self.client.find_managed_policies(name).await?;
            let identity = match matches.len() {
                0 => {
                    return Err(ReconcileError::MissingDependency(format!(
                        "managed policy {}",
                        name
                    )));
                }
                1 => &matches[0],
                _ => {
                    return Err(ReconcileError::AmbiguousMatch {
                        what: format!("managed policy {}", name),
                        matches: matches.iter().map(|m| m.arn().to_string()).collect(),
                    });
                }
            };
            let mut attributes = AttrMap::new();
            attributes.insert("Arn".into(), AttrValue::from(identity.arn()));
            let sub = SubResource::new(SubKind::AttachedPolicy, name.clone(), attributes);
            retry(&self.policy, &[ErrorKind::Throttled], || {
                self.client.put_sub(ResourceKind::Role, role, &sub)
            })
            .await?;
            tracing::info!("attached policy {} to role {}", name, role);
            report.added.push(name.clone());
        }

        for sub in &existing {
            if desired.contains(&sub.id) {
                continue;
            }
            if !mode.is_preview() {
                retry(&self.policy, &[ErrorKind::Throttled], || {
                    self.client
                        .delete_sub(ResourceKind::Role, role, SubKind::AttachedPolicy, &sub.id)
                })
                .await?;
                tracing::info!("detached policy {} from role {}", sub.id, role);
            }
            report.removed.push(sub.id.clone());
        }

        Ok(report)
    }

    /// Ensure a key's shared policy document allows the role to use the
    /// key. Read-modify-write of one document; a malformed document is
    /// fatal, not retried, since retry cannot fix its structure.
    pub async fn ensure_key_grant(
        &self,
        key: &str,
        role_arn: &Identity,
        mode: Mode,
    ) -> Result<KeyGrantOutcome> {
        if mode.is_preview() {
            return Ok(KeyGrantOutcome::WouldGrant);
        }

        let mut document = retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.read_key_policy(key)
        })
        .await
        .map_err(|err| {
            if err.is_not_found() {
                ReconcileError::MissingDependency(format!("key {}", key))
            } else {
                ReconcileError::Cloud(err)
            }
        })?;
        let before = document.clone();

        document.drop_invalid_principals();
        let arn = role_arn.arn();
        match document.statement_mut(KEY_USE_SID) {
            Some(statement) => {
                let principal = statement
                    .principal
                    .get_or_insert_with(|| Principal { aws: Vec::new() });
                if !principal.aws.iter().any(|existing| existing == arn) {
                    principal.aws.push(arn.to_string());
                }
            }
            None => {
                document.statement.push(PolicyStatement::allow(
                    KEY_USE_SID,
                    vec![arn.to_string()],
                    KEY_USE_ACTIONS.iter().map(|a| a.to_string()).collect(),
                ));
            }
        }

        if document == before {
            return Ok(KeyGrantOutcome::AlreadyGranted);
        }

        retry(
            &self.policy,
            &[ErrorKind::Throttled, ErrorKind::Conflict],
            || self.client.write_key_policy(key, &document),
        )
        .await?;
        tracing::info!("granted use of key {} to {}", key, arn);
        Ok(KeyGrantOutcome::Granted)
    }

    /// Ensure the source principal may invoke the function. Keyed by a
    /// deterministic statement id, so repeated calls are no-ops.
    pub async fn ensure_invoke_permission(
        &self,
        function: &str,
        principal: &str,
        source: &Identity,
    ) -> Result<bool> {
        let id = invoke_statement_id(principal, source);
        let existing = self
            .client
            .list_sub(ResourceKind::Function, function, SubKind::InvokePermission)
            .await?;
        if existing.iter().any(|sub| sub.id == id) {
            return Ok(false);
        }
        let mut attributes = AttrMap::new();
        attributes.insert("Action".into(), AttrValue::from("lambda:InvokeFunction"));
        attributes.insert("Principal".into(), AttrValue::from(principal));
        attributes.insert("SourceArn".into(), AttrValue::from(source.arn()));
        let sub = SubResource::new(SubKind::InvokePermission, id.clone(), attributes);
        retry(&self.policy, &[ErrorKind::Throttled], || {
            self.client.put_sub(ResourceKind::Function, function, &sub)
        })
        .await?;
        tracing::debug!("permitted {} to invoke {} ({})", principal, function, id);
        Ok(true)
    }
}
