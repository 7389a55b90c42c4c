//! The in-memory control plane

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use stratus_cloud::{
    CloudClient, CloudError, Env, ErrorKind, Identity, ObservedState, PolicyDocument,
    PolicyStatement, Result, ScheduleTarget, SubKind, SubResource,
};
use stratus_core::{AttrMap, AttrValue, Diff, ResourceKind, tag_entry, tag_key};

const STREAM_ENABLED: &str = "StreamSpecification.StreamEnabled";
const LATEST_STREAM_ARN: &str = "LatestStreamArn";

/// In-memory `CloudClient` implementation.
///
/// All state lives behind one mutex; no lock is held across an await.
/// Mutating calls bump a counter so tests can assert preview purity and
/// second-pass no-ops, and scripted faults let tests exercise the retry
/// paths without a flaky backend.
#[derive(Debug)]
pub struct MemoryCloud {
    pub(crate) env: Env,
    pub(crate) state: Mutex<State>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct State {
    pub(crate) seq: u64,
    pub(crate) resources: BTreeMap<String, Record>,
    pub(crate) subs: BTreeMap<String, Vec<SubResource>>,
    pub(crate) key_policies: BTreeMap<String, PolicyDocument>,
    pub(crate) managed_policies: Vec<ManagedPolicy>,
    pub(crate) queues: BTreeMap<String, Identity>,
    pub(crate) rules: BTreeMap<String, Rule>,
    pub(crate) gateways: Vec<Gateway>,
    #[serde(skip)]
    pub(crate) mutations: u64,
    #[serde(skip)]
    pub(crate) faults: VecDeque<(ErrorKind, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Record {
    pub(crate) identity: Identity,
    pub(crate) attributes: AttrMap,
    pub(crate) created: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ManagedPolicy {
    pub(crate) name: String,
    pub(crate) identity: Identity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Rule {
    pub(crate) expression: String,
    pub(crate) targets: Vec<ScheduleTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Gateway {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) routes: Vec<Route>,
    pub(crate) integrations: Vec<Integration>,
    pub(crate) stages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Route {
    pub(crate) id: String,
    pub(crate) path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Integration {
    pub(crate) route_id: String,
    pub(crate) target: Identity,
}

fn resource_key(kind: ResourceKind, name: &str) -> String {
    format!("{}/{}", kind, name)
}

fn sub_prefix(kind: SubKind) -> &'static str {
    match kind {
        SubKind::InlinePolicy => "pol",
        SubKind::AttachedPolicy => "att",
        SubKind::InvokePermission => "sid",
        SubKind::EventBinding => "esm",
        SubKind::Notification => "ntf",
        SubKind::ProfileRole => "prl",
    }
}

fn materialize(kind: ErrorKind, message: String) -> CloudError {
    match kind {
        ErrorKind::NotFound => CloudError::NotFound { entity: message },
        ErrorKind::AlreadyExists => CloudError::AlreadyExists(message),
        ErrorKind::Conflict => CloudError::Conflict(message),
        ErrorKind::Throttled => CloudError::Throttled(message),
        ErrorKind::MalformedInput => CloudError::MalformedInput(message),
        ErrorKind::Unauthorized => CloudError::Unauthorized(message),
        ErrorKind::Ambiguous => CloudError::Ambiguous {
            what: message,
            matches: Vec::new(),
        },
    }
}

impl MemoryCloud {
    pub fn new(env: Env) -> Self {
        Self {
            env,
            state: Mutex::new(State::default()),
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Number of mutating control-plane calls issued so far.
    pub fn mutation_count(&self) -> u64 {
        self.state.lock().unwrap().mutations
    }

    /// Script the next call to fail with the given error kind.
    /// Faults queue up and are consumed one per call, front first.
    pub fn fail_next(&self, kind: ErrorKind, message: &str) {
        self.state
            .lock()
            .unwrap()
            .faults
            .push_back((kind, message.to_string()));
    }

    /// Register an account-wide managed policy (duplicates allowed, to
    /// exercise ambiguous lookups).
    pub fn seed_managed_policy(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let identity = Identity::new(format!("arn:aws:iam::aws:policy/{}-{}", name, state.seq));
        state.managed_policies.push(ManagedPolicy {
            name: name.to_string(),
            identity,
        });
    }

    pub fn seed_queue(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        let identity = Identity::queue(&self.env.region, &self.env.account, name);
        state.queues.insert(name.to_string(), identity);
    }

    /// Direct read of a resource's attributes, for assertions.
    pub fn attributes_of(&self, kind: ResourceKind, name: &str) -> Option<AttrMap> {
        let state = self.state.lock().unwrap();
        state
            .resources
            .get(&resource_key(kind, name))
            .map(|record| record.attributes.clone())
    }

    /// Direct read of an owner's sub-resources, for assertions.
    pub fn subs_of(&self, owner: ResourceKind, name: &str, kind: SubKind) -> Vec<SubResource> {
        let state = self.state.lock().unwrap();
        state
            .subs
            .get(&sub_key(owner, name, kind))
            .cloned()
            .unwrap_or_default()
    }

    fn take_fault(&self) -> Result<()> {
        let fault = self.state.lock().unwrap().faults.pop_front();
        match fault {
            Some((kind, message)) => Err(materialize(kind, message)),
            None => Ok(()),
        }
    }

    fn identity_for(&self, kind: ResourceKind, name: &str, attributes: &AttrMap) -> Identity {
        match kind {
            ResourceKind::Role => {
                let path = attributes
                    .get("Path")
                    .and_then(AttrValue::as_str)
                    .unwrap_or("/");
                Identity::new(format!(
                    "arn:aws:iam::{}:role{}{}",
                    self.env.account, path, name
                ))
            }
            _ => Identity::for_kind(kind, &self.env.region, &self.env.account, name),
        }
    }
}

fn sub_key(owner: ResourceKind, name: &str, kind: SubKind) -> String {
    format!("{}/{}/{}", owner, name, sub_prefix(kind))
}

/// Seed key policy created alongside an encryption key: account root keeps
/// full control, the key-use statement is added later by the grantor.
fn default_key_policy(account: &str) -> PolicyDocument {
    PolicyDocument::new(vec![PolicyStatement::allow(
        "Enable IAM User Permissions",
        vec![format!("arn:aws:iam::{}:root", account)],
        vec!["kms:*".to_string()],
    )])
}

#[async_trait]
impl CloudClient for MemoryCloud {
    async fn describe(&self, kind: ResourceKind, name: &str) -> Result<ObservedState> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        let record = state
            .resources
            .get(&resource_key(kind, name))
            .ok_or_else(|| CloudError::not_found(kind, name))?;
        Ok(ObservedState::new(
            record.identity.clone(),
            record.attributes.clone(),
        ))
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        attributes: &AttrMap,
    ) -> Result<Identity> {
        self.take_fault()?;
        let identity = self.identity_for(kind, name, attributes);
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let key = resource_key(kind, name);
        if state.resources.contains_key(&key) {
            return Err(CloudError::AlreadyExists(key));
        }
        state.seq += 1;
        let seq = state.seq;
        let mut attributes = attributes.clone();
        if kind == ResourceKind::Table
            && attributes.get(STREAM_ENABLED).and_then(AttrValue::as_bool) == Some(true)
        {
            attributes.insert(
                LATEST_STREAM_ARN.to_string(),
                AttrValue::Str(format!("{}/stream/{:06}", identity.arn(), seq)),
            );
        }
        if kind == ResourceKind::Key {
            let policy = default_key_policy(&self.env.account);
            state.key_policies.insert(name.to_string(), policy);
        }
        tracing::debug!(%identity, "created {} {}", kind, name);
        state.resources.insert(
            key,
            Record {
                identity: identity.clone(),
                attributes,
                created: seq,
            },
        );
        Ok(identity)
    }

    async fn update(&self, kind: ResourceKind, name: &str, diff: &Diff) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state.seq += 1;
        let seq = state.seq;
        let record = state
            .resources
            .get_mut(&resource_key(kind, name))
            .ok_or_else(|| CloudError::not_found(kind, name))?;
        for entry in &diff.changes {
            let Some(desired) = &entry.desired else {
                continue;
            };
            if let Some(tag) = entry.path.strip_prefix("Tags.") {
                let value = desired.as_str().unwrap_or_default().to_string();
                let slot = record
                    .attributes
                    .entry("Tags".to_string())
                    .or_insert_with(|| AttrValue::List(Vec::new()));
                if !matches!(slot, AttrValue::List(_)) {
                    *slot = AttrValue::List(Vec::new());
                }
                if let AttrValue::List(tags) = slot {
                    match tags.iter_mut().find(|entry| tag_key(entry) == Some(tag)) {
                        Some(entry) => {
                            entry.insert("Value".to_string(), AttrValue::Str(value));
                        }
                        None => tags.push(tag_entry(tag, &value)),
                    }
                }
            } else {
                record
                    .attributes
                    .insert(entry.path.clone(), desired.clone());
            }
        }
        if kind == ResourceKind::Table
            && record.attributes.get(STREAM_ENABLED).and_then(AttrValue::as_bool) == Some(true)
            && !record.attributes.contains_key(LATEST_STREAM_ARN)
        {
            let arn = format!("{}/stream/{:06}", record.identity.arn(), seq);
            record
                .attributes
                .insert(LATEST_STREAM_ARN.to_string(), AttrValue::Str(arn));
        }
        Ok(())
    }

    async fn untag(&self, kind: ResourceKind, name: &str, keys: &[String]) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let record = state
            .resources
            .get_mut(&resource_key(kind, name))
            .ok_or_else(|| CloudError::not_found(kind, name))?;
        if let Some(AttrValue::List(tags)) = record.attributes.get_mut("Tags") {
            tags.retain(|entry| {
                tag_key(entry)
                    .map(|key| !keys.iter().any(|k| k.as_str() == key))
                    .unwrap_or(true)
            });
        }
        Ok(())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let key = resource_key(kind, name);
        if state.resources.remove(&key).is_none() {
            return Err(CloudError::not_found(kind, name));
        }
        let prefix = format!("{}/{}/", kind, name);
        state.subs.retain(|k, _| !k.starts_with(&prefix));
        if kind == ResourceKind::Key {
            state.key_policies.remove(name);
        }
        Ok(())
    }

    async fn list_sub(
        &self,
        owner: ResourceKind,
        name: &str,
        kind: SubKind,
    ) -> Result<Vec<SubResource>> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        if !state.resources.contains_key(&resource_key(owner, name)) {
            return Err(CloudError::not_found(owner, name));
        }
        Ok(state
            .subs
            .get(&sub_key(owner, name, kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn put_sub(&self, owner: ResourceKind, name: &str, sub: &SubResource) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        if !state.resources.contains_key(&resource_key(owner, name)) {
            return Err(CloudError::not_found(owner, name));
        }
        state.seq += 1;
        let mut sub = sub.clone();
        if sub.id.is_empty() {
            sub.id = format!("{}-{:06}", sub_prefix(sub.kind), state.seq);
        }
        let entries = state.subs.entry(sub_key(owner, name, sub.kind)).or_default();
        match sub.kind {
            SubKind::EventBinding => {
                let source = sub.attributes.get("EventSourceArn").cloned();
                if let Some(existing) = entries
                    .iter()
                    .find(|e| e.attributes.get("EventSourceArn") == source.as_ref())
                {
                    return Err(CloudError::Conflict(format!(
                        "event source binding already exists: {}",
                        existing.id
                    )));
                }
            }
            SubKind::ProfileRole => {
                if entries.iter().any(|e| e.id == sub.id) {
                    return Err(CloudError::AlreadyExists(sub.id));
                }
            }
            _ => {
                // Put semantics: same id overwrites.
                entries.retain(|e| e.id != sub.id);
            }
        }
        entries.push(sub);
        Ok(())
    }

    async fn delete_sub(
        &self,
        owner: ResourceKind,
        name: &str,
        kind: SubKind,
        id: &str,
    ) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let entries = state
            .subs
            .get_mut(&sub_key(owner, name, kind))
            .ok_or_else(|| CloudError::not_found(owner, name))?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Err(CloudError::NotFound {
                entity: format!("{} {}", sub_prefix(kind), id),
            });
        }
        Ok(())
    }

    async fn find_managed_policies(&self, name: &str) -> Result<Vec<Identity>> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .managed_policies
            .iter()
            .filter(|p| p.name == name)
            .map(|p| p.identity.clone())
            .collect())
    }

    async fn read_key_policy(&self, key_name: &str) -> Result<PolicyDocument> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        state
            .key_policies
            .get(key_name)
            .cloned()
            .ok_or_else(|| CloudError::not_found(ResourceKind::Key, key_name))
    }

    async fn write_key_policy(&self, key_name: &str, document: &PolicyDocument) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        if !state.key_policies.contains_key(key_name) {
            return Err(CloudError::not_found(ResourceKind::Key, key_name));
        }
        if document.statement.is_empty() {
            return Err(CloudError::MalformedInput(
                "policy document has no statements".to_string(),
            ));
        }
        state
            .key_policies
            .insert(key_name.to_string(), document.clone());
        Ok(())
    }

    async fn queue_arn(&self, name: &str) -> Result<Identity> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        state.queues.get(name).cloned().ok_or_else(|| CloudError::NotFound {
            entity: format!("queue {}", name),
        })
    }

    async fn put_schedule_rule(&self, name: &str, expression: &str) -> Result<Identity> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let rule = state.rules.entry(name.to_string()).or_insert_with(|| Rule {
            expression: String::new(),
            targets: Vec::new(),
        });
        rule.expression = expression.to_string();
        Ok(Identity::schedule_rule(
            &self.env.region,
            &self.env.account,
            name,
        ))
    }

    async fn list_schedule_targets(&self, rule: &str) -> Result<Vec<ScheduleTarget>> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        state
            .rules
            .get(rule)
            .map(|r| r.targets.clone())
            .ok_or_else(|| CloudError::NotFound {
                entity: format!("schedule rule {}", rule),
            })
    }

    async fn put_schedule_target(&self, rule: &str, id: &str, target: &Identity) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let rule = state.rules.get_mut(rule).ok_or_else(|| CloudError::NotFound {
            entity: format!("schedule rule {}", rule),
        })?;
        rule.targets.retain(|t| t.id != id);
        rule.targets.push(ScheduleTarget {
            id: id.to_string(),
            target: target.clone(),
        });
        rule.targets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(())
    }

    async fn remove_schedule_targets(&self, rule: &str, ids: &[String]) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let rule = state.rules.get_mut(rule).ok_or_else(|| CloudError::NotFound {
            entity: format!("schedule rule {}", rule),
        })?;
        rule.targets.retain(|t| !ids.contains(&t.id));
        Ok(())
    }

    async fn find_gateway(&self, name: &str) -> Result<Option<Identity>> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        let matches: Vec<&Gateway> = state.gateways.iter().filter(|g| g.name == name).collect();
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(Identity::new(matches[0].id.clone()))),
            _ => Err(CloudError::Ambiguous {
                what: format!("gateway {}", name),
                matches: matches.iter().map(|g| g.id.clone()).collect(),
            }),
        }
    }

    async fn create_gateway(&self, name: &str) -> Result<Identity> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state.seq += 1;
        let id = format!("api-{:06}", state.seq);
        let root = Route {
            id: format!("rte-{:06}-root", state.seq),
            path: "/".to_string(),
        };
        state.gateways.push(Gateway {
            id: id.clone(),
            name: name.to_string(),
            routes: vec![root],
            integrations: Vec::new(),
            stages: Vec::new(),
        });
        Ok(Identity::new(id))
    }

    async fn find_route(&self, gateway: &Identity, path: &str) -> Result<Option<Identity>> {
        self.take_fault()?;
        let state = self.state.lock().unwrap();
        let gateway = state
            .gateways
            .iter()
            .find(|g| g.id == gateway.arn())
            .ok_or_else(|| CloudError::NotFound {
                entity: format!("gateway {}", gateway),
            })?;
        Ok(gateway
            .routes
            .iter()
            .find(|r| r.path == path)
            .map(|r| Identity::new(r.id.clone())))
    }

    async fn create_route(
        &self,
        gateway: &Identity,
        _parent: &Identity,
        path: &str,
    ) -> Result<Identity> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state.seq += 1;
        let id = format!("rte-{:06}", state.seq);
        let gateway = state
            .gateways
            .iter_mut()
            .find(|g| g.id == gateway.arn())
            .ok_or_else(|| CloudError::NotFound {
                entity: format!("gateway {}", gateway),
            })?;
        gateway.routes.push(Route {
            id: id.clone(),
            path: path.to_string(),
        });
        Ok(Identity::new(id))
    }

    async fn attach_integration(
        &self,
        gateway: &Identity,
        route: &Identity,
        target: &Identity,
    ) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let gateway = state
            .gateways
            .iter_mut()
            .find(|g| g.id == gateway.arn())
            .ok_or_else(|| CloudError::NotFound {
                entity: format!("gateway {}", gateway),
            })?;
        if !gateway.routes.iter().any(|r| r.id == route.arn()) {
            return Err(CloudError::NotFound {
                entity: format!("route {}", route),
            });
        }
        if gateway.integrations.iter().any(|i| i.route_id == route.arn()) {
            return Err(CloudError::Conflict(format!(
                "method already attached to route {}",
                route
            )));
        }
        gateway.integrations.push(Integration {
            route_id: route.arn().to_string(),
            target: target.clone(),
        });
        Ok(())
    }

    async fn create_deployment(&self, gateway: &Identity, stage: &str) -> Result<()> {
        self.take_fault()?;
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        let gateway = state
            .gateways
            .iter_mut()
            .find(|g| g.id == gateway.arn())
            .ok_or_else(|| CloudError::NotFound {
                entity: format!("gateway {}", gateway),
            })?;
        if !gateway.stages.iter().any(|s| s == stage) {
            gateway.stages.push(stage.to_string());
        }
        Ok(())
    }
}
