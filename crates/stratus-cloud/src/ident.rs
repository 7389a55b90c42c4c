//! Resource identities
//!
//! Every created resource is addressed by an ARN-style identity string.
//! Constructors here are the single place the formats live; the rest of
//! the engine treats identities as opaque.

use serde::{Deserialize, Serialize};
use stratus_core::ResourceKind;

/// Region and account a pass runs against, used wherever an identity has
/// to be derived rather than returned by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub region: String,
    pub account: String,
}

impl Env {
    pub fn new(region: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
        }
    }
}

/// ARN-style identity of a live resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(arn: impl Into<String>) -> Self {
        Self(arn.into())
    }

    pub fn arn(&self) -> &str {
        &self.0
    }

    /// Last path segment of the ARN, used when deriving statement ids.
    pub fn leaf(&self) -> &str {
        self.0.rsplit(':').next().unwrap_or(&self.0)
    }

    pub fn for_kind(kind: ResourceKind, region: &str, account: &str, name: &str) -> Self {
        match kind {
            ResourceKind::Table => Self::table(region, account, name),
            ResourceKind::Bucket => Self::bucket(name),
            ResourceKind::Key => Self::key(region, account, name),
            ResourceKind::Role => Self::role(account, name),
            ResourceKind::Function => Self::function(region, account, name),
            ResourceKind::InstanceProfile => Self::instance_profile(account, name),
        }
    }

    pub fn table(region: &str, account: &str, name: &str) -> Self {
        Self(format!("arn:aws:dynamodb:{region}:{account}:table/{name}"))
    }

    pub fn bucket(name: &str) -> Self {
        Self(format!("arn:aws:s3:::{name}"))
    }

    pub fn key(region: &str, account: &str, name: &str) -> Self {
        Self(format!("arn:aws:kms:{region}:{account}:key/{name}"))
    }

    pub fn role(account: &str, name: &str) -> Self {
        Self(format!("arn:aws:iam::{account}:role/{name}"))
    }

    pub fn function(region: &str, account: &str, name: &str) -> Self {
        Self(format!("arn:aws:lambda:{region}:{account}:function:{name}"))
    }

    pub fn instance_profile(account: &str, name: &str) -> Self {
        Self(format!("arn:aws:iam::{account}:instance-profile/{name}"))
    }

    pub fn queue(region: &str, account: &str, name: &str) -> Self {
        Self(format!("arn:aws:sqs:{region}:{account}:{name}"))
    }

    pub fn schedule_rule(region: &str, account: &str, name: &str) -> Self {
        Self(format!("arn:aws:events:{region}:{account}:rule/{name}"))
    }

    /// Wildcard execute identity for every route and stage of a gateway.
    pub fn gateway_execute(region: &str, account: &str, api_id: &str) -> Self {
        Self(format!("arn:aws:execute-api:{region}:{account}:{api_id}/*/*/*"))
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Identity {
    fn from(arn: String) -> Self {
        Self(arn)
    }
}
