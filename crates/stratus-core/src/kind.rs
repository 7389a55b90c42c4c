//! Resource kinds and their attribute schemas

use serde::{Deserialize, Serialize};

/// The resource kinds this engine knows how to reconcile.
///
/// The set is fixed; ordering constraints between dependent kinds are
/// enforced by the pass orchestration, not inferred from a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    Bucket,
    Key,
    Role,
    Function,
    InstanceProfile,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Table => "table",
            ResourceKind::Bucket => "bucket",
            ResourceKind::Key => "key",
            ResourceKind::Role => "role",
            ResourceKind::Function => "function",
            ResourceKind::InstanceProfile => "instance-profile",
        }
    }

    /// Top-level attribute path segments accepted for this kind.
    pub fn known_prefixes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Table => &[
                "AttributeDefinitions",
                "KeySchema",
                "ProvisionedThroughput",
                "StreamSpecification",
                "BillingMode",
                "Tags",
            ],
            ResourceKind::Bucket => &["Acl", "LocationConstraint", "Versioning", "Tags"],
            ResourceKind::Key => &["Description", "KeyUsage", "KeySpec", "Tags"],
            ResourceKind::Role => &["Path", "Principal", "Description", "Tags"],
            ResourceKind::Function => &[
                "Runtime",
                "Handler",
                "MemorySize",
                "Timeout",
                "Environment",
                "ReservedConcurrency",
                "PackageType",
                "CodeSha256",
                "Tags",
            ],
            ResourceKind::InstanceProfile => &["Path", "Role", "Tags"],
        }
    }

    /// Path prefixes that cannot change once the resource exists.
    ///
    /// A diff touching one of these is fatal: converging it would require
    /// resource replacement, which this engine never performs on its own.
    pub fn immutable_prefixes(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Table => &["KeySchema", "AttributeDefinitions"],
            ResourceKind::Bucket => &["LocationConstraint"],
            ResourceKind::Key => &["KeyUsage", "KeySpec"],
            ResourceKind::Role => &["Path"],
            ResourceKind::Function => &["PackageType"],
            ResourceKind::InstanceProfile => &["Path"],
        }
    }

    /// Short attribute aliases expanded at spec construction.
    pub fn shortcuts(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            ResourceKind::Table => &[
                ("read", "ProvisionedThroughput.ReadCapacityUnits"),
                ("write", "ProvisionedThroughput.WriteCapacityUnits"),
                ("stream", "StreamSpecification.StreamViewType"),
            ],
            ResourceKind::Function => &[
                ("memory", "MemorySize"),
                ("timeout", "Timeout"),
                ("concurrency", "ReservedConcurrency"),
            ],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(ResourceKind::Table),
            "bucket" => Ok(ResourceKind::Bucket),
            "key" => Ok(ResourceKind::Key),
            "role" => Ok(ResourceKind::Role),
            "function" => Ok(ResourceKind::Function),
            "instance-profile" => Ok(ResourceKind::InstanceProfile),
            other => Err(format!("unknown resource kind: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip() {
        for kind in [
            ResourceKind::Table,
            ResourceKind::Bucket,
            ResourceKind::Key,
            ResourceKind::Role,
            ResourceKind::Function,
            ResourceKind::InstanceProfile,
        ] {
            let parsed: ResourceKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn table_schema_is_immutable() {
        assert!(
            ResourceKind::Table
                .immutable_prefixes()
                .contains(&"KeySchema")
        );
        assert!(!ResourceKind::Bucket.immutable_prefixes().contains(&"Acl"));
    }
}
