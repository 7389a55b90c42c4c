//! Shared fixtures for the integration tests.

use stratus_cloud::{Env, RetryPolicy};
use stratus_cloud_memory::MemoryCloud;
use stratus_core::{AttrMap, AttrValue, ResourceSpec};

pub fn cloud() -> MemoryCloud {
    MemoryCloud::new(Env::new("us-east-1", "123456789012"))
}

pub fn policy() -> RetryPolicy {
    RetryPolicy::fast()
}

pub fn attrs(pairs: &[(&str, AttrValue)]) -> AttrMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Provisioned table with a change stream, the shape most tests need.
pub fn orders_table(read: i64) -> ResourceSpec {
    ResourceSpec::table(
        "orders",
        &["id:s:hash"],
        attrs(&[
            ("read", AttrValue::Int(read)),
            ("write", AttrValue::Int(5)),
            ("stream", AttrValue::from("keys_only")),
        ]),
    )
    .expect("valid table spec")
}
