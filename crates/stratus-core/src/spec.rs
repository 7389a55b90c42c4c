//! Desired-state specs
//!
//! A `ResourceSpec` is validated against the kind's attribute schema when it
//! is constructed, so an unknown path or a half-provisioned throughput is
//! rejected before any control-plane call is made.

use crate::attr::{AttrMap, AttrValue};
use crate::error::SpecError;
use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};

const READ_CAPACITY: &str = "ProvisionedThroughput.ReadCapacityUnits";
const WRITE_CAPACITY: &str = "ProvisionedThroughput.WriteCapacityUnits";
const STREAM_VIEW_TYPE: &str = "StreamSpecification.StreamViewType";
const STREAM_ENABLED: &str = "StreamSpecification.StreamEnabled";

/// Desired state for one resource instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub attributes: AttrMap,
}

impl ResourceSpec {
    /// Build a validated spec. Shortcut aliases are expanded, table billing
    /// mode is inferred, and every attribute path is checked against the
    /// kind's schema.
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        attributes: AttrMap,
    ) -> Result<Self, SpecError> {
        let mut attributes = expand_shortcuts(kind, attributes);
        if kind == ResourceKind::Table {
            finish_table(&mut attributes)?;
        }
        validate(kind, &attributes)?;
        Ok(Self {
            kind,
            name: name.into(),
            attributes,
        })
    }

    /// Build a table spec from key-schema columns (`name:type:keytype`,
    /// e.g. `userid:s:hash`) plus any further attributes.
    pub fn table(
        name: impl Into<String>,
        columns: &[&str],
        extra: AttrMap,
    ) -> Result<Self, SpecError> {
        let mut definitions = Vec::new();
        let mut key_schema = Vec::new();
        for column in columns {
            let parts: Vec<&str> = column.split(':').collect();
            let [attr_name, attr_type, key_type] = parts[..] else {
                return Err(SpecError::InvalidColumn(column.to_string()));
            };
            if !matches!(attr_type.to_ascii_lowercase().as_str(), "s" | "n" | "b") {
                return Err(SpecError::InvalidColumn(column.to_string()));
            }
            if !matches!(key_type.to_ascii_lowercase().as_str(), "hash" | "range") {
                return Err(SpecError::InvalidColumn(column.to_string()));
            }
            let mut definition = AttrMap::new();
            definition.insert("AttributeName".into(), AttrValue::from(attr_name));
            definition.insert(
                "AttributeType".into(),
                AttrValue::Str(attr_type.to_ascii_uppercase()),
            );
            definitions.push(definition);

            let mut key = AttrMap::new();
            key.insert("AttributeName".into(), AttrValue::from(attr_name));
            key.insert("KeyType".into(), AttrValue::Str(key_type.to_ascii_uppercase()));
            key_schema.push(key);
        }

        let mut attributes = extra;
        attributes.insert("AttributeDefinitions".into(), AttrValue::List(definitions));
        attributes.insert("KeySchema".into(), AttrValue::List(key_schema));
        Self::new(ResourceKind::Table, name, attributes)
    }

    /// The desired `Tags` entries, empty if none were specified.
    pub fn tags(&self) -> &[AttrMap] {
        self.attributes
            .get("Tags")
            .and_then(AttrValue::as_list)
            .unwrap_or(&[])
    }
}

fn expand_shortcuts(kind: ResourceKind, mut attributes: AttrMap) -> AttrMap {
    for (short, full) in kind.shortcuts() {
        if let Some(value) = attributes.remove(*short) {
            attributes.insert(full.to_string(), value);
        }
    }
    attributes
}

/// Table-specific normalization: stream view type implies the stream is
/// enabled, and the billing mode follows from whether capacity was
/// provisioned.
fn finish_table(attributes: &mut AttrMap) -> Result<(), SpecError> {
    if let Some(view_type) = attributes.get(STREAM_VIEW_TYPE) {
        let upper = match view_type.as_str() {
            Some(s) => AttrValue::Str(s.to_ascii_uppercase()),
            None => {
                return Err(SpecError::InvalidValue {
                    path: STREAM_VIEW_TYPE.to_string(),
                    message: "stream view type must be a string".to_string(),
                });
            }
        };
        attributes.insert(STREAM_VIEW_TYPE.to_string(), upper);
        attributes.insert(STREAM_ENABLED.to_string(), AttrValue::Bool(true));
    }

    let read = attributes.contains_key(READ_CAPACITY);
    let write = attributes.contains_key(WRITE_CAPACITY);
    if read != write {
        return Err(SpecError::PartialThroughput);
    }
    let billing = if read { "PROVISIONED" } else { "PAY_PER_REQUEST" };
    attributes.insert("BillingMode".to_string(), AttrValue::from(billing));
    Ok(())
}

fn validate(kind: ResourceKind, attributes: &AttrMap) -> Result<(), SpecError> {
    for path in attributes.keys() {
        let prefix = path.split('.').next().unwrap_or(path);
        if !kind.known_prefixes().contains(&prefix) {
            return Err(SpecError::UnknownAttribute {
                kind,
                path: path.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::tag_entry;

    fn attrs(pairs: &[(&str, AttrValue)]) -> AttrMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn table_columns_expand_to_schema() {
        let spec = ResourceSpec::table(
            "orders",
            &["id:s:hash"],
            attrs(&[("read", AttrValue::from(5)), ("write", AttrValue::from(5))]),
        )
        .unwrap();

        let schema = spec.attributes.get("KeySchema").unwrap().as_list().unwrap();
        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].get("KeyType").unwrap().as_str(), Some("HASH"));
        assert_eq!(
            spec.attributes.get("BillingMode").unwrap().as_str(),
            Some("PROVISIONED")
        );
        assert_eq!(
            spec.attributes.get(READ_CAPACITY).unwrap().as_int(),
            Some(5)
        );
    }

    #[test]
    fn on_demand_when_no_capacity() {
        let spec = ResourceSpec::table("orders", &["id:s:hash"], AttrMap::new()).unwrap();
        assert_eq!(
            spec.attributes.get("BillingMode").unwrap().as_str(),
            Some("PAY_PER_REQUEST")
        );
    }

    #[test]
    fn half_provisioned_is_rejected() {
        let err = ResourceSpec::table(
            "orders",
            &["id:s:hash"],
            attrs(&[("read", AttrValue::from(5))]),
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::PartialThroughput));
    }

    #[test]
    fn stream_shortcut_enables_stream() {
        let spec = ResourceSpec::table(
            "orders",
            &["id:s:hash"],
            attrs(&[("stream", AttrValue::from("keys_only"))]),
        )
        .unwrap();
        assert_eq!(
            spec.attributes.get(STREAM_VIEW_TYPE).unwrap().as_str(),
            Some("KEYS_ONLY")
        );
        assert_eq!(
            spec.attributes.get(STREAM_ENABLED).unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn unknown_attribute_is_rejected() {
        let err = ResourceSpec::new(
            ResourceKind::Bucket,
            "data",
            attrs(&[("ProvisionedThroughput.ReadCapacityUnits", AttrValue::from(5))]),
        )
        .unwrap_err();
        assert!(matches!(err, SpecError::UnknownAttribute { .. }));
    }

    #[test]
    fn bad_column_is_rejected() {
        assert!(matches!(
            ResourceSpec::table("orders", &["id:hash"], AttrMap::new()),
            Err(SpecError::InvalidColumn(_))
        ));
        assert!(matches!(
            ResourceSpec::table("orders", &["id:x:hash"], AttrMap::new()),
            Err(SpecError::InvalidColumn(_))
        ));
    }

    #[test]
    fn tags_accessor() {
        let spec = ResourceSpec::new(
            ResourceKind::Bucket,
            "data",
            attrs(&[("Tags", AttrValue::List(vec![tag_entry("team", "data")]))]),
        )
        .unwrap();
        assert_eq!(spec.tags().len(), 1);
    }
}
