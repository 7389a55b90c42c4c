//! Diff engine
//!
//! Computes the delta between a desired attribute set and an observed
//! snapshot for one resource instance. Immutable-field violations are
//! checked before any additive entry is computed, so a categorically
//! impossible convergence never results in a partial apply.

use crate::attr::{AttrMap, AttrValue, tag_key, tag_value};
use crate::error::DiffError;
use serde::{Deserialize, Serialize};

const TAGS: &str = "Tags";

/// One attribute change: the path, what the spec wants, what was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub desired: Option<AttrValue>,
    pub observed: Option<AttrValue>,
}

impl std::fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let observed = self
            .observed
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<absent>".to_string());
        let desired = self
            .desired
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<absent>".to_string());
        write!(f, "{}: {} -> {}", self.path, observed, desired)
    }
}

/// The computed delta for one resource.
///
/// `changes` are additive/updating entries; `removals` are observed tags
/// absent from the desired set. Other attribute removal is not supported —
/// the control plane mostly cannot unset a field, only default it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub changes: Vec<DiffEntry>,
    pub removals: Vec<DiffEntry>,
}

impl Diff {
    /// An empty diff means the resource is already converged.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.removals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len() + self.removals.len()
    }

    /// Tag keys scheduled for removal.
    pub fn removed_tag_keys(&self) -> Vec<String> {
        self.removals
            .iter()
            .filter_map(|entry| entry.path.strip_prefix("Tags."))
            .map(|key| key.to_string())
            .collect()
    }
}

impl std::fmt::Display for Diff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to change, {} to remove",
            self.changes.len(),
            self.removals.len()
        )
    }
}

/// Compute the delta needed to converge `observed` toward `desired`.
///
/// Every path present in `desired` is compared; a path absent from
/// `observed` is an additive change. Tag lists are compared by key. Any
/// mismatch under one of `immutable` path prefixes is a fatal error.
pub fn diff(
    desired: &AttrMap,
    observed: &AttrMap,
    immutable: &[&str],
) -> Result<Diff, DiffError> {
    // Fatal violations first, before anything apply-able is produced.
    for (path, want) in desired {
        if !under_prefixes(path, immutable) {
            continue;
        }
        let seen = observed.get(path);
        if seen != Some(want) {
            return Err(DiffError::ImmutableField {
                path: path.clone(),
                desired: Some(want.clone()),
                observed: seen.cloned(),
            });
        }
    }

    let mut out = Diff::default();
    for (path, want) in desired {
        if path == TAGS || under_prefixes(path, immutable) {
            continue;
        }
        let seen = observed.get(path);
        if seen != Some(want) {
            out.changes.push(DiffEntry {
                path: path.clone(),
                desired: Some(want.clone()),
                observed: seen.cloned(),
            });
        }
    }

    diff_tags(desired, observed, &mut out);
    Ok(out)
}

/// Tag comparison is by key: missing or changed keys are additive, observed
/// keys absent from the desired set are removals.
fn diff_tags(desired: &AttrMap, observed: &AttrMap, out: &mut Diff) {
    let wanted = desired.get(TAGS).and_then(AttrValue::as_list);
    let seen = observed
        .get(TAGS)
        .and_then(AttrValue::as_list)
        .unwrap_or(&[]);

    let Some(wanted) = wanted else {
        // No desired tag set: leave observed tags alone.
        return;
    };

    for entry in wanted {
        let Some(key) = tag_key(entry) else { continue };
        let current = seen
            .iter()
            .find(|candidate| tag_key(candidate) == Some(key));
        if current.and_then(tag_value) != tag_value(entry) {
            out.changes.push(DiffEntry {
                path: format!("Tags.{}", key),
                desired: tag_value(entry).map(AttrValue::from),
                observed: current.and_then(tag_value).map(AttrValue::from),
            });
        }
    }

    for entry in seen {
        let Some(key) = tag_key(entry) else { continue };
        let still_wanted = wanted
            .iter()
            .any(|candidate| tag_key(candidate) == Some(key));
        if !still_wanted {
            out.removals.push(DiffEntry {
                path: format!("Tags.{}", key),
                desired: None,
                observed: tag_value(entry).map(AttrValue::from),
            });
        }
    }
}

fn under_prefixes(path: &str, prefixes: &[&str]) -> bool {
    let head = path.split('.').next().unwrap_or(path);
    prefixes.contains(&head)
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
    fn empty_when_converged() {
        let state = attrs(&[
            ("BillingMode", AttrValue::from("PROVISIONED")),
            ("ProvisionedThroughput.ReadCapacityUnits", AttrValue::from(5)),
        ]);
        let out = diff(&state, &state, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn absent_path_is_additive() {
        let desired = attrs(&[("MemorySize", AttrValue::from(256))]);
        let out = diff(&desired, &AttrMap::new(), &[]).unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].path, "MemorySize");
        assert_eq!(out.changes[0].observed, None);
    }

    #[test]
    fn observed_only_attrs_are_ignored() {
        let desired = attrs(&[("Timeout", AttrValue::from(30))]);
        let observed = attrs(&[
            ("Timeout", AttrValue::from(30)),
            ("CodeSha256", AttrValue::from("abc123")),
        ]);
        let out = diff(&desired, &observed, &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn immutable_mismatch_is_fatal_and_first() {
        let desired = attrs(&[
            ("KeySchema", AttrValue::List(vec![tag_entry("a", "HASH")])),
            ("Timeout", AttrValue::from(60)),
        ]);
        let observed = attrs(&[
            ("KeySchema", AttrValue::List(vec![tag_entry("b", "HASH")])),
            ("Timeout", AttrValue::from(30)),
        ]);
        let err = diff(&desired, &observed, &["KeySchema"]).unwrap_err();
        let DiffError::ImmutableField { path, .. } = err;
        assert_eq!(path, "KeySchema");
    }

    #[test]
    fn immutable_match_is_fine() {
        let schema = AttrValue::List(vec![tag_entry("a", "HASH")]);
        let desired = attrs(&[("KeySchema", schema.clone())]);
        let observed = attrs(&[("KeySchema", schema)]);
        assert!(diff(&desired, &observed, &["KeySchema"]).unwrap().is_empty());
    }

    #[test]
    fn tags_converge_by_key() {
        // observed {a:1, b:2}, desired {b:2, c:3} => add c, remove a
        let desired = attrs(&[(
            "Tags",
            AttrValue::List(vec![tag_entry("b", "2"), tag_entry("c", "3")]),
        )]);
        let observed = attrs(&[(
            "Tags",
            AttrValue::List(vec![tag_entry("a", "1"), tag_entry("b", "2")]),
        )]);
        let out = diff(&desired, &observed, &[]).unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].path, "Tags.c");
        assert_eq!(out.removals.len(), 1);
        assert_eq!(out.removals[0].path, "Tags.a");
        assert_eq!(out.removed_tag_keys(), vec!["a".to_string()]);
    }

    #[test]
    fn changed_tag_value_is_overwrite() {
        let desired = attrs(&[("Tags", AttrValue::List(vec![tag_entry("env", "prod")]))]);
        let observed = attrs(&[("Tags", AttrValue::List(vec![tag_entry("env", "dev")]))]);
        let out = diff(&desired, &observed, &[]).unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.changes[0].desired, Some(AttrValue::from("prod")));
        assert!(out.removals.is_empty());
    }

    #[test]
    fn no_desired_tags_leaves_observed_alone() {
        let observed = attrs(&[("Tags", AttrValue::List(vec![tag_entry("keep", "me")]))]);
        let out = diff(&AttrMap::new(), &observed, &[]).unwrap();
        assert!(out.is_empty());
    }
}
