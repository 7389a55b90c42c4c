//! Reconciliation outcomes

use crate::diff::Diff;
use serde::{Deserialize, Serialize};

/// Whether a pass only reports the delta or also applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Dry-run: compute and report, issue no mutating call.
    Preview,
    Apply,
}

impl Mode {
    pub fn is_preview(&self) -> bool {
        matches!(self, Mode::Preview)
    }
}

/// Per-resource result of `ensure` or `remove`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    WouldCreate,
    Created,
    WouldUpdate { diff: Diff },
    Updated { diff: Diff },
    Unchanged,
    WouldDelete,
    Deleted,
    Absent,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::WouldCreate => "would-create",
            Outcome::Created => "created",
            Outcome::WouldUpdate { .. } => "would-update",
            Outcome::Updated { .. } => "updated",
            Outcome::Unchanged => "unchanged",
            Outcome::WouldDelete => "would-delete",
            Outcome::Deleted => "deleted",
            Outcome::Absent => "absent",
        }
    }

    /// True when the outcome mutated (or would mutate) remote state.
    pub fn is_change(&self) -> bool {
        !matches!(self, Outcome::Unchanged | Outcome::Absent)
    }

    pub fn diff(&self) -> Option<&Diff> {
        match self {
            Outcome::WouldUpdate { diff } | Outcome::Updated { diff } => Some(diff),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.diff() {
            Some(diff) => write!(f, "{} ({})", self.label(), diff),
            None => write!(f, "{}", self.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels() {
        assert_eq!(Outcome::Created.label(), "created");
        assert_eq!(
            Outcome::WouldUpdate { diff: Diff::default() }.label(),
            "would-update"
        );
        assert!(!Outcome::Unchanged.is_change());
        assert!(Outcome::WouldCreate.is_change());
    }
}
