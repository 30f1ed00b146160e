//! Changeset acceptance filters.

use serde::{Deserialize, Serialize};

use crate::changeset::ChangeSet;

/// Decision of a filter about one changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetFilterResult {
    /// Whether the changeset should run.
    pub accepted: bool,
    /// Why the filter decided the way it did.
    pub reasons: Vec<String>,
}

impl ChangeSetFilterResult {
    /// An accepting result.
    pub fn accept(reason: impl Into<String>) -> Self {
        Self {
            accepted: true,
            reasons: vec![reason.into()],
        }
    }

    /// A rejecting result.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reasons: vec![reason.into()],
        }
    }

    /// Add another reason, ignoring duplicates.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self
    }
}

/// Decides whether a changeset should run.
///
/// Filters are total: every changeset gets a result.
pub trait ChangeSetFilter: Send + Sync {
    /// Decide about `changeset`.
    fn accepts(&self, changeset: &ChangeSet) -> ChangeSetFilterResult;
}

impl<F> ChangeSetFilter for F
where
    F: Fn(&ChangeSet) -> ChangeSetFilterResult + Send + Sync,
{
    fn accepts(&self, changeset: &ChangeSet) -> ChangeSetFilterResult {
        self(changeset)
    }
}
