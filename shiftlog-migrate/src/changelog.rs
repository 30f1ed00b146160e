//! Changelogs and the walk over their changesets.

use std::sync::Arc;

use tracing::debug;

use crate::changeset::ChangeSet;
use crate::database::Database;
use crate::error::MigrateResult;
use crate::filter::{ChangeSetFilter, ChangeSetFilterResult};

/// An ordered list of changesets loaded from one changelog.
#[derive(Debug, Clone, Default)]
pub struct DatabaseChangeLog {
    physical_path: String,
    change_sets: Vec<ChangeSet>,
}

impl DatabaseChangeLog {
    /// Create an empty changelog.
    pub fn new(physical_path: impl Into<String>) -> Self {
        Self {
            physical_path: physical_path.into(),
            change_sets: Vec::new(),
        }
    }

    /// Append a changeset.
    pub fn with_change_set(mut self, changeset: ChangeSet) -> Self {
        self.change_sets.push(changeset);
        self
    }

    /// Append a changeset.
    pub fn add_change_set(&mut self, changeset: ChangeSet) {
        self.change_sets.push(changeset);
    }

    /// Path the changelog was loaded from.
    pub fn physical_path(&self) -> &str {
        &self.physical_path
    }

    /// Changesets in declaration order.
    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    /// Find a changeset by identity.
    pub fn change_set(&self, file_path: &str, id: &str, author: &str) -> Option<&ChangeSet> {
        self.change_sets
            .iter()
            .find(|cs| cs.file_path() == file_path && cs.id() == id && cs.author() == author)
    }
}

/// Order in which a visitor walks the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Declaration order.
    Forward,
    /// Reverse declaration order.
    Reverse,
}

/// Processes changesets one at a time.
#[async_trait::async_trait]
pub trait ChangeSetVisitor: Send + Sync {
    /// Walk order this visitor expects.
    fn direction(&self) -> Direction;

    /// Process one changeset.
    async fn visit(
        &self,
        changeset: &mut ChangeSet,
        changelog: &DatabaseChangeLog,
        database: &dyn Database,
        filter_results: &[ChangeSetFilterResult],
    ) -> MigrateResult<()>;

    /// Called for changesets rejected by the walk's own filters.
    fn skipped(
        &self,
        _changeset: &ChangeSet,
        _changelog: &DatabaseChangeLog,
        _database: &dyn Database,
        _filter_results: &[ChangeSetFilterResult],
    ) -> MigrateResult<()> {
        Ok(())
    }
}

/// Walks a changelog, handing each changeset to a visitor.
///
/// The walk is sequential and stops at the first error, so changesets after
/// a failed one are never visited.
#[derive(Default, Clone)]
pub struct ChangeLogIterator {
    filters: Vec<Arc<dyn ChangeSetFilter>>,
}

impl std::fmt::Debug for ChangeLogIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLogIterator")
            .field("filters", &self.filters.len())
            .finish()
    }
}

impl ChangeLogIterator {
    /// Create an iterator without filters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only visit changesets accepted by `filter`.
    pub fn with_filter(mut self, filter: impl ChangeSetFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Visit every changeset of `changelog` with `visitor`.
    ///
    /// The visitor and its collaborators see the whole changelog. Each
    /// changeset is visited as a working copy that is written back once its
    /// visit returns, whether or not the visit succeeded.
    pub async fn run(
        &self,
        changelog: &mut DatabaseChangeLog,
        visitor: &dyn ChangeSetVisitor,
        database: &dyn Database,
    ) -> MigrateResult<()> {
        let order: Vec<usize> = match visitor.direction() {
            Direction::Forward => (0..changelog.change_sets.len()).collect(),
            Direction::Reverse => (0..changelog.change_sets.len()).rev().collect(),
        };

        for index in order {
            let mut changeset = changelog.change_sets[index].clone();
            let results: Vec<_> = self.filters.iter().map(|f| f.accepts(&changeset)).collect();

            if results.iter().all(|r| r.accepted) {
                let visited = visitor
                    .visit(&mut changeset, changelog, database, &results)
                    .await;
                changelog.change_sets[index] = changeset;
                visited?;
            } else {
                debug!(changeset = %changeset, "Changeset filtered out of the walk");
                visitor.skipped(&changeset, changelog, database, &results)?;
            }
        }

        Ok(())
    }
}
