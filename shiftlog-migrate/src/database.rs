//! The target database as seen by the execution core.

use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeSet, ExecType, RunStatus};
use crate::error::MigrateResult;

/// How object names are quoted in generated SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectQuotingStrategy {
    /// Quote only names that need it.
    #[default]
    Legacy,
    /// Quote every object name.
    QuoteAllObjects,
    /// Quote names that collide with reserved words.
    QuoteOnlyReservedWords,
}

/// Connection state and run history access for one target database.
///
/// Implementations own the connection and its transaction. The quoting
/// strategy is connection state, so it is read and written through `&self`.
#[async_trait::async_trait]
pub trait Database: Send + Sync {
    /// Name used to resolve executors and history services.
    fn name(&self) -> &str;

    /// Prior outcome of `changeset` according to the run history.
    async fn run_status(&self, changeset: &ChangeSet) -> MigrateResult<RunStatus>;

    /// Commit the current transaction.
    async fn commit(&self) -> MigrateResult<()>;

    /// Current object quoting strategy.
    fn object_quoting_strategy(&self) -> ObjectQuotingStrategy;

    /// Replace the object quoting strategy.
    fn set_object_quoting_strategy(&self, strategy: ObjectQuotingStrategy);

    /// Record the outcome of executing `changeset`.
    async fn mark_change_set_exec_status(
        &self,
        changeset: &ChangeSet,
        exec_type: ExecType,
    ) -> MigrateResult<()>;
}
