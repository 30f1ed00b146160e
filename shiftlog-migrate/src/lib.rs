//! # shiftlog-migrate
//!
//! Changeset execution core for the Shiftlog migration engine.
//!
//! This crate provides:
//! - The [`UpdateVisitor`], which applies changesets one at a time and
//!   records their outcome
//! - Versioned checksums that are upgraded in place when the checksum
//!   algorithm changes, so already applied changesets are not mistaken for
//!   modified ones
//! - The capability traits the visitor drives: [`Database`], [`Executor`],
//!   [`ChangeLogHistoryService`], [`ChangeExecListener`], [`ChangeSetFilter`]
//! - A dry-run [`LoggingExecutor`] and an [`InMemoryDatabase`] backend
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐  visit   ┌────────────────┐  execute  ┌─────────────┐
//! │ ChangeLogIterator│─────────▶│ UpdateVisitor  │──────────▶│ Executor    │
//! └──────────────────┘          └────────────────┘           └─────────────┘
//!                                  │          │
//!                       accepts    ▼          ▼  run status / mark ran
//!                       ┌────────────────┐  ┌─────────────┐
//!                       │ ChangeSetFilter│  │ Database    │
//!                       └────────────────┘  └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use shiftlog_migrate::{
//!     Change, ChangeLogHistoryService, ChangeLogIterator, ChangeSet, DatabaseChangeLog,
//!     HistoryServiceFactory, InMemoryDatabase, UpdateVisitor,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), shiftlog_migrate::MigrationError> {
//! let db = InMemoryDatabase::new("app");
//! let history = db.history_service();
//! history.generate_deployment_id();
//!
//! let histories = Arc::new(HistoryServiceFactory::new());
//! histories.register("app", history);
//!
//! let visitor = UpdateVisitor::new(db.executor_service(), histories);
//!
//! let mut changelog = DatabaseChangeLog::new("db/changelog.sql").with_change_set(
//!     ChangeSet::new("1", "alice", "db/changelog.sql")
//!         .with_change(Change::sql("CREATE TABLE users (id INT)")),
//! );
//!
//! ChangeLogIterator::new().run(&mut changelog, &visitor, &db).await?;
//! assert_eq!(db.applied_sql(), vec!["CREATE TABLE users (id INT)"]);
//! # Ok(())
//! # }
//! ```

pub mod changelog;
pub mod changeset;
pub mod checksum;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod filter;
pub mod history;
pub mod listener;
pub mod logging;
pub mod mdc;
pub mod memory;
pub mod ui;
pub mod visitor;

// Re-exports
pub use changelog::{ChangeLogIterator, ChangeSetVisitor, DatabaseChangeLog, Direction};
pub use changeset::{
    Change, ChangeSet, ExecType, Precondition, PreconditionFailAction, Preconditions, RunStatus,
};
pub use checksum::{Checksum, ChecksumVersion, ChecksumVersions};
pub use config::UpdateConfig;
pub use database::{Database, ObjectQuotingStrategy};
pub use error::{MigrateResult, MigrationError};
pub use executor::{
    DEFAULT_HISTORY_TABLE, Executor, ExecutorService, LoggingExecutor, PRIMARY_EXECUTOR,
    SqlStatement,
};
pub use filter::{ChangeSetFilter, ChangeSetFilterResult};
pub use history::{ChangeLogHistoryService, HistoryServiceFactory, RanChangeSet};
pub use listener::ChangeExecListener;
pub use memory::{InMemoryDatabase, InMemoryExecutor, InMemoryHistoryService};
pub use ui::{BufferedUiService, ConsoleUiService, SilentUiService, UiService};
pub use visitor::UpdateVisitor;
