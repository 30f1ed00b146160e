//! # Shiftlog
//!
//! Changelog-driven database migrations with stable, versioned checksums.
//!
//! Shiftlog provides:
//! - An update visitor that applies each changeset at most once per run
//! - Durable run history with rerun detection
//! - Checksums that survive algorithm upgrades without re-running changesets
//! - Dry-run execution that records SQL instead of applying it
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shiftlog::prelude::*;
//!
//! let visitor = UpdateVisitor::new(executors, histories)
//!     .with_listener(listener)
//!     .with_should_run_filter(filter);
//!
//! ChangeLogIterator::new().run(&mut changelog, &visitor, &database).await?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The changeset execution core.
pub mod migrate {
    pub use shiftlog_migrate::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        Change, ChangeExecListener, ChangeLogHistoryService, ChangeLogIterator, ChangeSet,
        ChangeSetFilter, ChangeSetFilterResult, ChangeSetVisitor, Checksum, ChecksumVersion,
        ChecksumVersions, Database, DatabaseChangeLog, ExecType, ExecutorService,
        HistoryServiceFactory, MigrateResult, MigrationError, RunStatus, UpdateConfig,
        UpdateVisitor,
    };
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationError, UpdateVisitor};
