//! Run history tracking.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::changeset::ExecType;
use crate::checksum::Checksum;
use crate::database::Database;
use crate::error::{MigrateResult, MigrationError};

/// A changeset recorded in the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RanChangeSet {
    /// Changeset id.
    pub id: String,
    /// Changeset author.
    pub author: String,
    /// Changelog path.
    pub file_path: String,
    /// Checksum recorded at execution or at the last checksum upgrade.
    pub last_checksum: Option<Checksum>,
    /// When the changeset was executed.
    pub date_executed: DateTime<Utc>,
    /// Recorded outcome.
    pub exec_type: ExecType,
    /// Position in execution order, starting at 1.
    pub order_executed: u64,
    /// Deployment the changeset was executed in.
    pub deployment_id: Option<String>,
}

impl RanChangeSet {
    /// Whether this record identifies the given changeset.
    pub fn is_same_as(&self, id: &str, author: &str, file_path: &str) -> bool {
        self.id == id && self.author == author && self.file_path == file_path
    }
}

/// Durable record of prior executions for one database.
#[async_trait::async_trait]
pub trait ChangeLogHistoryService: Send + Sync {
    /// Identifier of the current deployment, if one was generated.
    fn deployment_id(&self) -> Option<String>;

    /// Start a new deployment.
    fn generate_deployment_id(&self);

    /// Forget the current deployment.
    fn reset_deployment_id(&self);

    /// Changesets recorded so far, in execution order.
    async fn ran_change_sets(&self) -> MigrateResult<Vec<RanChangeSet>>;
}

/// Generate a 10 digit deployment id from the current time.
pub fn new_deployment_id() -> String {
    let millis = Utc::now().timestamp_millis().to_string();
    millis[millis.len().saturating_sub(10)..].to_string()
}

/// Resolves the history service for a database.
#[derive(Default)]
pub struct HistoryServiceFactory {
    services: RwLock<HashMap<String, Arc<dyn ChangeLogHistoryService>>>,
}

impl std::fmt::Debug for HistoryServiceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryServiceFactory")
            .field("databases", &self.services.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HistoryServiceFactory {
    /// Create an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the history service for the database named `database`.
    pub fn register(&self, database: impl Into<String>, service: Arc<dyn ChangeLogHistoryService>) {
        self.services.write().insert(database.into(), service);
    }

    /// Resolve the history service for `database`.
    pub fn history_service(
        &self,
        database: &dyn Database,
    ) -> MigrateResult<Arc<dyn ChangeLogHistoryService>> {
        self.services
            .read()
            .get(database.name())
            .cloned()
            .ok_or_else(|| MigrationError::HistoryServiceNotFound(database.name().to_string()))
    }
}
