//! Diagnostic context for changeset processing.
//!
//! Each visit runs inside a `changeset` span carrying the changeset's
//! identity. Outcome fields start empty and are recorded once known, so every
//! event logged while a changeset is processed carries the same context.

use serde_json::Value;
use tracing::Span;
use tracing::field::Empty;

use crate::changeset::{ChangeSet, ExecType};

/// Attribute holding the final exec type of a changeset.
pub const UPDATE_EXEC_TYPE: &str = "updateExecType";

/// Attribute holding the deployment the changeset ran in.
pub const DEPLOYMENT_ID: &str = "deploymentId";

/// Open the diagnostic span for `changeset`.
pub fn changeset_span(changeset: &ChangeSet) -> Span {
    let checksum = changeset
        .stored_checksum()
        .map(ToString::to_string)
        .unwrap_or_default();

    tracing::info_span!(
        "changeset",
        changeset.id = %changeset.id(),
        changeset.author = %changeset.author(),
        changeset.filepath = %changeset.file_path(),
        changeset.checksum = %checksum,
        changeset.exec_type = Empty,
        deployment.id = Empty,
    )
}

/// Attach the execution outcome to the changeset and the current span.
pub fn record_outcome(
    changeset: &mut ChangeSet,
    span: &Span,
    exec_type: ExecType,
    deployment_id: Option<String>,
) {
    span.record("changeset.exec_type", exec_type.value());
    if let Some(id) = &deployment_id {
        span.record("deployment.id", id.as_str());
    }

    changeset.set_attribute(UPDATE_EXEC_TYPE, exec_type.value());
    changeset.set_attribute(
        DEPLOYMENT_ID,
        deployment_id.map(Value::from).unwrap_or(Value::Null),
    );
}
