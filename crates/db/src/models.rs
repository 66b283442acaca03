//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (nodes, connections, layout).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// runs
// ---------------------------------------------------------------------------

/// A persisted run record row. Append-only: written once when a run
/// finishes, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub workflow_name: String,
    pub timestamp: DateTime<Utc>,
    /// "Success" or "Failed".
    pub status: String,
    /// Nodes + connections + layout at run time.
    pub workflow_snapshot: serde_json::Value,
    /// `{ finalWorkflowData, serverLogs }`.
    pub execution_result: serde_json::Value,
    pub initial_data: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

/// A persisted credential row, scoped to a user by `user_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRow {
    pub id: Uuid,
    pub user_id: String,
    /// User-friendly name referenced by `{{credential.<name>}}`.
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}
