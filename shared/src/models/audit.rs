//! Audit trail models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An action recorded in the audit trail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_id: i64,
    pub action: String,
    pub resource: Option<String>,
    /// JSON-encoded details of the action
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording an audit entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAuditEntry {
    pub actor_id: i64,
    pub action: String,
    pub resource: Option<String>,
    pub details: Option<String>,
}
