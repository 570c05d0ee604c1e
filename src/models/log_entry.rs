use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Audit record. `subject_email` is a snapshot taken at write time.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub subject_email: String,
    pub object_id: Uuid,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub subject_id: Uuid,
    pub subject_email: String,
    pub object_id: Uuid,
    pub action: String,
}
