//! Storage error types and shared row structs.

use serde_json::Value;
use thiserror::Error;

use crate::merge::FieldConflict;

/// Storage error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Secret backend unavailable: {0}")]
    SecretBackend(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

/// Domain mutation kind carried by change-log and pending rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(ChangeOperation::Insert),
            "update" => Some(ChangeOperation::Update),
            "delete" => Some(ChangeOperation::Delete),
            _ => None,
        }
    }
}

/// An applied change in the append-only log.
///
/// Once `sequence_number` is assigned by the server the entry is immutable.
#[derive(Debug, Clone)]
pub struct ChangeLogEntry {
    pub change_id: String,
    /// Server-assigned, monotonic per tenant.
    pub sequence_number: u64,
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub data: Value,
    pub previous_data: Option<Value>,
    /// Record version after this change; feeds the CRDT metadata.
    pub version: u64,
    /// Unix milliseconds.
    pub timestamp: i64,
    pub source_device_id: Option<String>,
    pub synced_at: Option<i64>,
}

/// A locally originated mutation awaiting server acceptance.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub local_id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: ChangeOperation,
    pub data: Value,
    pub previous_data: Option<Value>,
    /// Unix milliseconds; batches upload in this order.
    pub created_at: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub synced: bool,
}

/// Highest sequence number durably applied for a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub tenant_id: String,
    pub last_synced_sequence: u64,
    /// Unix milliseconds.
    pub last_synced_at: i64,
}

/// A merge that needs the user's decision, parked in the inbox.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub id: String,
    pub tenant_id: String,
    pub resource_type: String,
    pub resource_id: String,
    pub conflicts: Vec<FieldConflict>,
    /// Snapshot of the local record at conflict time.
    pub local_data: Value,
    /// The remote patch that collided.
    pub remote_patch: Value,
    /// Unix milliseconds.
    pub created_at: i64,
    pub resolved: bool,
}

/// A domain record row: opaque document plus CRDT metadata.
#[derive(Debug, Clone)]
pub struct DomainRecord {
    pub id: String,
    pub tenant_id: String,
    pub organization_id: String,
    pub clinic_id: Option<String>,
    pub data: Value,
    pub meta: crate::sync::envelope::RecordMeta,
}
