// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Change-log storage operations.

use rusqlite::{params, Connection};
use serde_json::Value;

use super::error::{ChangeLogEntry, ChangeOperation};
use super::{StorageError, Store};

impl Store {
    // === Change Log Operations ===

    /// Returns true if a change with this (tenant, sequence) has already
    /// been applied. Used for idempotent re-application.
    pub fn has_applied_sequence(
        &self,
        tenant_id: &str,
        sequence_number: u64,
    ) -> Result<bool, StorageError> {
        has_applied_sequence(&self.conn, tenant_id, sequence_number)
    }

    /// Gets the change-log entries for an entity, in sequence order.
    pub fn changes_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<ChangeLogEntry>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT change_id, sequence_number, tenant_id, organization_id, clinic_id,
                    entity_type, entity_id, operation, data, previous_data, version,
                    timestamp, source_device_id, synced_at
             FROM changelog WHERE entity_type = ?1 AND entity_id = ?2
             ORDER BY sequence_number",
        )?;

        let rows = stmt.query_map(params![entity_type, entity_id], row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Gets the highest applied sequence number for a tenant, from the log
    /// itself (the cursor is the authoritative value; this is a consistency
    /// probe).
    pub fn max_applied_sequence(&self, tenant_id: &str) -> Result<Option<u64>, StorageError> {
        let max: Option<i64> = self
            .conn
            .query_row(
                "SELECT MAX(sequence_number) FROM changelog WHERE tenant_id = ?1",
                params![tenant_id],
                |row| row.get(0),
            )
            .unwrap_or(None);
        Ok(max.map(|v| v as u64))
    }

    /// Counts change-log entries for a tenant.
    pub fn count_changelog(&self, tenant_id: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM changelog WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Inserts a change-log row inside an open transaction.
pub(crate) fn insert_entry(
    conn: &Connection,
    entry: &ChangeLogEntry,
) -> Result<(), StorageError> {
    let data = serde_json::to_string(&entry.data)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    let previous = entry
        .previous_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    conn.execute(
        "INSERT INTO changelog
         (change_id, sequence_number, tenant_id, organization_id, clinic_id,
          entity_type, entity_id, operation, data, previous_data, version,
          timestamp, source_device_id, synced_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            entry.change_id,
            entry.sequence_number as i64,
            entry.tenant_id,
            entry.organization_id,
            entry.clinic_id,
            entry.entity_type,
            entry.entity_id,
            entry.operation.as_str(),
            data,
            previous,
            entry.version as i64,
            entry.timestamp,
            entry.source_device_id,
            entry.synced_at,
        ],
    )?;

    Ok(())
}

pub(crate) fn has_applied_sequence(
    conn: &Connection,
    tenant_id: &str,
    sequence_number: u64,
) -> Result<bool, StorageError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM changelog WHERE tenant_id = ?1 AND sequence_number = ?2",
        params![tenant_id, sequence_number as i64],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChangeLogEntry> {
    let operation: String = row.get(7)?;
    let data: String = row.get(8)?;
    let previous: Option<String> = row.get(9)?;

    Ok(ChangeLogEntry {
        change_id: row.get(0)?,
        sequence_number: row.get::<_, i64>(1)? as u64,
        tenant_id: row.get(2)?,
        organization_id: row.get(3)?,
        clinic_id: row.get(4)?,
        entity_type: row.get(5)?,
        entity_id: row.get(6)?,
        operation: ChangeOperation::parse(&operation).unwrap_or(ChangeOperation::Update),
        data: serde_json::from_str(&data).unwrap_or(Value::Null),
        previous_data: previous.and_then(|p| serde_json::from_str(&p).ok()),
        version: row.get::<_, i64>(10)? as u64,
        timestamp: row.get(11)?,
        source_device_id: row.get(12)?,
        synced_at: row.get(13)?,
    })
}
