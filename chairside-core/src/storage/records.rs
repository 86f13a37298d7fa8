// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Domain-record storage operations.
//!
//! Domain records are opaque JSON documents plus CRDT metadata, routed to
//! per-kind tables. The two composite transitions that must never leave
//! split state live here: `apply_remote_change` (change log + domain write
//! + cursor advance) and `record_local_change` (domain write + pending
//! queue row).

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::error::{ChangeLogEntry, ChangeOperation, DomainRecord, PendingChange};
use super::{changelog, cursors, pending, StorageError, Store};
use crate::sync::entity::EntityKind;
use crate::sync::envelope::RecordMeta;

/// Result of applying a remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedChange {
    /// The change was applied and the cursor advanced.
    Applied,
    /// The (tenant, sequence) pair was already in the log; nothing written.
    Duplicate,
}

impl Store {
    // === Domain Record Operations ===

    /// Gets a domain record by kind and primary key.
    pub fn get_record(
        &self,
        kind: EntityKind,
        tenant_id: &str,
        id: &str,
    ) -> Result<Option<DomainRecord>, StorageError> {
        get_record(&self.conn, kind, tenant_id, id)
    }

    /// Lists the records of a kind for a tenant.
    pub fn list_records(
        &self,
        kind: EntityKind,
        tenant_id: &str,
    ) -> Result<Vec<DomainRecord>, StorageError> {
        let sql = format!(
            "SELECT id, tenant_id, organization_id, clinic_id, data, version, updated_at, actor_id
             FROM {} WHERE tenant_id = ?1 ORDER BY id",
            kind.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Lists the records of a kind linked to a patient.
    pub fn records_for_patient(
        &self,
        kind: EntityKind,
        tenant_id: &str,
        patient_id: &str,
    ) -> Result<Vec<DomainRecord>, StorageError> {
        if !kind.has_patient_fk() {
            return Err(StorageError::NotFound(format!(
                "{} records carry no patient link",
                kind
            )));
        }
        let sql = format!(
            "SELECT id, tenant_id, organization_id, clinic_id, data, version, updated_at, actor_id
             FROM {} WHERE tenant_id = ?1 AND patient_id = ?2 ORDER BY id",
            kind.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id, patient_id], row_to_record)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Applies a remote change atomically: change-log append, domain
    /// upsert/delete, cursor advance. Re-applying a (tenant, sequence)
    /// already in the log is a no-op.
    ///
    /// `apply_to_domain` is false for client-wins collisions, where the log
    /// and cursor advance but the local record stays authoritative.
    /// `cursor_target` lets the caller advance the cursor past the entry's
    /// own sequence (to the server's current sequence) within the same
    /// transaction as the final write.
    pub fn apply_remote_change(
        &mut self,
        entry: &ChangeLogEntry,
        apply_to_domain: bool,
        cursor_target: Option<u64>,
    ) -> Result<AppliedChange, StorageError> {
        let tx = self.conn.transaction()?;

        if changelog::has_applied_sequence(&tx, &entry.tenant_id, entry.sequence_number)? {
            return Ok(AppliedChange::Duplicate);
        }

        changelog::insert_entry(&tx, entry)?;

        if apply_to_domain {
            if let Some(kind) = EntityKind::from_entity_type(&entry.entity_type) {
                match entry.operation {
                    ChangeOperation::Insert | ChangeOperation::Update => {
                        let record = DomainRecord {
                            id: entry.entity_id.clone(),
                            tenant_id: entry.tenant_id.clone(),
                            organization_id: entry.organization_id.clone(),
                            clinic_id: entry.clinic_id.clone(),
                            data: entry.data.clone(),
                            meta: RecordMeta {
                                version: entry.version,
                                updated_at: entry.timestamp,
                                actor_id: entry
                                    .source_device_id
                                    .clone()
                                    .unwrap_or_else(|| "server".to_string()),
                            },
                        };
                        upsert_record(&tx, kind, &record)?;
                    }
                    ChangeOperation::Delete => {
                        delete_record(&tx, kind, &entry.tenant_id, &entry.entity_id)?;
                    }
                }
            } else {
                log::debug!("skipping change for unknown entity type {}", entry.entity_type);
            }
        }

        let target = cursor_target
            .unwrap_or(entry.sequence_number)
            .max(entry.sequence_number);
        cursors::advance_cursor(&tx, &entry.tenant_id, target)?;

        tx.commit()?;
        Ok(AppliedChange::Applied)
    }

    /// Records a local mutation atomically: domain upsert/delete plus the
    /// pending-queue row the uploader will pick up.
    ///
    /// The record's version bumps past whatever is stored; metadata actor is
    /// this device. Returns the metadata written.
    pub fn record_local_change(
        &mut self,
        kind: EntityKind,
        change: &PendingChange,
        actor_id: &str,
    ) -> Result<RecordMeta, StorageError> {
        let tx = self.conn.transaction()?;

        let current = get_record(&tx, kind, &change.tenant_id, &change.entity_id)?;
        let meta = RecordMeta {
            version: current.as_ref().map(|r| r.meta.version).unwrap_or(0) + 1,
            updated_at: change.created_at,
            actor_id: actor_id.to_string(),
        };

        match change.operation {
            ChangeOperation::Insert | ChangeOperation::Update => {
                let record = DomainRecord {
                    id: change.entity_id.clone(),
                    tenant_id: change.tenant_id.clone(),
                    organization_id: change.organization_id.clone(),
                    clinic_id: change.clinic_id.clone(),
                    data: change.data.clone(),
                    meta: meta.clone(),
                };
                upsert_record(&tx, kind, &record)?;
            }
            ChangeOperation::Delete => {
                delete_record(&tx, kind, &change.tenant_id, &change.entity_id)?;
            }
        }

        pending::insert_pending(&tx, change)?;

        tx.commit()?;
        Ok(meta)
    }

    /// Writes a merged record (realtime merge path) in its own transaction.
    pub fn write_merged_record(
        &mut self,
        kind: EntityKind,
        record: &DomainRecord,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        upsert_record(&tx, kind, record)?;
        tx.commit()?;
        Ok(())
    }

    /// Resolves a filed conflict: writes the chosen record and removes the
    /// inbox row, atomically.
    pub fn resolve_conflict(
        &mut self,
        conflict_id: &str,
        kind: EntityKind,
        resolved_record: &DomainRecord,
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        upsert_record(&tx, kind, resolved_record)?;
        let removed = tx.execute("DELETE FROM conflicts WHERE id = ?1", params![conflict_id])?;
        if removed == 0 {
            return Err(StorageError::NotFound(format!("conflict: {}", conflict_id)));
        }
        tx.commit()?;
        Ok(())
    }
}

fn upsert_record(
    conn: &Connection,
    kind: EntityKind,
    record: &DomainRecord,
) -> Result<(), StorageError> {
    let data = serde_json::to_string(&record.data)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    if kind.has_patient_fk() {
        let patient_id = record
            .data
            .get("patientId")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let sql = format!(
            "INSERT INTO {} (id, tenant_id, organization_id, clinic_id, data, version,
                             updated_at, actor_id, patient_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (tenant_id, id) DO UPDATE SET
                 organization_id = excluded.organization_id,
                 clinic_id = excluded.clinic_id,
                 data = excluded.data,
                 version = excluded.version,
                 updated_at = excluded.updated_at,
                 actor_id = excluded.actor_id,
                 patient_id = excluded.patient_id",
            kind.table_name()
        );
        conn.execute(
            &sql,
            params![
                record.id,
                record.tenant_id,
                record.organization_id,
                record.clinic_id,
                data,
                record.meta.version as i64,
                record.meta.updated_at,
                record.meta.actor_id,
                patient_id,
            ],
        )?;
    } else {
        let sql = format!(
            "INSERT INTO {} (id, tenant_id, organization_id, clinic_id, data, version,
                             updated_at, actor_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (tenant_id, id) DO UPDATE SET
                 organization_id = excluded.organization_id,
                 clinic_id = excluded.clinic_id,
                 data = excluded.data,
                 version = excluded.version,
                 updated_at = excluded.updated_at,
                 actor_id = excluded.actor_id",
            kind.table_name()
        );
        conn.execute(
            &sql,
            params![
                record.id,
                record.tenant_id,
                record.organization_id,
                record.clinic_id,
                data,
                record.meta.version as i64,
                record.meta.updated_at,
                record.meta.actor_id,
            ],
        )?;
    }

    Ok(())
}

fn delete_record(
    conn: &Connection,
    kind: EntityKind,
    tenant_id: &str,
    id: &str,
) -> Result<bool, StorageError> {
    let sql = format!(
        "DELETE FROM {} WHERE tenant_id = ?1 AND id = ?2",
        kind.table_name()
    );
    let rows = conn.execute(&sql, params![tenant_id, id])?;
    Ok(rows > 0)
}

fn get_record(
    conn: &Connection,
    kind: EntityKind,
    tenant_id: &str,
    id: &str,
) -> Result<Option<DomainRecord>, StorageError> {
    let sql = format!(
        "SELECT id, tenant_id, organization_id, clinic_id, data, version, updated_at, actor_id
         FROM {} WHERE tenant_id = ?1 AND id = ?2",
        kind.table_name()
    );
    let row = conn
        .query_row(&sql, params![tenant_id, id], row_to_record)
        .optional()?;
    Ok(row)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DomainRecord> {
    let data: String = row.get(4)?;
    Ok(DomainRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        clinic_id: row.get(3)?,
        data: serde_json::from_str(&data).unwrap_or(Value::Null),
        meta: RecordMeta {
            version: row.get::<_, i64>(5)? as u64,
            updated_at: row.get(6)?,
            actor_id: row.get(7)?,
        },
    })
}
