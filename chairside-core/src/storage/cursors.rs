// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync-cursor storage operations.
//!
//! One cursor per tenant. The cursor only ever moves forward; attempts to
//! set a lower sequence are ignored.

use rusqlite::{params, Connection, OptionalExtension};

use super::error::SyncCursor;
use super::{StorageError, Store};
use crate::sync::envelope::now_millis;

impl Store {
    // === Sync Cursor Operations ===

    /// Gets the cursor for a tenant, defaulting to sequence 0.
    pub fn sync_cursor(&self, tenant_id: &str) -> Result<SyncCursor, StorageError> {
        get_cursor(&self.conn, tenant_id)
    }

    /// Advances the cursor for a tenant, monotonically.
    ///
    /// Returns the cursor after the call. A target at or below the current
    /// sequence leaves the row untouched.
    pub fn advance_cursor(
        &self,
        tenant_id: &str,
        sequence: u64,
    ) -> Result<SyncCursor, StorageError> {
        advance_cursor(&self.conn, tenant_id, sequence)?;
        get_cursor(&self.conn, tenant_id)
    }
}

pub(crate) fn get_cursor(conn: &Connection, tenant_id: &str) -> Result<SyncCursor, StorageError> {
    let row = conn
        .query_row(
            "SELECT tenant_id, last_synced_sequence, last_synced_at
             FROM sync_cursors WHERE tenant_id = ?1",
            params![tenant_id],
            |row| {
                Ok(SyncCursor {
                    tenant_id: row.get(0)?,
                    last_synced_sequence: row.get::<_, i64>(1)? as u64,
                    last_synced_at: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(row.unwrap_or(SyncCursor {
        tenant_id: tenant_id.to_string(),
        last_synced_sequence: 0,
        last_synced_at: 0,
    }))
}

pub(crate) fn advance_cursor(
    conn: &Connection,
    tenant_id: &str,
    sequence: u64,
) -> Result<(), StorageError> {
    let now = now_millis();
    conn.execute(
        "INSERT INTO sync_cursors (tenant_id, last_synced_sequence, last_synced_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (tenant_id) DO UPDATE SET
             last_synced_sequence = excluded.last_synced_sequence,
             last_synced_at = excluded.last_synced_at
         WHERE excluded.last_synced_sequence > sync_cursors.last_synced_sequence",
        params![tenant_id, sequence as i64, now],
    )?;
    Ok(())
}
