// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device-identity row storage operations.
//!
//! Only the non-secret identity fields live here; tokens and keys belong
//! to the secret store.

use rusqlite::{params, OptionalExtension};

use super::{StorageError, Store};
use crate::identity::{DeviceIdentity, Platform};

impl Store {
    // === Device Identity Operations ===

    /// Saves (or replaces) the device identity row.
    pub fn save_device(&self, identity: &DeviceIdentity) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO devices
             (device_id, device_name, tenant_id, organization_id, clinic_id, user_id,
              hardware_fingerprint, platform, os_version, app_version, registered_at,
              last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                identity.device_id,
                identity.device_name,
                identity.tenant_id,
                identity.organization_id,
                identity.clinic_id,
                identity.user_id,
                identity.hardware_fingerprint,
                identity.platform.as_str(),
                identity.os_version,
                identity.app_version,
                identity.registered_at,
                identity.last_seen_at,
            ],
        )?;
        Ok(())
    }

    /// Loads the identity row for a (tenant, organization) pair.
    pub fn load_device(
        &self,
        tenant_id: &str,
        organization_id: &str,
    ) -> Result<Option<DeviceIdentity>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT device_id, device_name, tenant_id, organization_id, clinic_id, user_id,
                        hardware_fingerprint, platform, os_version, app_version, registered_at,
                        last_seen_at
                 FROM devices WHERE tenant_id = ?1 AND organization_id = ?2",
                params![tenant_id, organization_id],
                row_to_identity,
            )
            .optional()?;
        Ok(row)
    }

    /// Loads whichever identity row exists (single-identity installs).
    pub fn load_any_device(&self) -> Result<Option<DeviceIdentity>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT device_id, device_name, tenant_id, organization_id, clinic_id, user_id,
                        hardware_fingerprint, platform, os_version, app_version, registered_at,
                        last_seen_at
                 FROM devices ORDER BY registered_at LIMIT 1",
                [],
                row_to_identity,
            )
            .optional()?;
        Ok(row)
    }

    /// Updates the last-seen timestamp.
    pub fn touch_device(&self, device_id: &str, last_seen_at: i64) -> Result<bool, StorageError> {
        let rows = self.conn.execute(
            "UPDATE devices SET last_seen_at = ?1 WHERE device_id = ?2",
            params![last_seen_at, device_id],
        )?;
        Ok(rows > 0)
    }

    /// Removes the identity row (device unlink). Domain data is untouched.
    pub fn delete_device(&self, device_id: &str) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .execute("DELETE FROM devices WHERE device_id = ?1", params![device_id])?;
        Ok(rows > 0)
    }
}

fn row_to_identity(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeviceIdentity> {
    let platform: String = row.get(7)?;
    Ok(DeviceIdentity {
        device_id: row.get(0)?,
        device_name: row.get(1)?,
        tenant_id: row.get(2)?,
        organization_id: row.get(3)?,
        clinic_id: row.get(4)?,
        user_id: row.get(5)?,
        hardware_fingerprint: row.get(6)?,
        platform: Platform::parse(&platform).unwrap_or(Platform::Linux),
        os_version: row.get(8)?,
        app_version: row.get(9)?,
        registered_at: row.get(10)?,
        last_seen_at: row.get(11)?,
    })
}
