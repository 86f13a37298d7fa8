// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations. The installed version lives in SQLite's
//! `user_version` header field, so no bookkeeping table is needed and the
//! stamp rolls back together with a failed migration. All pending steps
//! apply inside one transaction: the database is always at exactly one of
//! the declared versions.

use rusqlite::Connection;

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Strictly ascending, starting at 1.
    pub version: u32,
    /// Short label used in failure messages.
    pub name: &'static str,
    /// The migration SQL.
    pub sql: &'static str,
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Brings the database up to the newest declared version.
    ///
    /// Steps above the installed version run in declaration order inside a
    /// single transaction; if any step fails, the database stays at the
    /// version it had before the call.
    pub fn run(conn: &Connection, migrations: &[Migration]) -> Result<(), StorageError> {
        ensure_ascending(migrations)?;

        let installed = Self::current_version(conn)?;
        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > installed)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        conn.execute_batch("BEGIN IMMEDIATE;")?;
        match apply_all(conn, &pending) {
            Ok(()) => {
                conn.execute_batch("COMMIT;")?;
                Ok(())
            }
            Err(e) => {
                // Rollback failures are unreported; the original error is
                // the one the caller needs.
                let _ = conn.execute_batch("ROLLBACK;");
                Err(e)
            }
        }
    }

    /// The version the database is at; 0 for a fresh file.
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version as u32)
    }
}

/// Applies each pending step and stamps its version, inside the caller's
/// open transaction.
fn apply_all(conn: &Connection, pending: &[&Migration]) -> Result<(), StorageError> {
    for migration in pending {
        conn.execute_batch(migration.sql).map_err(|e| {
            StorageError::Migration(format!(
                "schema migration v{} ({}) did not apply: {}",
                migration.version, migration.name, e
            ))
        })?;
        // PRAGMA assignments take no parameters; the version is a literal.
        conn.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    Ok(())
}

/// Rejects a migration list whose versions are not strictly ascending
/// from 1, pending or not; a misdeclared list is a programming error
/// worth failing loudly on.
fn ensure_ascending(migrations: &[Migration]) -> Result<(), StorageError> {
    let mut previous = 0u32;
    for migration in migrations {
        if migration.version <= previous {
            return Err(StorageError::Migration(format!(
                "migration list is misordered: v{} declared after v{}",
                migration.version, previous
            )));
        }
        previous = migration.version;
    }
    Ok(())
}

/// Returns all registered migrations in version order.
///
/// This is the single source of truth for the database schema.
/// New migrations are appended to the end of this list.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "baseline_schema",
            sql: MIGRATION_V1_BASELINE,
        },
        Migration {
            version: 2,
            name: "conflict_inbox",
            sql: MIGRATION_V2_CONFLICT_INBOX,
        },
        Migration {
            version: 3,
            name: "patient_lookup_indexes",
            sql: MIGRATION_V3_PATIENT_LOOKUPS,
        },
    ]
}

const MIGRATION_V1_BASELINE: &str = "
CREATE TABLE devices (
    device_id TEXT PRIMARY KEY,
    device_name TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    user_id TEXT NOT NULL,
    hardware_fingerprint TEXT NOT NULL,
    platform TEXT NOT NULL,
    os_version TEXT NOT NULL,
    app_version TEXT NOT NULL,
    registered_at INTEGER NOT NULL,
    last_seen_at INTEGER
);

CREATE TABLE changelog (
    change_id TEXT PRIMARY KEY,
    sequence_number INTEGER NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    data TEXT NOT NULL,
    previous_data TEXT,
    version INTEGER NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    source_device_id TEXT,
    synced_at INTEGER,
    UNIQUE (tenant_id, sequence_number)
);
CREATE INDEX idx_changelog_entity ON changelog (entity_type, entity_id);

CREATE TABLE pending_changes (
    local_id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    data TEXT NOT NULL,
    previous_data TEXT,
    created_at INTEGER NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    synced INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_pending_tenant_synced ON pending_changes (tenant_id, synced);

CREATE TABLE sync_cursors (
    tenant_id TEXT PRIMARY KEY,
    last_synced_sequence INTEGER NOT NULL,
    last_synced_at INTEGER NOT NULL
);

CREATE TABLE patients (
    id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    actor_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE INDEX idx_patients_tenant ON patients (tenant_id);

CREATE TABLE appointments (
    id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    actor_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE INDEX idx_appointments_tenant ON appointments (tenant_id);

CREATE TABLE treatments (
    id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    actor_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE INDEX idx_treatments_tenant ON treatments (tenant_id);

CREATE TABLE invoices (
    id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    clinic_id TEXT,
    data TEXT NOT NULL,
    version INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    actor_id TEXT NOT NULL,
    PRIMARY KEY (tenant_id, id)
);
CREATE INDEX idx_invoices_tenant ON invoices (tenant_id);
";

const MIGRATION_V2_CONFLICT_INBOX: &str = "
CREATE TABLE conflicts (
    id TEXT PRIMARY KEY,
    tenant_id TEXT NOT NULL,
    resource_type TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    conflicts TEXT NOT NULL,
    local_data TEXT NOT NULL,
    remote_patch TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    resolved INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX idx_conflicts_tenant_resolved ON conflicts (tenant_id, resolved);
";

const MIGRATION_V3_PATIENT_LOOKUPS: &str = "
ALTER TABLE appointments ADD COLUMN patient_id TEXT;
ALTER TABLE treatments ADD COLUMN patient_id TEXT;
ALTER TABLE invoices ADD COLUMN patient_id TEXT;
CREATE INDEX idx_appointments_patient ON appointments (patient_id);
CREATE INDEX idx_treatments_patient ON treatments (patient_id);
CREATE INDEX idx_invoices_patient ON invoices (patient_id);
";
