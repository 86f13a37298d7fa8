// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Durable local store for domain records, the append-only change log, the
//! pending-upload queue, per-tenant sync cursors and the conflict inbox.
//! Uses SQLite; multi-step state transitions run inside single
//! transactions so partial failure never leaves split state.

#[cfg(feature = "testing")]
pub mod changelog;
#[cfg(not(feature = "testing"))]
mod changelog;

#[cfg(feature = "testing")]
pub mod conflicts;
#[cfg(not(feature = "testing"))]
mod conflicts;

#[cfg(feature = "testing")]
pub mod cursors;
#[cfg(not(feature = "testing"))]
mod cursors;

#[cfg(feature = "testing")]
pub mod device;
#[cfg(not(feature = "testing"))]
mod device;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod pending;
#[cfg(not(feature = "testing"))]
mod pending;

#[cfg(feature = "testing")]
pub mod records;
#[cfg(not(feature = "testing"))]
mod records;

pub mod migration;
pub mod secure;

pub use error::{
    ChangeLogEntry, ChangeOperation, ConflictRecord, DomainRecord, PendingChange, StorageError,
    SyncCursor,
};
pub use records::AppliedChange;
pub use secure::{FileKeyStorage, MemoryKeyStorage, SecureStorage};

#[cfg(feature = "secure-storage")]
pub use secure::PlatformKeyring;

use rusqlite::Connection;
use std::path::Path;

/// SQLite-based store.
///
/// Writers are serialized by the connection; every multi-step transition
/// (`apply_remote_change`, `record_local_change`, `finalize_batch`,
/// `file_conflict`) runs in one transaction.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Opens or creates a store database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Store { conn };
        store.run_migrations()?;
        Ok(store)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Store { conn };
        store.run_migrations()?;
        Ok(store)
    }

    /// Runs all pending schema migrations.
    fn run_migrations(&self) -> Result<(), StorageError> {
        let migrations = migration::all_migrations();
        migration::MigrationRunner::run(&self.conn, &migrations)
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migration::MigrationRunner::current_version(&self.conn)
    }
}
