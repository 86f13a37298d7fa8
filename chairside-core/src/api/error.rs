// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the orchestration layer.

use thiserror::Error;

use crate::identity::{IdentityError, LockError};
use crate::merge::MergeError;
use crate::realtime::NetworkError;
use crate::storage::StorageError;
use crate::sync::SyncError;
use crate::update::UpdateError;

/// Unified error type for core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Sync protocol operation failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Identity or token lifecycle failure.
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Realtime network failure.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Merge engine failure.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// Update pipeline failure.
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// Session lock failure.
    #[error("session lock error: {0}")]
    Lock(#[from] LockError),

    /// No device identity present; sync refuses to run.
    #[error("device not registered")]
    NotRegistered,

    /// Orchestrator used before initialize().
    #[error("sync core not initialized")]
    NotInitialized,

    /// Invalid operation in current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
