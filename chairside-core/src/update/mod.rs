// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update Pipeline Module
//!
//! Signed, resumable update pipeline with atomic rollback: manifest check,
//! staged download, SHA-256 + RSA-SHA256 verification, pre-apply backup,
//! pluggable patch application.

#[cfg(feature = "testing")]
pub mod fetcher;
#[cfg(not(feature = "testing"))]
mod fetcher;

#[cfg(feature = "testing")]
pub mod pipeline;
#[cfg(not(feature = "testing"))]
mod pipeline;

#[cfg(feature = "testing")]
pub mod types;
#[cfg(not(feature = "testing"))]
mod types;

pub mod integrity;
pub mod signature;

pub use fetcher::{HttpUpdateSource, UpdateSource, MAX_PACKAGE_SIZE};
pub use integrity::{compute_checksum, verify_checksum, IntegrityError};
pub use pipeline::{InstallInfo, PatchApplier, UpdateManager};
pub use signature::{PublisherKey, SignatureError};
pub use types::{
    DifferentialPatch, InstallationEvent, InstallationEventKind, UpdateCheckResult, UpdateError,
    UpdateEvent, UpdatePackage, UpdatePhase,
};
