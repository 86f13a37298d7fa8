// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Orchestration Layer
//!
//! High-level API composing the sync core.
//!
//! # Overview
//!
//! The layer wires up and exposes:
//! - Device registration and the token lifecycle
//! - The upload queue and delta downloader behind `trigger_sync`
//! - Realtime patch handling through the merge engine
//! - Presence, the auto-sync scheduler and the status snapshot
//!
//! # Module Structure
//!
//! - [`error`] - Unified error type
//! - [`config`] - Configuration types
//! - [`events`] - Typed event variants and dispatcher
//! - [`orchestrator`] - The sync orchestrator
//! - [`scheduler`] - Periodic + connectivity-driven scheduling

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

#[cfg(feature = "testing")]
pub mod orchestrator;
#[cfg(not(feature = "testing"))]
mod orchestrator;

#[cfg(feature = "testing")]
pub mod scheduler;
#[cfg(not(feature = "testing"))]
mod scheduler;

// Error types
pub use error::{CoreError, CoreResult};

// Configuration
pub use config::{CoreConfig, SyncConfig};

// Events
pub use events::{CallbackHandler, CoreEvent, EventDispatcher, EventHandler};

// Orchestrator
pub use orchestrator::{
    CycleCounters, SkipReason, SyncOrchestrator, SyncOutcome, SyncPhase, SyncStatus,
};

// Scheduler
pub use scheduler::{
    AlwaysOnline, AutoSyncScheduler, NetworkMonitor, AUTO_SYNC_INTERVAL_SECS,
};
