// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Auto-Sync Scheduler
//!
//! Periodic + connectivity-driven invocation of the orchestrator. While
//! online, `trigger_sync` fires on a fixed cadence and the realtime
//! channel is pumped; going offline pauses the orchestrator, and coming
//! back online resumes it and triggers an immediate sync.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::orchestrator::SyncOrchestrator;
use crate::realtime::Transport;

/// Scheduler cadence.
pub const AUTO_SYNC_INTERVAL_SECS: u64 = 10;

/// How often the realtime channel is pumped between sync ticks.
pub const REALTIME_PUMP_INTERVAL_MS: u64 = 500;

/// Connectivity source the scheduler subscribes to.
///
/// The host wires OS callbacks into [`AutoSyncScheduler::handle_connectivity`];
/// this trait covers the initial probe.
pub trait NetworkMonitor: Send + Sync {
    fn is_online(&self) -> bool;
}

/// A monitor that always reports online (hosts without OS hooks).
pub struct AlwaysOnline;

impl NetworkMonitor for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Drives the orchestrator on a timer and on connectivity changes.
pub struct AutoSyncScheduler<T: Transport + 'static> {
    orchestrator: Arc<SyncOrchestrator<T>>,
    interval: Duration,
    online: Arc<AtomicBool>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
    pump_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport + 'static> AutoSyncScheduler<T> {
    pub fn new(orchestrator: Arc<SyncOrchestrator<T>>, monitor: &dyn NetworkMonitor) -> Self {
        AutoSyncScheduler {
            orchestrator,
            interval: Duration::from_secs(AUTO_SYNC_INTERVAL_SECS),
            online: Arc::new(AtomicBool::new(monitor.is_online())),
            sync_task: Mutex::new(None),
            pump_task: Mutex::new(None),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Starts the timer loops. Idempotent.
    pub fn start(&self) {
        let mut sync_task = self.sync_task.lock().expect("sync task lock poisoned");
        if sync_task.is_some() {
            return;
        }

        let orchestrator = self.orchestrator.clone();
        let online = self.online.clone();
        let interval = self.interval;
        *sync_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !online.load(Ordering::Acquire) {
                    continue;
                }
                // Background cycles record their errors into status; they
                // never terminate the scheduler.
                if let Err(e) = orchestrator.trigger_sync().await {
                    log::debug!("scheduled sync failed: {}", e);
                }
            }
        }));

        let orchestrator = self.orchestrator.clone();
        let online = self.online.clone();
        let mut pump_task = self.pump_task.lock().expect("pump task lock poisoned");
        *pump_task = Some(tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(REALTIME_PUMP_INTERVAL_MS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !online.load(Ordering::Acquire) {
                    continue;
                }
                if let Err(e) = orchestrator.pump_realtime() {
                    log::debug!("realtime pump failed: {}", e);
                }
            }
        }));
    }

    /// Stops the timer loops.
    pub fn stop(&self) {
        if let Some(task) = self.sync_task.lock().expect("sync task lock poisoned").take() {
            task.abort();
        }
        if let Some(task) = self.pump_task.lock().expect("pump task lock poisoned").take() {
            task.abort();
        }
    }

    /// Routes an OS connectivity change.
    ///
    /// Offline pauses the orchestrator; recovery resumes it and triggers
    /// an immediate sync.
    pub async fn handle_connectivity(&self, is_online: bool) {
        let was_online = self.online.swap(is_online, Ordering::AcqRel);

        if was_online && !is_online {
            log::info!("network offline; pausing sync");
            self.orchestrator.pause();
        } else if !was_online && is_online {
            log::info!("network recovered; resuming sync");
            self.orchestrator.resume();
            if let Err(e) = self.orchestrator.trigger_sync().await {
                log::debug!("recovery sync failed: {}", e);
            }
        }
    }
}

impl<T: Transport + 'static> Drop for AutoSyncScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}
