// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Update Pipeline
//!
//! Checks the manifest, downloads the full or differential package,
//! verifies hash and signature, backs up the current image, applies, and
//! rolls back on failure. Integrity and signature checks are mandatory;
//! a payload that fails either is never applied and never triggers a
//! backup or rollback.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::fetcher::{UpdateSource, MAX_PACKAGE_SIZE};
use super::integrity::verify_checksum;
use super::signature::PublisherKey;
use super::types::{
    InstallationEvent, InstallationEventKind, UpdateCheckResult, UpdateError, UpdateEvent,
    UpdatePhase,
};
use crate::sync::envelope::now_millis;

/// Applies a differential patch to the installed image.
///
/// Platform-specific binary patching plugs in here; the pipeline owns
/// everything around it (verification, backup, rollback).
pub trait PatchApplier: Send + Sync {
    fn apply(&self, staging_path: &Path, app_path: &Path) -> Result<(), UpdateError>;
}

/// Identity of this install, for telemetry events.
#[derive(Debug, Clone)]
pub struct InstallInfo {
    pub device_id: String,
    pub current_version: String,
    pub platform: String,
    pub arch: String,
}

/// Drives the update pipeline.
pub struct UpdateManager {
    source: Arc<dyn UpdateSource>,
    applier: Arc<dyn PatchApplier>,
    key: PublisherKey,
    /// Staged downloads land here.
    staging_dir: PathBuf,
    /// Pre-apply snapshots land in `backup-<version>/` below this.
    backup_root: PathBuf,
    /// The application image that gets swapped.
    app_image: PathBuf,
    info: InstallInfo,
    max_package_size: u64,
    phase: Mutex<UpdatePhase>,
    in_flight: AtomicBool,
    hook: Mutex<Option<Box<dyn Fn(UpdateEvent) + Send + Sync>>>,
}

impl UpdateManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn UpdateSource>,
        applier: Arc<dyn PatchApplier>,
        key: PublisherKey,
        staging_dir: PathBuf,
        backup_root: PathBuf,
        app_image: PathBuf,
        info: InstallInfo,
    ) -> Self {
        UpdateManager {
            source,
            applier,
            key,
            staging_dir,
            backup_root,
            app_image,
            info,
            max_package_size: MAX_PACKAGE_SIZE,
            phase: Mutex::new(UpdatePhase::Idle),
            in_flight: AtomicBool::new(false),
            hook: Mutex::new(None),
        }
    }

    /// Registers a listener for phase/progress events.
    pub fn set_event_hook(&self, hook: impl Fn(UpdateEvent) + Send + Sync + 'static) {
        *self.hook.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    /// Current pipeline phase.
    pub fn phase(&self) -> UpdatePhase {
        self.phase.lock().expect("phase mutex poisoned").clone()
    }

    fn set_phase(&self, phase: UpdatePhase) {
        *self.phase.lock().expect("phase mutex poisoned") = phase.clone();
        self.emit(UpdateEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: UpdateEvent) {
        if let Some(hook) = self.hook.lock().expect("hook mutex poisoned").as_ref() {
            hook(event);
        }
    }

    /// Checks the update service for a newer version on a channel.
    pub async fn check_for_updates(
        &self,
        channel: &str,
    ) -> Result<Option<UpdateCheckResult>, UpdateError> {
        self.set_phase(UpdatePhase::Checking);

        let result = self
            .source
            .check_latest(
                &self.info.platform,
                &self.info.arch,
                &self.info.current_version,
                channel,
            )
            .await;

        match &result {
            Ok(Some(update)) => {
                log::info!("update available: {}", update.version);
                self.set_phase(UpdatePhase::Idle);
            }
            Ok(None) => self.set_phase(UpdatePhase::Idle),
            Err(e) => self.set_phase(UpdatePhase::Failed {
                error: e.to_string(),
            }),
        }

        result
    }

    /// Downloads, verifies, backs up and applies an update.
    ///
    /// The differential patch is preferred when it matches the installed
    /// version. On any failure after the backup was taken, a rollback is
    /// attempted; verification failures happen before the backup and never
    /// roll back.
    pub async fn download_and_apply(&self, update: &UpdateCheckResult) -> Result<(), UpdateError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(UpdateError::Busy);
        }
        let result = self.download_and_apply_inner(update).await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn download_and_apply_inner(
        &self,
        update: &UpdateCheckResult,
    ) -> Result<(), UpdateError> {
        let started = Instant::now();

        self.register(InstallationEventKind::DownloadStarted, &update.version, None)
            .await;

        let differential = update
            .differential_patch
            .as_ref()
            .filter(|patch| patch.from_version == self.info.current_version);

        let (url, checksum, signature) = match differential {
            Some(patch) => (&patch.url, &patch.checksum, &patch.signature),
            None => (
                &update.package.url,
                &update.package.checksum,
                &update.package.signature,
            ),
        };

        // Download to staging
        self.set_phase(UpdatePhase::Downloading);
        let data = {
            let hook = &self.hook;
            let progress = move |received: u64, total: Option<u64>| {
                if let Some(hook) = hook.lock().expect("hook mutex poisoned").as_ref() {
                    hook(UpdateEvent::DownloadProgress { received, total });
                }
            };
            match self.source.fetch(url, self.max_package_size, &progress).await {
                Ok(data) => data,
                Err(e) => return self.fail_before_apply(&update.version, e).await,
            }
        };

        // Integrity check: mandatory, before anything touches the disk image.
        if let Err(e) = verify_checksum(&data, checksum) {
            log::warn!("update integrity check failed: {}", e);
            return self
                .fail_before_apply(&update.version, UpdateError::Integrity(e))
                .await;
        }

        // Signature check: mandatory, fatal on mismatch.
        if let Err(e) = self.key.verify_base64(&data, signature) {
            log::warn!("update signature verification failed");
            return self
                .fail_before_apply(&update.version, UpdateError::Signature(e))
                .await;
        }

        let staged_path = self.stage(&update.version, &data)?;

        // Backup the current image before applying.
        let backup_path = self.backup_path(&self.info.current_version);
        if let Some(parent) = backup_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.app_image, &backup_path)?;

        // Apply: differential runs the patcher; full packages swap the image.
        self.set_phase(UpdatePhase::Applying);
        let applied = if differential.is_some() {
            self.applier.apply(&staged_path, &self.app_image)
        } else {
            self.swap_image(&data)
        };

        if let Err(e) = applied {
            log::warn!("update apply failed: {}", e);
            self.register(InstallationEventKind::ApplyFailed, &update.version, None)
                .await;
            if let Err(rollback_err) = self.restore_backup(&self.info.current_version) {
                log::warn!("rollback after failed apply also failed: {}", rollback_err);
            } else {
                self.register(InstallationEventKind::Rollback, &update.version, None)
                    .await;
            }
            self.set_phase(UpdatePhase::Failed {
                error: e.to_string(),
            });
            return Err(e);
        }

        let elapsed_ms = started.elapsed().as_millis() as i64;
        self.register(
            InstallationEventKind::ApplyCompleted,
            &update.version,
            Some(serde_json::json!({ "elapsedMs": elapsed_ms })),
        )
        .await;
        self.set_phase(UpdatePhase::Completed);
        log::info!(
            "update {} applied in {} ms; restart required",
            update.version,
            elapsed_ms
        );

        Ok(())
    }

    /// Restores the pre-apply snapshot of the current version.
    pub async fn rollback(&self) -> Result<(), UpdateError> {
        self.set_phase(UpdatePhase::RollingBack);
        match self.restore_backup(&self.info.current_version) {
            Ok(()) => {
                self.register(
                    InstallationEventKind::Rollback,
                    &self.info.current_version,
                    None,
                )
                .await;
                self.set_phase(UpdatePhase::Idle);
                Ok(())
            }
            Err(e) => {
                self.set_phase(UpdatePhase::Failed {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Verification failure path: no backup was taken, so no rollback runs.
    async fn fail_before_apply(
        &self,
        to_version: &str,
        error: UpdateError,
    ) -> Result<(), UpdateError> {
        self.register(InstallationEventKind::ApplyFailed, to_version, None)
            .await;
        self.set_phase(UpdatePhase::Failed {
            error: match &error {
                UpdateError::Integrity(_) => "Integrity check failed".to_string(),
                UpdateError::Signature(_) => "Signature verification failed".to_string(),
                other => other.to_string(),
            },
        });
        Err(error)
    }

    fn stage(&self, version: &str, data: &[u8]) -> Result<PathBuf, UpdateError> {
        std::fs::create_dir_all(&self.staging_dir)?;
        let path = self.staging_dir.join(format!("chairside-{}.pkg", version));
        std::fs::write(&path, data)?;
        Ok(path)
    }

    fn backup_path(&self, version: &str) -> PathBuf {
        self.backup_root
            .join(format!("backup-{}", version))
            .join("image")
    }

    /// Atomically swaps the full-package bytes over the app image.
    fn swap_image(&self, data: &[u8]) -> Result<(), UpdateError> {
        let tmp = self.app_image.with_extension("new");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.app_image)?;
        Ok(())
    }

    fn restore_backup(&self, version: &str) -> Result<(), UpdateError> {
        let backup = self.backup_path(version);
        if !backup.exists() {
            return Err(UpdateError::NoBackup(version.to_string()));
        }
        std::fs::copy(&backup, &self.app_image)?;
        Ok(())
    }

    async fn register(
        &self,
        kind: InstallationEventKind,
        to_version: &str,
        metadata: Option<serde_json::Value>,
    ) {
        let event = InstallationEvent {
            device_id: self.info.device_id.clone(),
            from_version: self.info.current_version.clone(),
            to_version: to_version.to_string(),
            platform: self.info.platform.clone(),
            arch: self.info.arch.clone(),
            event_type: kind.as_str().to_string(),
            timestamp: now_millis(),
            metadata,
        };

        // Telemetry is best-effort; a failed post never fails the pipeline.
        if let Err(e) = self.source.register_installation(&event).await {
            log::debug!("failed to register installation event {}: {}", kind.as_str(), e);
        }
    }
}
