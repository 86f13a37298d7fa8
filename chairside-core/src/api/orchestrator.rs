// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Orchestrator
//!
//! Composes identity, upload, download, realtime and merge behind one
//! entry point. Everything is explicitly constructed and injected at the
//! composition root; the orchestrator's owned instances are the only
//! "singletons" in the system. Status and the channel live behind
//! mutexes; locks are never held across await points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use super::config::SyncConfig;
use super::error::{CoreError, CoreResult};
use super::events::{CoreEvent, EventDispatcher};
use crate::identity::{DeviceIdentity, DeviceRegistrar, DeviceSecretStore, IdentityError};
use crate::merge::MergeEngine;
use crate::realtime::{
    ActiveResource, ChannelEvent, ConnectionState, PresenceSignal, PresenceStatus,
    PresenceTracker, RealtimeChannel, Transport,
};
use crate::storage::{ConflictRecord, DomainRecord, Store};
use crate::sync::{
    envelope::now_millis, BatchOutcome, DeltaDownloader, DownloadOutcome, EntityKind,
    PatchEnvelope, RecordMeta, SyncApi, SyncError, SyncScope, UploadQueue,
};

/// Orchestrator phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Running,
    Paused,
}

/// Counters accumulated over one sync cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleCounters {
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
}

/// Status snapshot exposed to the UI and the scheduler.
#[derive(Debug, Clone)]
pub struct SyncStatus {
    pub initialized: bool,
    pub phase: SyncPhase,
    /// Unix milliseconds of the last completed cycle.
    pub last_sync_at: Option<i64>,
    pub pending_uploads: usize,
    pub unresolved_conflicts: usize,
    pub last_cycle: CycleCounters,
    pub last_error: Option<String>,
    pub realtime: ConnectionState,
    pub pull_only: bool,
    pub needs_relogin: bool,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus {
            initialized: false,
            phase: SyncPhase::Idle,
            last_sync_at: None,
            pending_uploads: 0,
            unresolved_conflicts: 0,
            last_cycle: CycleCounters::default(),
            last_error: None,
            realtime: ConnectionState::Disconnected,
            pull_only: false,
            needs_relogin: false,
        }
    }
}

/// Why a `trigger_sync` call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Paused,
    AlreadyRunning,
    RateLimited,
}

/// Result of a `trigger_sync` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(CycleCounters),
    Skipped(SkipReason),
}

struct Session {
    identity: DeviceIdentity,
    upload: UploadQueue,
    download: DeltaDownloader,
}

/// Single entry point for sync, realtime and presence.
pub struct SyncOrchestrator<T: Transport> {
    config: SyncConfig,
    store: Arc<Mutex<Store>>,
    vault: Arc<DeviceSecretStore>,
    registrar: Arc<DeviceRegistrar>,
    sync_api: Arc<dyn SyncApi>,
    merge: MergeEngine,
    channel: Mutex<RealtimeChannel<T>>,
    presence: Mutex<PresenceTracker>,
    events: Arc<EventDispatcher>,
    session: Mutex<Option<Arc<Session>>>,
    /// Device access token; rotates on refresh.
    token: Mutex<Option<String>>,
    status: Mutex<SyncStatus>,
    running: AtomicBool,
    paused: AtomicBool,
    next_allowed_at: Mutex<Option<Instant>>,
}

impl<T: Transport> SyncOrchestrator<T> {
    pub fn new(
        config: SyncConfig,
        store: Arc<Mutex<Store>>,
        vault: Arc<DeviceSecretStore>,
        registrar: Arc<DeviceRegistrar>,
        sync_api: Arc<dyn SyncApi>,
        channel: RealtimeChannel<T>,
        events: Arc<EventDispatcher>,
    ) -> Self {
        let merge = MergeEngine::new(config.merge_strategy);
        SyncOrchestrator {
            config,
            store,
            vault,
            registrar,
            sync_api,
            merge,
            channel: Mutex::new(channel),
            presence: Mutex::new(PresenceTracker::new()),
            events,
            session: Mutex::new(None),
            token: Mutex::new(None),
            status: Mutex::new(SyncStatus::default()),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            next_allowed_at: Mutex::new(None),
        }
    }

    /// Loads credentials, binds the protocol clients, opens the realtime
    /// channel and reads the cursor.
    ///
    /// Surfaces [`CoreError::NotRegistered`] when no identity or secrets
    /// are present. A failed token refresh marks the identity as needing
    /// re-login and suspends sync.
    pub async fn initialize(&self) -> CoreResult<()> {
        let identity = {
            let store = self.store.lock().expect("store mutex poisoned");
            store.load_any_device()?
        }
        .ok_or(CoreError::NotRegistered)?;

        let ctx = identity.secret_context();
        let secrets = self.vault.load(&ctx)?.ok_or(CoreError::NotRegistered)?;

        // Refresh on initialization. Auth-level failure suspends sync until
        // the UI drives re-registration; transient failures keep the stored
        // token.
        let token = match self.registrar.refresh_tokens(&identity).await {
            Ok(rotated) => rotated.device_access_token,
            Err(IdentityError::NeedsRelogin) => {
                self.mark_needs_relogin();
                return Err(CoreError::Identity(IdentityError::NeedsRelogin));
            }
            Err(e) => {
                log::warn!("token refresh failed, keeping stored token: {}", e);
                secrets.device_access_token.clone()
            }
        };

        let scope = SyncScope {
            device_id: identity.device_id.clone(),
            tenant_id: identity.tenant_id.clone(),
            organization_id: identity.organization_id.clone(),
            clinic_id: identity.clinic_id.clone(),
        };

        let upload = UploadQueue::new(self.store.clone(), self.sync_api.clone(), scope.clone())
            .with_limits(self.config.batch_size, self.config.max_retries);
        let download = DeltaDownloader::new(self.store.clone(), self.sync_api.clone(), scope)
            .with_strategy(self.config.collision_strategy)
            .with_page_limit(self.config.page_limit);

        {
            let mut channel = self.channel.lock().expect("channel mutex poisoned");
            channel.set_bearer(&token);
            if let Err(e) = channel.connect() {
                // The pump will keep retrying; sync works pull-only meanwhile.
                log::warn!("realtime connect failed: {}", e);
            }
        }

        let (pending, conflicts) = {
            let store = self.store.lock().expect("store mutex poisoned");
            (
                store.count_pending(&identity.tenant_id)?,
                store.count_unresolved_conflicts(&identity.tenant_id)?,
            )
        };

        *self.token.lock().expect("token mutex poisoned") = Some(token);
        *self.session.lock().expect("session mutex poisoned") = Some(Arc::new(Session {
            identity,
            upload,
            download,
        }));

        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            status.initialized = true;
            status.phase = SyncPhase::Idle;
            status.pending_uploads = pending;
            status.unresolved_conflicts = conflicts;
            status.needs_relogin = false;
            status.realtime = self
                .channel
                .lock()
                .expect("channel mutex poisoned")
                .state();
        }

        Ok(())
    }

    /// Runs one sync cycle: upload batch, download deltas, refresh status.
    ///
    /// Fails fast when paused or uninitialized; a concurrent caller and a
    /// caller inside the rate-limit window observe the last status
    /// unchanged via [`SyncOutcome::Skipped`].
    pub async fn trigger_sync(&self) -> CoreResult<SyncOutcome> {
        if self.paused.load(Ordering::Acquire) {
            return Ok(SyncOutcome::Skipped(SkipReason::Paused));
        }

        let session = self.current_session().ok_or(CoreError::NotInitialized)?;

        {
            let next_allowed = self.next_allowed_at.lock().expect("rate mutex poisoned");
            if let Some(at) = *next_allowed {
                if Instant::now() < at {
                    return Ok(SyncOutcome::Skipped(SkipReason::RateLimited));
                }
            }
        }

        if self.running.swap(true, Ordering::AcqRel) {
            return Ok(SyncOutcome::Skipped(SkipReason::AlreadyRunning));
        }
        self.set_phase(SyncPhase::Running);
        self.events.dispatch(CoreEvent::SyncStarted);

        let result = self.run_cycle(&session).await;

        *self.next_allowed_at.lock().expect("rate mutex poisoned") =
            Some(Instant::now() + self.config.min_sync_interval);
        self.running.store(false, Ordering::Release);
        self.set_phase(if self.paused.load(Ordering::Acquire) {
            SyncPhase::Paused
        } else {
            SyncPhase::Idle
        });

        match result {
            Ok(counters) => {
                self.refresh_status_counts(&session.identity, |status| {
                    status.last_sync_at = Some(now_millis());
                    status.last_cycle = counters;
                    status.last_error = None;
                });
                self.events.dispatch(CoreEvent::SyncCompleted {
                    uploaded: counters.uploaded,
                    downloaded: counters.downloaded,
                    conflicts: counters.conflicts,
                });
                Ok(SyncOutcome::Completed(counters))
            }
            Err(e) => {
                let message = e.to_string();
                {
                    let mut status = self.status.lock().expect("status mutex poisoned");
                    status.last_error = Some(message.clone());
                }
                self.events.dispatch(CoreEvent::SyncFailed { error: message });
                Err(e)
            }
        }
    }

    async fn run_cycle(&self, session: &Arc<Session>) -> CoreResult<CycleCounters> {
        let for_upload = session.clone();
        let upload: BatchOutcome = self
            .with_auth_retry(session, move |token| {
                let session = for_upload.clone();
                async move { session.upload.process_batch(&token).await }
            })
            .await?;

        let for_download = session.clone();
        let download: DownloadOutcome = self
            .with_auth_retry(session, move |token| {
                let session = for_download.clone();
                async move { session.download.download(&token).await }
            })
            .await?;

        Ok(CycleCounters {
            uploaded: upload.uploaded,
            downloaded: download.applied,
            conflicts: download.conflicts,
        })
    }

    /// Runs a device-authenticated call, refreshing the token once on 401.
    /// A refresh failure transitions to needs-relogin and pauses sync.
    async fn with_auth_retry<F, Fut, R>(
        &self,
        session: &Arc<Session>,
        call: F,
    ) -> CoreResult<R>
    where
        F: Fn(String) -> Fut,
        Fut: std::future::Future<Output = Result<R, SyncError>>,
    {
        let token = self.current_token();
        match call(token).await {
            Ok(value) => Ok(value),
            Err(SyncError::AuthExpired) => {
                log::debug!("device token expired; refreshing");
                match self.registrar.refresh_tokens(&session.identity).await {
                    Ok(rotated) => {
                        *self.token.lock().expect("token mutex poisoned") =
                            Some(rotated.device_access_token.clone());
                        call(rotated.device_access_token).await.map_err(CoreError::Sync)
                    }
                    Err(_) => {
                        self.mark_needs_relogin();
                        self.pause();
                        Err(CoreError::Identity(IdentityError::NeedsRelogin))
                    }
                }
            }
            Err(e) => Err(CoreError::Sync(e)),
        }
    }

    /// Records a local mutation (domain write + queue row) and refreshes
    /// the pending count.
    pub fn record_local_change(
        &self,
        kind: EntityKind,
        entity_id: &str,
        operation: crate::storage::ChangeOperation,
        data: Value,
        previous_data: Option<Value>,
    ) -> CoreResult<RecordMeta> {
        let session = self.current_session().ok_or(CoreError::NotInitialized)?;
        let (_, meta) = session
            .upload
            .enqueue(kind, entity_id, operation, data, previous_data)?;
        self.refresh_status_counts(&session.identity, |_| {});
        Ok(meta)
    }

    /// Pumps the realtime channel: heartbeats, reconnects, inbound patch
    /// envelopes and presence signals. Intended to be called from the host
    /// loop alongside the scheduler.
    pub fn pump_realtime(&self) -> CoreResult<()> {
        let events = {
            let mut channel = self.channel.lock().expect("channel mutex poisoned");
            channel.pump()
        };

        for event in events {
            match event {
                ChannelEvent::Connected => self.set_realtime_state(ConnectionState::Connected),
                ChannelEvent::Disconnected => {
                    self.presence.lock().expect("presence mutex poisoned").clear();
                    self.set_realtime_state(ConnectionState::Disconnected);
                }
                ChannelEvent::SubscriptionsAcknowledged(_) => {}
                ChannelEvent::Patch(envelope) => {
                    if let Err(e) = self.handle_realtime_patch(&envelope) {
                        log::warn!(
                            "failed to apply realtime patch for {}:{}: {}",
                            envelope.resource_type,
                            envelope.resource_id,
                            e
                        );
                    }
                }
                ChannelEvent::Presence(signal) => {
                    let actor_id = match &signal {
                        PresenceSignal::Joined(peer) | PresenceSignal::Updated(peer) => {
                            peer.actor_id.clone()
                        }
                        PresenceSignal::Left { actor_id } => actor_id.clone(),
                    };
                    self.presence
                        .lock()
                        .expect("presence mutex poisoned")
                        .apply(signal);
                    self.events.dispatch(CoreEvent::PresenceChanged { actor_id });
                }
                ChannelEvent::PullOnlyFallback => {
                    let mut status = self.status.lock().expect("status mutex poisoned");
                    status.pull_only = true;
                    drop(status);
                    self.events.dispatch(CoreEvent::PullOnlyFallback);
                }
            }
        }

        Ok(())
    }

    /// Merges one incoming patch envelope into the matching domain record,
    /// or files a conflict when the strategy defers to the user. Write-backs
    /// are suspended while paused.
    pub fn handle_realtime_patch(&self, envelope: &PatchEnvelope) -> CoreResult<()> {
        if self.paused.load(Ordering::Acquire) {
            return Ok(());
        }

        let Some(kind) = EntityKind::from_entity_type(&envelope.resource_type) else {
            log::debug!("ignoring patch for unknown resource {}", envelope.resource_type);
            return Ok(());
        };

        let mut store = self.store.lock().expect("store mutex poisoned");

        let local = store.get_record(kind, &envelope.tenant_id, &envelope.resource_id)?;
        let (local_data, local_meta) = match &local {
            Some(record) => (record.data.clone(), record.meta.clone()),
            None => (Value::Object(Default::default()), RecordMeta::initial()),
        };

        let outcome = self.merge.merge(&local_data, &local_meta, envelope)?;

        if outcome.needs_manual_resolution {
            let conflict = ConflictRecord {
                id: Uuid::new_v4().to_string(),
                tenant_id: envelope.tenant_id.clone(),
                resource_type: envelope.resource_type.clone(),
                resource_id: envelope.resource_id.clone(),
                conflicts: outcome.conflicts,
                local_data,
                remote_patch: Value::Object(envelope.patch.clone()),
                created_at: now_millis(),
                resolved: false,
            };
            store.file_conflict(&conflict)?;
            let unresolved = store.count_unresolved_conflicts(&envelope.tenant_id)?;
            drop(store);

            {
                let mut status = self.status.lock().expect("status mutex poisoned");
                status.unresolved_conflicts = unresolved;
                status.last_cycle.conflicts += 1;
            }
            self.events.dispatch(CoreEvent::ConflictFiled {
                conflict_id: conflict.id,
                resource_type: envelope.resource_type.clone(),
                resource_id: envelope.resource_id.clone(),
            });
            return Ok(());
        }

        let record = DomainRecord {
            id: envelope.resource_id.clone(),
            tenant_id: envelope.tenant_id.clone(),
            organization_id: envelope.organization_id.clone(),
            clinic_id: envelope.clinic_id.clone(),
            data: outcome.merged,
            meta: outcome.meta,
        };
        store.write_merged_record(kind, &record)?;
        drop(store);

        self.events.dispatch(CoreEvent::PatchApplied {
            resource_type: envelope.resource_type.clone(),
            resource_id: envelope.resource_id.clone(),
        });
        Ok(())
    }

    /// Resolves a filed conflict with the caller's chosen record data.
    pub fn resolve_conflict(&self, conflict_id: &str, resolved_data: Value) -> CoreResult<()> {
        let session = self.current_session().ok_or(CoreError::NotInitialized)?;
        let mut store = self.store.lock().expect("store mutex poisoned");

        let conflict = store
            .get_conflict(conflict_id)?
            .ok_or_else(|| CoreError::InvalidState(format!("unknown conflict {}", conflict_id)))?;
        let kind = EntityKind::from_entity_type(&conflict.resource_type).ok_or_else(|| {
            CoreError::InvalidState(format!("unknown resource type {}", conflict.resource_type))
        })?;

        let current = store.get_record(kind, &conflict.tenant_id, &conflict.resource_id)?;
        let version = current.as_ref().map(|r| r.meta.version).unwrap_or(0) + 1;

        let record = DomainRecord {
            id: conflict.resource_id.clone(),
            tenant_id: conflict.tenant_id.clone(),
            organization_id: session.identity.organization_id.clone(),
            clinic_id: session.identity.clinic_id.clone(),
            data: resolved_data,
            meta: RecordMeta {
                version,
                updated_at: now_millis(),
                actor_id: session.identity.device_id.clone(),
            },
        };
        store.resolve_conflict(conflict_id, kind, &record)?;
        let unresolved = store.count_unresolved_conflicts(&conflict.tenant_id)?;
        drop(store);

        let mut status = self.status.lock().expect("status mutex poisoned");
        status.unresolved_conflicts = unresolved;
        Ok(())
    }

    // === Realtime subscriptions & presence ===

    /// Subscribes to a resource channel.
    pub fn subscribe_resource(&self, kind: EntityKind, resource_id: &str) -> CoreResult<()> {
        let channel_name = crate::realtime::resource_channel(kind, resource_id);
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .subscribe(&[channel_name])?;
        Ok(())
    }

    /// Unsubscribes from a resource channel.
    pub fn unsubscribe_resource(&self, kind: EntityKind, resource_id: &str) -> CoreResult<()> {
        let channel_name = crate::realtime::resource_channel(kind, resource_id);
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .unsubscribe(&[channel_name])?;
        Ok(())
    }

    /// Subscribes to a presence scope.
    pub fn subscribe_presence(&self, scope: &str) -> CoreResult<()> {
        let channel_name = crate::realtime::presence_channel(scope);
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .subscribe(&[channel_name])?;
        Ok(())
    }

    /// Announces this user's presence status.
    pub fn set_status(&self, status: PresenceStatus) -> CoreResult<()> {
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .update_presence(Some(status), None)?;
        Ok(())
    }

    /// Announces the resource this user is viewing.
    pub fn set_active_resource(&self, resource: ActiveResource) -> CoreResult<()> {
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .update_presence(None, Some(resource))?;
        Ok(())
    }

    /// Clears the announced active resource.
    pub fn clear_active_resource(&self) -> CoreResult<()> {
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .update_presence(None, None)?;
        Ok(())
    }

    /// Peers currently viewing a resource.
    pub fn users_viewing(&self, resource: &ActiveResource) -> Vec<crate::realtime::PresencePeer> {
        self.presence
            .lock()
            .expect("presence mutex poisoned")
            .users_viewing(resource)
            .into_iter()
            .cloned()
            .collect()
    }

    /// All peers that are not offline.
    pub fn all_online(&self) -> Vec<crate::realtime::PresencePeer> {
        self.presence
            .lock()
            .expect("presence mutex poisoned")
            .all_online()
            .into_iter()
            .cloned()
            .collect()
    }

    // === Lifecycle ===

    /// Suspends scheduled syncs and realtime write-backs. The channel
    /// itself stays open.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.set_phase(SyncPhase::Paused);
    }

    /// Resumes after a pause.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.channel
            .lock()
            .expect("channel mutex poisoned")
            .reset_pull_only();
        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            status.pull_only = false;
        }
        self.set_phase(SyncPhase::Idle);
    }

    /// Pauses, disconnects the channel and drops the session bindings.
    pub fn shutdown(&self) {
        self.pause();
        let _ = self
            .channel
            .lock()
            .expect("channel mutex poisoned")
            .disconnect();
        *self.session.lock().expect("session mutex poisoned") = None;
        *self.token.lock().expect("token mutex poisoned") = None;
        let mut status = self.status.lock().expect("status mutex poisoned");
        status.initialized = false;
        status.realtime = ConnectionState::Disconnected;
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.session.lock().expect("session mutex poisoned").is_some()
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.lock().expect("status mutex poisoned").clone()
    }

    /// Pending rows that exhausted their retries (user intervention).
    pub fn permanent_failures(&self) -> CoreResult<Vec<crate::storage::PendingChange>> {
        let session = self.current_session().ok_or(CoreError::NotInitialized)?;
        Ok(session.upload.permanent_failures()?)
    }

    /// Unresolved conflicts for the active tenant.
    pub fn unresolved_conflicts(&self) -> CoreResult<Vec<ConflictRecord>> {
        let session = self.current_session().ok_or(CoreError::NotInitialized)?;
        let store = self.store.lock().expect("store mutex poisoned");
        Ok(store.unresolved_conflicts(&session.identity.tenant_id)?)
    }

    // === Internals ===

    fn current_session(&self) -> Option<Arc<Session>> {
        self.session.lock().expect("session mutex poisoned").clone()
    }

    fn current_token(&self) -> String {
        self.token
            .lock()
            .expect("token mutex poisoned")
            .clone()
            .unwrap_or_default()
    }

    fn mark_needs_relogin(&self) {
        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            status.needs_relogin = true;
        }
        self.events.dispatch(CoreEvent::NeedsRelogin);
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut status = self.status.lock().expect("status mutex poisoned");
        status.phase = phase;
    }

    fn set_realtime_state(&self, state: ConnectionState) {
        {
            let mut status = self.status.lock().expect("status mutex poisoned");
            if status.realtime == state {
                return;
            }
            status.realtime = state.clone();
        }
        self.events
            .dispatch(CoreEvent::ConnectionStateChanged { state });
    }

    fn refresh_status_counts(
        &self,
        identity: &DeviceIdentity,
        also: impl FnOnce(&mut SyncStatus),
    ) {
        let counts = {
            let store = self.store.lock().expect("store mutex poisoned");
            store
                .count_pending(&identity.tenant_id)
                .and_then(|p| {
                    store
                        .count_unresolved_conflicts(&identity.tenant_id)
                        .map(|c| (p, c))
                })
        };

        let mut status = self.status.lock().expect("status mutex poisoned");
        if let Ok((pending, conflicts)) = counts {
            status.pending_uploads = pending;
            status.unresolved_conflicts = conflicts;
        }
        also(&mut status);
    }
}
