// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end orchestrator behavior: registration, first sync, the
//! upload/download cycle, 401 refresh, realtime patch routing, manual
//! conflicts, pause/resume and scheduling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chairside_core::api::{
    AutoSyncScheduler, EventDispatcher, SkipReason, SyncConfig, SyncOrchestrator, SyncOutcome,
    SyncPhase,
};
use chairside_core::realtime::{MockTransport, RealtimeChannel, TransportConfig};
use chairside_core::storage::{ChangeLogEntry, ChangeOperation};
use chairside_core::sync::{DownloadResponse, EntityKind, UploadResponse};
use chairside_core::{CoreError, MergeStrategy, SecretContext};
use serde_json::json;

use common::{
    mem_store, mem_vault, patient, registered_identity, remote_change, ScriptedAuthApi,
    ScriptedSyncApi, DEVICE, ORG, TENANT,
};

#[allow(dead_code)]
struct Harness {
    store: std::sync::Arc<std::sync::Mutex<chairside_core::Store>>,
    vault: Arc<chairside_core::DeviceSecretStore>,
    auth: Arc<ScriptedAuthApi>,
    api: Arc<ScriptedSyncApi>,
    transport: MockTransport,
    orchestrator: Arc<SyncOrchestrator<MockTransport>>,
}

async fn harness(config: SyncConfig) -> Harness {
    let store = mem_store();
    let vault = mem_vault();
    let auth = ScriptedAuthApi::new(DEVICE);
    let (registrar, _identity) =
        registered_identity(auth.clone(), vault.clone(), store.clone()).await;

    let api = ScriptedSyncApi::new();
    let transport = MockTransport::new();
    let channel = RealtimeChannel::new(
        transport.clone(),
        TransportConfig {
            server_url: "ws://localhost:9999".to_string(),
            ..Default::default()
        },
    );

    let orchestrator = Arc::new(SyncOrchestrator::new(
        config,
        store.clone(),
        vault.clone(),
        registrar,
        api.clone(),
        channel,
        Arc::new(EventDispatcher::new()),
    ));

    Harness {
        store,
        vault,
        auth,
        api,
        transport,
        orchestrator,
    }
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        min_sync_interval: Duration::ZERO,
        ..Default::default()
    }
}

#[tokio::test]
async fn registration_persists_secrets_and_identity() {
    let store = mem_store();
    let vault = mem_vault();
    let auth = ScriptedAuthApi::new(DEVICE);
    let (_registrar, identity) =
        registered_identity(auth.clone(), vault.clone(), store.clone()).await;

    assert_eq!(identity.device_id, DEVICE);
    assert_eq!(auth.register_calls.lock().unwrap().len(), 1);
    assert_eq!(auth.login_calls.lock().unwrap().len(), 1);

    // The vault holds the token pair and a fresh 32-byte key.
    let secrets = vault
        .load(&SecretContext::new(TENANT, ORG, DEVICE))
        .unwrap()
        .unwrap();
    assert_eq!(secrets.device_access_token, "access-1");
    assert_eq!(secrets.device_refresh_token.as_deref(), Some("refresh-1"));
    assert_eq!(secrets.encryption_key.as_bytes().len(), 32);

    // The identity row landed in the store.
    let row = store.lock().unwrap().load_device(TENANT, ORG).unwrap();
    assert_eq!(row.unwrap().device_id, DEVICE);
}

#[tokio::test]
async fn first_sync_on_empty_state_completes_cleanly() {
    let h = harness(SyncConfig::default()).await;
    h.orchestrator.initialize().await.unwrap();

    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    match outcome {
        SyncOutcome::Completed(counters) => {
            assert_eq!(counters.uploaded, 0);
            assert_eq!(counters.downloaded, 0);
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let status = h.orchestrator.status();
    assert!(status.initialized);
    assert!(status.last_sync_at.is_some());
    assert_eq!(status.pending_uploads, 0);
    // No pending rows means no upload HTTP call at all.
    assert_eq!(h.api.upload_count(), 0);
    assert_eq!(h.api.download_count(), 1);
    assert_eq!(
        h.store.lock().unwrap().sync_cursor(TENANT).unwrap().last_synced_sequence,
        0
    );
}

#[tokio::test]
async fn local_insert_uploads_and_advances_cursor() {
    let h = harness(fast_config()).await;
    h.orchestrator.initialize().await.unwrap();

    h.orchestrator
        .record_local_change(
            EntityKind::Patient,
            "P1",
            ChangeOperation::Insert,
            patient("Anna", "111"),
            None,
        )
        .unwrap();
    assert_eq!(h.orchestrator.status().pending_uploads, 1);

    h.api.script_upload(Ok(UploadResponse {
        accepted: 1,
        rejected: 0,
        new_sequence: 42,
    }));

    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(c) if c.uploaded == 1));

    let status = h.orchestrator.status();
    assert_eq!(status.pending_uploads, 0);
    assert_eq!(
        h.store.lock().unwrap().sync_cursor(TENANT).unwrap().last_synced_sequence,
        42
    );
}

#[tokio::test]
async fn download_counters_flow_into_status() {
    let h = harness(fast_config()).await;
    h.orchestrator.initialize().await.unwrap();

    h.api.script_download(Ok(DownloadResponse {
        changes: vec![remote_change(
            1,
            "patient",
            "P1",
            "insert",
            patient("Anna", "111"),
        )],
        current_sequence: 1,
    }));

    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(c) if c.downloaded == 1));
    assert_eq!(h.orchestrator.status().last_cycle.downloaded, 1);
}

#[tokio::test]
async fn expired_token_refreshes_and_retries_once() {
    let h = harness(fast_config()).await;
    h.orchestrator.initialize().await.unwrap();

    h.orchestrator
        .record_local_change(
            EntityKind::Patient,
            "P1",
            ChangeOperation::Insert,
            patient("Anna", "111"),
            None,
        )
        .unwrap();

    // First attempt bounces with a 401; the retry succeeds.
    h.api
        .script_upload(Err(chairside_core::SyncError::AuthExpired));
    h.api.script_upload(Ok(UploadResponse {
        accepted: 1,
        rejected: 0,
        new_sequence: 1,
    }));

    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(c) if c.uploaded == 1));

    // One refresh at initialize, one for the 401.
    assert_eq!(*h.auth.refresh_calls.lock().unwrap(), 2);

    let tokens = h.api.tokens_seen.lock().unwrap();
    assert_ne!(tokens[0], tokens[1]);
}

#[tokio::test]
async fn refresh_failure_marks_needs_relogin() {
    let store = mem_store();
    let vault = mem_vault();
    let auth = ScriptedAuthApi::new(DEVICE);
    let (registrar, _identity) =
        registered_identity(auth.clone(), vault.clone(), store.clone()).await;
    auth.fail_refresh();

    let orchestrator = SyncOrchestrator::new(
        SyncConfig::default(),
        store,
        vault,
        registrar,
        ScriptedSyncApi::new(),
        RealtimeChannel::new(MockTransport::new(), TransportConfig::default()),
        Arc::new(EventDispatcher::new()),
    );

    let result = orchestrator.initialize().await;
    assert!(result.is_err());
    assert!(orchestrator.status().needs_relogin);
}

#[tokio::test]
async fn uninitialized_trigger_fails_fast() {
    let h = harness(SyncConfig::default()).await;
    let result = h.orchestrator.trigger_sync().await;
    assert!(matches!(result, Err(CoreError::NotInitialized)));
}

#[tokio::test]
async fn paused_trigger_is_skipped() {
    let h = harness(SyncConfig::default()).await;
    h.orchestrator.initialize().await.unwrap();

    h.orchestrator.pause();
    assert_eq!(h.orchestrator.status().phase, SyncPhase::Paused);

    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Paused));

    h.orchestrator.resume();
    let outcome = h.orchestrator.trigger_sync().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Completed(_)));
}

#[tokio::test]
async fn rapid_triggers_are_rate_limited() {
    let h = harness(SyncConfig::default()).await;
    h.orchestrator.initialize().await.unwrap();

    let first = h.orchestrator.trigger_sync().await.unwrap();
    assert!(matches!(first, SyncOutcome::Completed(_)));

    // Inside the minimum inter-sync interval.
    let second = h.orchestrator.trigger_sync().await.unwrap();
    assert_eq!(second, SyncOutcome::Skipped(SkipReason::RateLimited));
}

#[tokio::test]
async fn realtime_patch_merges_into_domain_record() {
    let h = harness(SyncConfig::default()).await;

    // Seed the local record at version 3.
    {
        let mut store = h.store.lock().unwrap();
        store
            .apply_remote_change(
                &ChangeLogEntry {
                    change_id: "chg-1".to_string(),
                    sequence_number: 1,
                    tenant_id: TENANT.to_string(),
                    organization_id: ORG.to_string(),
                    clinic_id: None,
                    entity_type: "patient".to_string(),
                    entity_id: "P1".to_string(),
                    operation: ChangeOperation::Insert,
                    data: json!({ "name": "A" }),
                    previous_data: None,
                    version: 3,
                    timestamp: 1_000,
                    source_device_id: None,
                    synced_at: None,
                },
                true,
                None,
            )
            .unwrap();
    }

    let envelope = common::envelope("patient", "P1", 4, 2_000, json!({ "name": "B" }));
    h.orchestrator.handle_realtime_patch(&envelope).unwrap();

    let store = h.store.lock().unwrap();
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["name"], json!("B"));
    assert_eq!(record.meta.version, 4);
    assert_eq!(store.count_unresolved_conflicts(TENANT).unwrap(), 0);
}

#[tokio::test]
async fn manual_strategy_files_conflict_and_leaves_record() {
    let h = harness(SyncConfig {
        merge_strategy: MergeStrategy::Manual,
        ..Default::default()
    })
    .await;

    {
        let mut store = h.store.lock().unwrap();
        store
            .apply_remote_change(
                &ChangeLogEntry {
                    change_id: "chg-1".to_string(),
                    sequence_number: 1,
                    tenant_id: TENANT.to_string(),
                    organization_id: ORG.to_string(),
                    clinic_id: None,
                    entity_type: "patient".to_string(),
                    entity_id: "P1".to_string(),
                    operation: ChangeOperation::Insert,
                    data: json!({ "tags": ["x"] }),
                    previous_data: None,
                    version: 5,
                    timestamp: 1_000,
                    source_device_id: None,
                    synced_at: None,
                },
                true,
                None,
            )
            .unwrap();
    }

    let envelope = common::envelope("patient", "P1", 5, 1_000, json!({ "tags": ["y"] }));
    h.orchestrator.handle_realtime_patch(&envelope).unwrap();

    let store = h.store.lock().unwrap();
    // Domain record unchanged until the user resolves.
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["tags"], json!(["x"]));
    assert_eq!(store.count_unresolved_conflicts(TENANT).unwrap(), 1);
    drop(store);

    let status = h.orchestrator.status();
    assert_eq!(status.unresolved_conflicts, 1);
    assert_eq!(status.last_cycle.conflicts, 1);
}

#[tokio::test]
async fn resolving_a_conflict_writes_the_choice() {
    let h = harness(SyncConfig {
        merge_strategy: MergeStrategy::Manual,
        ..Default::default()
    })
    .await;
    h.orchestrator.initialize().await.unwrap();

    {
        let mut store = h.store.lock().unwrap();
        store
            .apply_remote_change(
                &ChangeLogEntry {
                    change_id: "chg-1".to_string(),
                    sequence_number: 1,
                    tenant_id: TENANT.to_string(),
                    organization_id: ORG.to_string(),
                    clinic_id: None,
                    entity_type: "patient".to_string(),
                    entity_id: "P1".to_string(),
                    operation: ChangeOperation::Insert,
                    data: json!({ "tags": ["x"] }),
                    previous_data: None,
                    version: 5,
                    timestamp: 1_000,
                    source_device_id: None,
                    synced_at: None,
                },
                true,
                None,
            )
            .unwrap();
    }

    let envelope = common::envelope("patient", "P1", 5, 1_000, json!({ "tags": ["y"] }));
    h.orchestrator.handle_realtime_patch(&envelope).unwrap();

    let conflicts = h.orchestrator.unresolved_conflicts().unwrap();
    assert_eq!(conflicts.len(), 1);

    h.orchestrator
        .resolve_conflict(&conflicts[0].id, json!({ "tags": ["x", "y"] }))
        .unwrap();

    let store = h.store.lock().unwrap();
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["tags"], json!(["x", "y"]));
    assert_eq!(store.count_unresolved_conflicts(TENANT).unwrap(), 0);
}

#[tokio::test]
async fn paused_orchestrator_suspends_realtime_write_backs() {
    let h = harness(SyncConfig::default()).await;
    h.orchestrator.pause();

    let envelope = common::envelope("patient", "P1", 4, 2_000, json!({ "name": "B" }));
    h.orchestrator.handle_realtime_patch(&envelope).unwrap();

    let store = h.store.lock().unwrap();
    assert!(store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn scheduler_connectivity_pauses_and_resumes() {
    let h = harness(fast_config()).await;
    h.orchestrator.initialize().await.unwrap();

    let scheduler = AutoSyncScheduler::new(
        h.orchestrator.clone(),
        &chairside_core::api::AlwaysOnline,
    );

    scheduler.handle_connectivity(false).await;
    assert!(h.orchestrator.is_paused());
    assert_eq!(h.orchestrator.status().phase, SyncPhase::Paused);

    // Recovery resumes and triggers an immediate sync.
    scheduler.handle_connectivity(true).await;
    assert!(!h.orchestrator.is_paused());
    assert!(h.orchestrator.status().last_sync_at.is_some());
}

#[tokio::test]
async fn unlink_clears_secrets_but_keeps_domain_data() {
    let store = mem_store();
    let vault = mem_vault();
    let auth = ScriptedAuthApi::new(DEVICE);
    let (registrar, identity) =
        registered_identity(auth.clone(), vault.clone(), store.clone()).await;

    // Seed one domain record.
    {
        let mut store = store.lock().unwrap();
        store
            .apply_remote_change(
                &ChangeLogEntry {
                    change_id: "chg-1".to_string(),
                    sequence_number: 1,
                    tenant_id: TENANT.to_string(),
                    organization_id: ORG.to_string(),
                    clinic_id: None,
                    entity_type: "patient".to_string(),
                    entity_id: "P1".to_string(),
                    operation: ChangeOperation::Insert,
                    data: patient("Anna", "111"),
                    previous_data: None,
                    version: 1,
                    timestamp: 1_000,
                    source_device_id: None,
                    synced_at: None,
                },
                true,
                None,
            )
            .unwrap();
    }

    registrar.unlink(&identity).await.unwrap();

    assert_eq!(auth.revoked.lock().unwrap().as_slice(), [DEVICE.to_string()]);
    assert!(vault
        .load(&SecretContext::new(TENANT, ORG, DEVICE))
        .unwrap()
        .is_none());

    let store = store.lock().unwrap();
    assert!(store.load_device(TENANT, ORG).unwrap().is_none());
    // Domain data survives the unlink.
    assert!(store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn realtime_pump_routes_presence_and_patches() {
    let h = harness(SyncConfig::default()).await;
    h.orchestrator.initialize().await.unwrap();

    use chairside_core::realtime::{
        ActiveResource, PresencePeer, PresenceStatus, RealtimeEvent, ServerMessage,
    };

    h.transport.queue_receive(ServerMessage::UserJoined(PresencePeer {
        actor_id: "peer-1".to_string(),
        status: PresenceStatus::Online,
        active_resource: Some(ActiveResource {
            resource_type: "patient".to_string(),
            resource_id: "P1".to_string(),
        }),
        display_name: Some("Dr. B".to_string()),
    }));
    h.transport.queue_receive(ServerMessage::Event(RealtimeEvent {
        event_id: "e1".to_string(),
        event_type: "patient.updated".to_string(),
        tenant_id: TENANT.to_string(),
        organization_id: ORG.to_string(),
        clinic_id: None,
        payload: chairside_core::realtime::EventPayload {
            patch: Some(common::envelope(
                "patient",
                "P1",
                1,
                1_000,
                json!({ "name": "Anna" }),
            )),
        },
        timestamp: 1_000,
    }));

    h.orchestrator.pump_realtime().unwrap();

    let viewing = h.orchestrator.users_viewing(&ActiveResource {
        resource_type: "patient".to_string(),
        resource_id: "P1".to_string(),
    });
    assert_eq!(viewing.len(), 1);
    assert_eq!(viewing[0].actor_id, "peer-1");

    // The patch landed as a new record (empty local side).
    let store = h.store.lock().unwrap();
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["name"], json!("Anna"));
    assert_eq!(record.meta.version, 1);
}
