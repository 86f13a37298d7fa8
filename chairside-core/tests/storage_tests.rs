// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the local store: cursors, change log, pending queue,
//! conflict inbox, and the composite transactions.

mod common;

use chairside_core::storage::{ChangeLogEntry, ChangeOperation, ConflictRecord, PendingChange};
use chairside_core::storage::AppliedChange;
use chairside_core::sync::EntityKind;
use chairside_core::Store;
use serde_json::json;

use common::{patient, TENANT};

fn entry(sequence: u64, entity_id: &str, data: serde_json::Value) -> ChangeLogEntry {
    ChangeLogEntry {
        change_id: format!("chg-{}", sequence),
        sequence_number: sequence,
        tenant_id: TENANT.to_string(),
        organization_id: "org-1".to_string(),
        clinic_id: None,
        entity_type: "patient".to_string(),
        entity_id: entity_id.to_string(),
        operation: ChangeOperation::Update,
        data,
        previous_data: None,
        version: sequence,
        timestamp: 1_700_000_000_000 + sequence as i64,
        source_device_id: Some("device-2".to_string()),
        synced_at: None,
    }
}

fn pending(local_id: &str, entity_id: &str, created_at: i64) -> PendingChange {
    PendingChange {
        local_id: local_id.to_string(),
        tenant_id: TENANT.to_string(),
        organization_id: "org-1".to_string(),
        clinic_id: None,
        entity_type: "patient".to_string(),
        entity_id: entity_id.to_string(),
        operation: ChangeOperation::Update,
        data: patient("A", "111"),
        previous_data: None,
        created_at,
        retry_count: 0,
        last_error: None,
        synced: false,
    }
}

#[test]
fn cursor_defaults_to_zero() {
    let store = Store::in_memory().unwrap();
    let cursor = store.sync_cursor(TENANT).unwrap();
    assert_eq!(cursor.last_synced_sequence, 0);
}

#[test]
fn cursor_advances_monotonically() {
    let store = Store::in_memory().unwrap();

    let cursor = store.advance_cursor(TENANT, 10).unwrap();
    assert_eq!(cursor.last_synced_sequence, 10);

    // A lower target never moves the cursor back.
    let cursor = store.advance_cursor(TENANT, 5).unwrap();
    assert_eq!(cursor.last_synced_sequence, 10);

    let cursor = store.advance_cursor(TENANT, 42).unwrap();
    assert_eq!(cursor.last_synced_sequence, 42);
}

#[test]
fn cursors_are_per_tenant() {
    let store = Store::in_memory().unwrap();
    store.advance_cursor("tenant-a", 7).unwrap();

    assert_eq!(store.sync_cursor("tenant-a").unwrap().last_synced_sequence, 7);
    assert_eq!(store.sync_cursor("tenant-b").unwrap().last_synced_sequence, 0);
}

#[test]
fn apply_remote_change_writes_log_record_and_cursor() {
    let mut store = Store::in_memory().unwrap();

    let applied = store
        .apply_remote_change(&entry(3, "P1", patient("Anna", "111")), true, None)
        .unwrap();
    assert_eq!(applied, AppliedChange::Applied);

    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["name"], json!("Anna"));
    assert_eq!(record.meta.version, 3);
    assert_eq!(record.meta.actor_id, "device-2");

    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 3);
    assert!(store.has_applied_sequence(TENANT, 3).unwrap());
}

#[test]
fn applying_same_sequence_twice_is_a_noop() {
    let mut store = Store::in_memory().unwrap();

    store
        .apply_remote_change(&entry(3, "P1", patient("Anna", "111")), true, None)
        .unwrap();
    let second = store
        .apply_remote_change(&entry(3, "P1", patient("Tampered", "999")), true, None)
        .unwrap();
    assert_eq!(second, AppliedChange::Duplicate);

    // The first write stands.
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["name"], json!("Anna"));
    assert_eq!(store.count_changelog(TENANT).unwrap(), 1);
}

#[test]
fn same_sequence_different_tenants_both_apply() {
    let mut store = Store::in_memory().unwrap();

    let mut other = entry(3, "P1", patient("Anna", "111"));
    other.tenant_id = "tenant-b".to_string();

    store
        .apply_remote_change(&entry(3, "P1", patient("Anna", "111")), true, None)
        .unwrap();
    let applied = store.apply_remote_change(&other, true, None).unwrap();
    assert_eq!(applied, AppliedChange::Applied);
}

#[test]
fn apply_delete_removes_record() {
    let mut store = Store::in_memory().unwrap();
    store
        .apply_remote_change(&entry(1, "P1", patient("Anna", "111")), true, None)
        .unwrap();

    let mut delete = entry(2, "P1", json!({}));
    delete.operation = ChangeOperation::Delete;
    store.apply_remote_change(&delete, true, None).unwrap();

    assert!(store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .is_none());
}

#[test]
fn cursor_target_advances_past_entry_sequence() {
    let mut store = Store::in_memory().unwrap();
    store
        .apply_remote_change(&entry(3, "P1", patient("Anna", "111")), true, Some(9))
        .unwrap();
    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 9);
}

#[test]
fn record_local_change_writes_domain_and_queue() {
    let mut store = Store::in_memory().unwrap();

    let meta = store
        .record_local_change(EntityKind::Patient, &pending("L1", "P1", 100), "device-1")
        .unwrap();
    assert_eq!(meta.version, 1);
    assert_eq!(meta.actor_id, "device-1");

    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.meta.version, 1);
    assert_eq!(store.count_pending(TENANT).unwrap(), 1);

    // A second local change bumps the version past the stored record.
    let meta = store
        .record_local_change(EntityKind::Patient, &pending("L2", "P1", 200), "device-1")
        .unwrap();
    assert_eq!(meta.version, 2);
}

#[test]
fn oldest_unsynced_orders_by_created_at_and_respects_ceiling() {
    let store = Store::in_memory().unwrap();
    store.insert_pending(&pending("L2", "P2", 200)).unwrap();
    store.insert_pending(&pending("L1", "P1", 100)).unwrap();

    let mut exhausted = pending("L3", "P3", 50);
    exhausted.retry_count = 5;
    store.insert_pending(&exhausted).unwrap();

    let rows = store.oldest_unsynced(TENANT, 5, 10).unwrap();
    let ids: Vec<_> = rows.iter().map(|r| r.local_id.as_str()).collect();
    assert_eq!(ids, vec!["L1", "L2"]);
}

#[test]
fn finalize_batch_deletes_prefix_and_bumps_rest() {
    let mut store = Store::in_memory().unwrap();
    store.insert_pending(&pending("L1", "P1", 100)).unwrap();
    store.insert_pending(&pending("L2", "P2", 200)).unwrap();
    store.insert_pending(&pending("L3", "P3", 300)).unwrap();

    store
        .finalize_batch(
            &["L1".to_string(), "L2".to_string()],
            &[("L3".to_string(), "validation failed".to_string())],
        )
        .unwrap();

    assert!(store.get_pending("L1").unwrap().is_none());
    assert!(store.get_pending("L2").unwrap().is_none());

    let survivor = store.get_pending("L3").unwrap().unwrap();
    assert_eq!(survivor.retry_count, 1);
    assert_eq!(survivor.last_error.as_deref(), Some("validation failed"));
}

#[test]
fn permanent_failures_are_surfaced_not_dropped() {
    let store = Store::in_memory().unwrap();
    let mut row = pending("L1", "P1", 100);
    row.retry_count = 5;
    store.insert_pending(&row).unwrap();

    let failures = store.permanent_failures(TENANT, 5).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].local_id, "L1");

    // And the batch query skips them.
    assert!(store.oldest_unsynced(TENANT, 5, 10).unwrap().is_empty());
}

#[test]
fn server_wins_resolution_overwrites_pending() {
    let store = Store::in_memory().unwrap();
    store.insert_pending(&pending("L1", "P1", 100)).unwrap();

    store
        .resolve_pending_server_wins("L1", &patient("Anna", "222"))
        .unwrap();

    let row = store.get_pending("L1").unwrap().unwrap();
    assert!(row.synced);
    assert_eq!(row.data["phone"], json!("222"));
    assert_eq!(store.count_pending(TENANT).unwrap(), 0);
}

#[test]
fn conflict_inbox_lifecycle() {
    let mut store = Store::in_memory().unwrap();

    let conflict = ConflictRecord {
        id: "c1".to_string(),
        tenant_id: TENANT.to_string(),
        resource_type: "patient".to_string(),
        resource_id: "P1".to_string(),
        conflicts: vec![],
        local_data: patient("Anna", "111"),
        remote_patch: json!({ "phone": "222" }),
        created_at: 100,
        resolved: false,
    };
    store.file_conflict(&conflict).unwrap();
    assert_eq!(store.count_unresolved_conflicts(TENANT).unwrap(), 1);

    let resolved = chairside_core::DomainRecord {
        id: "P1".to_string(),
        tenant_id: TENANT.to_string(),
        organization_id: "org-1".to_string(),
        clinic_id: None,
        data: patient("Anna", "222"),
        meta: chairside_core::RecordMeta {
            version: 6,
            updated_at: 200,
            actor_id: "device-1".to_string(),
        },
    };
    store
        .resolve_conflict("c1", EntityKind::Patient, &resolved)
        .unwrap();

    assert_eq!(store.count_unresolved_conflicts(TENANT).unwrap(), 0);
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["phone"], json!("222"));
}

#[test]
fn appointments_index_by_patient() {
    let mut store = Store::in_memory().unwrap();

    let mut appointment = entry(1, "A1", json!({ "patientId": "P1", "slot": "09:00" }));
    appointment.entity_type = "appointment".to_string();
    store.apply_remote_change(&appointment, true, None).unwrap();

    let mut other = entry(2, "A2", json!({ "patientId": "P2", "slot": "10:00" }));
    other.entity_type = "appointment".to_string();
    store.apply_remote_change(&other, true, None).unwrap();

    let rows = store
        .records_for_patient(EntityKind::Appointment, TENANT, "P1")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "A1");
}

#[test]
fn unknown_entity_type_still_logs_and_advances_cursor() {
    let mut store = Store::in_memory().unwrap();

    let mut change = entry(4, "X1", json!({ "foo": 1 }));
    change.entity_type = "clinic.records.xray".to_string();
    store.apply_remote_change(&change, true, None).unwrap();

    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 4);
    assert!(store.has_applied_sequence(TENANT, 4).unwrap());
}
