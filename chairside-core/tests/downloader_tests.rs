// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Delta-downloader behavior: in-order application, collision
//! strategies, cursor advancement and idempotent re-runs.

mod common;

use chairside_core::storage::ChangeOperation;
use chairside_core::sync::{
    CollisionStrategy, DeltaDownloader, DownloadResponse, EntityKind, UploadQueue,
};
use serde_json::json;

use common::{mem_store, patient, remote_change, scope, ScriptedSyncApi, TENANT};

#[tokio::test]
async fn empty_download_leaves_cursor_unchanged() {
    let store = mem_store();
    let api = ScriptedSyncApi::new();
    api.script_download(Ok(DownloadResponse {
        changes: vec![],
        current_sequence: 0,
    }));
    let downloader = DeltaDownloader::new(store.clone(), api.clone(), scope());

    let outcome = downloader.download("token").await.unwrap();

    assert_eq!(outcome.applied, 0);
    assert_eq!(outcome.conflicts, 0);
    assert_eq!(
        store.lock().unwrap().sync_cursor(TENANT).unwrap().last_synced_sequence,
        0
    );
    // The request carried the cursor as sinceSequence.
    assert_eq!(api.download_calls.lock().unwrap()[0].0, 0);
}

#[tokio::test]
async fn changes_apply_in_order_and_cursor_reaches_current() {
    let store = mem_store();
    let api = ScriptedSyncApi::new();
    api.script_download(Ok(DownloadResponse {
        changes: vec![
            remote_change(1, "patient", "P1", "insert", patient("Anna", "111")),
            remote_change(2, "patient", "P1", "update", patient("Anna", "222")),
            remote_change(3, "patient", "P2", "insert", patient("Ben", "333")),
        ],
        current_sequence: 3,
    }));
    let downloader = DeltaDownloader::new(store.clone(), api, scope());

    let outcome = downloader.download("token").await.unwrap();
    assert_eq!(outcome.applied, 3);

    let store = store.lock().unwrap();
    let p1 = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(p1.data["phone"], json!("222"));
    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 3);
}

#[tokio::test]
async fn server_wins_collision_resolves_pending_and_overwrites() {
    // Pending local edit sets phone=111; the server says phone=222 at
    // sequence 7. Default strategy: server wins.
    let store = mem_store();
    let api = ScriptedSyncApi::new();

    let queue = UploadQueue::new(store.clone(), api.clone(), scope());
    queue
        .enqueue(
            EntityKind::Patient,
            "P1",
            ChangeOperation::Update,
            patient("Anna", "111"),
            None,
        )
        .unwrap();

    api.script_download(Ok(DownloadResponse {
        changes: vec![remote_change(
            7,
            "patient",
            "P1",
            "update",
            patient("Anna", "222"),
        )],
        current_sequence: 7,
    }));
    let downloader =
        DeltaDownloader::new(store.clone(), api, scope()).with_strategy(CollisionStrategy::ServerWins);

    let outcome = downloader.download("token").await.unwrap();
    assert_eq!(outcome.conflicts, 1);

    let store = store.lock().unwrap();
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["phone"], json!("222"));
    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 7);
    // The pending row left the queue.
    assert_eq!(store.count_pending(TENANT).unwrap(), 0);
}

#[tokio::test]
async fn client_wins_collision_keeps_local_record() {
    let store = mem_store();
    let api = ScriptedSyncApi::new();

    let queue = UploadQueue::new(store.clone(), api.clone(), scope());
    queue
        .enqueue(
            EntityKind::Patient,
            "P1",
            ChangeOperation::Update,
            patient("Anna", "111"),
            None,
        )
        .unwrap();

    api.script_download(Ok(DownloadResponse {
        changes: vec![remote_change(
            7,
            "patient",
            "P1",
            "update",
            patient("Anna", "222"),
        )],
        current_sequence: 7,
    }));
    let downloader = DeltaDownloader::new(store.clone(), api, scope())
        .with_strategy(CollisionStrategy::ClientWins);

    downloader.download("token").await.unwrap();

    let store = store.lock().unwrap();
    // The local value stays; the pending edit will re-assert it.
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["phone"], json!("111"));
    assert_eq!(store.count_pending(TENANT).unwrap(), 1);
    let rows = store.pending_for_entity(TENANT, "patient", "P1").unwrap();
    assert_eq!(rows[0].retry_count, 1);
    // The change is logged and the cursor advanced regardless.
    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 7);
}

#[tokio::test]
async fn merge_collision_deep_merges_remote_onto_local() {
    let store = mem_store();
    let api = ScriptedSyncApi::new();

    let queue = UploadQueue::new(store.clone(), api.clone(), scope());
    queue
        .enqueue(
            EntityKind::Patient,
            "P1",
            ChangeOperation::Update,
            json!({ "name": "Anna", "address": { "zip": "1000", "city": "Bern" } }),
            None,
        )
        .unwrap();

    api.script_download(Ok(DownloadResponse {
        changes: vec![remote_change(
            9,
            "patient",
            "P1",
            "update",
            json!({ "name": "Anna", "address": { "zip": "2000" } }),
        )],
        current_sequence: 9,
    }));
    let downloader =
        DeltaDownloader::new(store.clone(), api, scope()).with_strategy(CollisionStrategy::Merge);

    downloader.download("token").await.unwrap();

    let store = store.lock().unwrap();
    let record = store
        .get_record(EntityKind::Patient, TENANT, "P1")
        .unwrap()
        .unwrap();
    assert_eq!(record.data["address"]["zip"], json!("2000"));
    assert_eq!(record.data["address"]["city"], json!("Bern"));
}

#[tokio::test]
async fn rerunning_a_page_is_idempotent() {
    let store = mem_store();
    let api = ScriptedSyncApi::new();
    let page = DownloadResponse {
        changes: vec![remote_change(
            5,
            "patient",
            "P1",
            "insert",
            patient("Anna", "111"),
        )],
        current_sequence: 5,
    };
    api.script_download(Ok(page.clone()));
    api.script_download(Ok(page));

    let downloader = DeltaDownloader::new(store.clone(), api, scope());

    let first = downloader.download("token").await.unwrap();
    assert_eq!(first.applied, 1);

    // The same page delivered again (e.g. a retried request) changes nothing.
    let second = downloader.download("token").await.unwrap();
    assert_eq!(second.applied, 0);

    let store = store.lock().unwrap();
    assert_eq!(store.count_changelog(TENANT).unwrap(), 1);
    assert_eq!(store.sync_cursor(TENANT).unwrap().last_synced_sequence, 5);
}

#[tokio::test]
async fn download_requests_carry_the_cursor() {
    let store = mem_store();
    store.lock().unwrap().advance_cursor(TENANT, 17).unwrap();

    let api = ScriptedSyncApi::new();
    let downloader = DeltaDownloader::new(store, api.clone(), scope());
    downloader.download("token").await.unwrap();

    assert_eq!(api.download_calls.lock().unwrap()[0].0, 17);
}
