// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared fixtures and scripted service implementations used across the
//! integration test modules.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use chairside_core::identity::{
    AuthApi, AuthError, DeviceLoginRequest, DeviceRegistrar, DeviceSecretStore,
    RegisterDeviceRequest, RegisterDeviceResponse, RegistrationRequest, TokenPair,
};
use chairside_core::storage::MemoryKeyStorage;
use chairside_core::sync::{
    DownloadResponse, RemoteChange, SyncApi, SyncError, SyncScope, UploadRequest, UploadResponse,
};
use chairside_core::update::{
    InstallationEvent, UpdateCheckResult, UpdateError, UpdateSource,
};
use chairside_core::{PatchEnvelope, Store};

pub const TENANT: &str = "tenant-1";
pub const ORG: &str = "org-1";
pub const DEVICE: &str = "device-1";

/// Test-only RSA-2048 keypair used to sign update fixtures at runtime.
pub const TEST_PUBLIC_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAsYvY3oM5cA+DIX1GJCuO
Cxt22B8J/EBcmrvTGu+MJta+Q/tlQ9BxsT0ir9q+BV/WsNKj0w67QMMHqXMR/hGt
sdmVShoCLE7ql9NwpozKfXkNseXHK8qjm8l67Vgbjym7A1VlROQzv5N15haj38qb
gnOOCtPsYp2fTr3cv34KRRgkECTTFCcHn6gFx+vWBOiPxtMaI57Fd9KGYyw6ZUMO
maocUiciFfzye34UCrsrW50eEok4CO+S14l01OfjSEgVDpsJfNhz3nWGVcRJY9Ml
5lKdpHg8tIXHK3kVAki/02P423S6paCGlFuOgRntWyr35UqDsRq5EWSF1vhqQhG8
SQIDAQAB
-----END PUBLIC KEY-----";

const TEST_PRIVATE_PKCS8_B64: &str = concat!(
    "MIIEvAIBADANBgkqhkiG9w0BAQEFAASCBKYwggSiAgEAAoIBAQCxi9jegzlwD4MhfUYkK44LG3bY",
    "Hwn8QFyau9Ma74wm1r5D+2VD0HGxPSKv2r4FX9aw0qPTDrtAwwepcxH+Ea2x2ZVKGgIsTuqX03Cm",
    "jMp9eQ2x5ccryqObyXrtWBuPKbsDVWVE5DO/k3XmFqPfypuCc44K0+xinZ9Ovdy/fgpFGCQQJNMU",
    "JwefqAXH69YE6I/G0xojnsV30oZjLDplQw6ZqhxSJyIV/PJ7fhQKuytbnR4SiTgI75LXiXTU5+NI",
    "SBUOmwl82HPedYZVxElj0yXmUp2keDy0hccreRUCSL/TY/jbdLqloIaUW46BGe1bKvflSoOxGrkR",
    "ZIXW+GpCEbxJAgMBAAECggEAEQNdnLTmZB6YajUe64hg7B+Nm9gdlNZ2CT3GVOZvf6lEQi9s3Lq0",
    "qk85a7CCVPGCGR+WIzteJi6KJWqpZrc69bfr3lXvr19Ai5vvR4ZmQO/AqDNkioW4d80uwl+XBHjz",
    "OraMJbXYX5s5yPqSaXd4v19jVRZJqImCIoF/Dbp+MXCdmHaEhPWX+qZAaMj+V6IppIoXRqH3LRYd",
    "gIGzgVuEAfxE9ZqTiHjZZ9zG02IG2kLFBF5bGlhJUYkSqJo4aOpuf467qmBokBWh34SVQYBZW4PB",
    "cpP6cjz36OgmJjqAjrdjxpuhn4NFP8EaTtRiBJGeFOBTSIKbw1WDXMbIfSoSoQKBgQDxMgJ7c+/E",
    "KWny+AOAFJSAqo84ed1ThHvGTYZ76cmBIt5F2UdIrpwuiolE2j+No3+Lsy9YiKVnKCmOXeFUkpVS",
    "mYXognbNAXj5oAJtPF6coyhtRp8dlmwKJwm8pRiYxPmIw/oWxEg5QdXcFH7cd5H3LX9PYKD/w6Qi",
    "pcdqVCleRwKBgQC8cbJIKB6ahktRyqHuNXGu9aGloOZiqWvXnvlkWZlLCdzWuM/Swdv1zsnQ0D6K",
    "oTirMTs9ZMIIEHWUNzv/vmM2JZ+YnezIbtVWCfUxBaMN1WHAk8MRKtfGj675214vKNVNR3EsZOVQ",
    "yUuQgtW7aIEWoQfa7MU1T6f7ZPTHrTuI7wKBgATiPViglVdEe2e3C+MZB5S/X10GYqvhP9xZD4MM",
    "zc62lQeXCbF4D6OFnJfvT2Af0mJSw3+obKj1EDpYvkpHGYztnN+DXMJz6C4txj7N/SBw0U29I1Wn",
    "CRL/jVvrf98ABgl15md1m/zEz37AT31JUoRNwIkr7LahEH6/GpWVlKzbAoGAfl+I/dbZ3yrca/eF",
    "7Keum3RieR6UIeoYRjt4aBGmOapdjSnXRTF4fzm0IfLlXjaMOFIFtkBR1vKix0jbVcCp6/ADPWf7",
    "GNcq/k4jPkLXfDlzGqB9GpAusBw/bZPtb5bkpLSacvkex7SWlk0HZGzK1RAconZSMlQ/BNpJRXcp",
    "C8UCgYBYCDNcbP6oCPKVy1EKD8jX1ds+02sMAWNlsk6dSd5ZmZDLvEAD8C2Dn8OhyuR5+Dd0IAYl",
    "P8dMQFCrGlHBAt63c2J8p68Rk340Y/EBBad3j5KYkSPFk2ygb/RKW6a8bjH6r4MKNHgNebw9dQ3Z",
    "xR1dJcUzA8FRJBhH+9O0NX/JdQ==",
);

/// Signs data with the test key (RSA-PKCS1-SHA256).
pub fn sign_with_test_key(data: &[u8]) -> Vec<u8> {
    use base64::Engine;
    let der = base64::engine::general_purpose::STANDARD
        .decode(TEST_PRIVATE_PKCS8_B64)
        .unwrap();
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(&der).unwrap();
    let rng = ring::rand::SystemRandom::new();
    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(&ring::signature::RSA_PKCS1_SHA256, &rng, data, &mut signature)
        .unwrap();
    signature
}

pub fn sign_with_test_key_b64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(sign_with_test_key(data))
}

/// Fresh in-memory store behind the shared-store mutex.
pub fn mem_store() -> Arc<Mutex<Store>> {
    Arc::new(Mutex::new(Store::in_memory().unwrap()))
}

/// In-memory secret vault.
pub fn mem_vault() -> Arc<DeviceSecretStore> {
    Arc::new(DeviceSecretStore::new(Arc::new(MemoryKeyStorage::new())))
}

pub fn scope() -> SyncScope {
    SyncScope {
        device_id: DEVICE.to_string(),
        tenant_id: TENANT.to_string(),
        organization_id: ORG.to_string(),
        clinic_id: None,
    }
}

/// Builds a remote change fixture.
pub fn remote_change(
    sequence: u64,
    entity_type: &str,
    entity_id: &str,
    operation: &str,
    data: Value,
) -> RemoteChange {
    RemoteChange {
        change_id: format!("chg-{}", sequence),
        sequence_number: sequence,
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        operation: operation.to_string(),
        data,
        previous_data: None,
        version: sequence,
        timestamp: 1_700_000_000_000 + sequence as i64,
        source_device_id: Some("device-2".to_string()),
    }
}

/// Builds a patch envelope fixture.
pub fn envelope(
    resource_type: &str,
    resource_id: &str,
    version: u64,
    timestamp: i64,
    patch: Value,
) -> PatchEnvelope {
    PatchEnvelope {
        envelope_id: format!("env-{}", version),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        actor_id: "device-2".to_string(),
        version,
        timestamp,
        patch: patch.as_object().cloned().unwrap_or_default(),
        tenant_id: TENANT.to_string(),
        organization_id: ORG.to_string(),
        clinic_id: None,
    }
}

// =============================================================================
// Scripted sync service
// =============================================================================

#[derive(Default)]
pub struct ScriptedSyncApi {
    pub upload_responses: Mutex<VecDeque<Result<UploadResponse, SyncError>>>,
    pub download_responses: Mutex<VecDeque<Result<DownloadResponse, SyncError>>>,
    pub upload_requests: Mutex<Vec<UploadRequest>>,
    pub download_calls: Mutex<Vec<(u64, usize)>>,
    pub tokens_seen: Mutex<Vec<String>>,
}

impl ScriptedSyncApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_upload(&self, response: Result<UploadResponse, SyncError>) {
        self.upload_responses.lock().unwrap().push_back(response);
    }

    pub fn script_download(&self, response: Result<DownloadResponse, SyncError>) {
        self.download_responses.lock().unwrap().push_back(response);
    }

    pub fn upload_count(&self) -> usize {
        self.upload_requests.lock().unwrap().len()
    }

    pub fn download_count(&self) -> usize {
        self.download_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SyncApi for ScriptedSyncApi {
    async fn upload(
        &self,
        token: &str,
        request: &UploadRequest,
    ) -> Result<UploadResponse, SyncError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        self.upload_requests.lock().unwrap().push(request.clone());
        match self.upload_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            // Default: accept everything without assigning new sequences.
            None => Ok(UploadResponse {
                accepted: request.changes.len(),
                rejected: 0,
                new_sequence: request.last_sequence + request.changes.len() as u64,
            }),
        }
    }

    async fn download(
        &self,
        token: &str,
        _scope: &SyncScope,
        since_sequence: u64,
        limit: usize,
    ) -> Result<DownloadResponse, SyncError> {
        self.tokens_seen.lock().unwrap().push(token.to_string());
        self.download_calls
            .lock()
            .unwrap()
            .push((since_sequence, limit));
        match self.download_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(DownloadResponse {
                changes: vec![],
                current_sequence: since_sequence,
            }),
        }
    }
}

// =============================================================================
// Scripted auth service
// =============================================================================

pub struct ScriptedAuthApi {
    pub device_id: String,
    pub refresh_fails: Mutex<bool>,
    pub register_calls: Mutex<Vec<RegisterDeviceRequest>>,
    pub login_calls: Mutex<Vec<DeviceLoginRequest>>,
    pub refresh_calls: Mutex<u32>,
    pub revoked: Mutex<Vec<String>>,
}

impl ScriptedAuthApi {
    pub fn new(device_id: &str) -> Arc<Self> {
        Arc::new(ScriptedAuthApi {
            device_id: device_id.to_string(),
            refresh_fails: Mutex::new(false),
            register_calls: Mutex::new(Vec::new()),
            login_calls: Mutex::new(Vec::new()),
            refresh_calls: Mutex::new(0),
            revoked: Mutex::new(Vec::new()),
        })
    }

    pub fn fail_refresh(&self) {
        *self.refresh_fails.lock().unwrap() = true;
    }
}

#[async_trait]
impl AuthApi for ScriptedAuthApi {
    async fn register_device(
        &self,
        _user_token: &str,
        request: &RegisterDeviceRequest,
    ) -> Result<RegisterDeviceResponse, AuthError> {
        self.register_calls.lock().unwrap().push(request.clone());
        Ok(RegisterDeviceResponse {
            device_id: self.device_id.clone(),
            device_access_token: "bootstrap-token".to_string(),
        })
    }

    async fn device_login(&self, request: &DeviceLoginRequest) -> Result<TokenPair, AuthError> {
        self.login_calls.lock().unwrap().push(request.clone());
        Ok(TokenPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        })
    }

    async fn refresh(
        &self,
        _refresh_token: &str,
        _organization_id: &str,
    ) -> Result<TokenPair, AuthError> {
        if *self.refresh_fails.lock().unwrap() {
            return Err(AuthError::Unauthorized);
        }
        let mut calls = self.refresh_calls.lock().unwrap();
        *calls += 1;
        Ok(TokenPair {
            access_token: format!("access-{}", *calls + 1),
            refresh_token: format!("refresh-{}", *calls + 1),
        })
    }

    async fn revoke_device(&self, _device_token: &str, device_id: &str) -> Result<(), AuthError> {
        self.revoked.lock().unwrap().push(device_id.to_string());
        Ok(())
    }
}

/// Registers a device through scripted auth, returning the registrar too.
pub async fn registered_identity(
    auth: Arc<ScriptedAuthApi>,
    vault: Arc<DeviceSecretStore>,
    store: Arc<Mutex<Store>>,
) -> (Arc<DeviceRegistrar>, chairside_core::DeviceIdentity) {
    let registrar = Arc::new(DeviceRegistrar::new(auth, vault, store, "1.0.0"));
    let identity = registrar
        .register(RegistrationRequest {
            tenant_id: TENANT.to_string(),
            organization_id: ORG.to_string(),
            clinic_id: None,
            user_id: "user-1".to_string(),
            device_name: "Front Desk".to_string(),
            user_token: "user-bearer".to_string(),
        })
        .await
        .unwrap();
    (registrar, identity)
}

// =============================================================================
// Scripted update service
// =============================================================================

#[derive(Default)]
pub struct MemoryUpdateSource {
    pub latest: Mutex<Option<UpdateCheckResult>>,
    pub payloads: Mutex<HashMap<String, Vec<u8>>>,
    pub events: Mutex<Vec<InstallationEvent>>,
}

impl MemoryUpdateSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_latest(&self, result: UpdateCheckResult) {
        *self.latest.lock().unwrap() = Some(result);
    }

    pub fn add_payload(&self, url: &str, data: Vec<u8>) {
        self.payloads.lock().unwrap().insert(url.to_string(), data);
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }
}

#[async_trait]
impl UpdateSource for MemoryUpdateSource {
    async fn check_latest(
        &self,
        _platform: &str,
        _arch: &str,
        _current_version: &str,
        _channel: &str,
    ) -> Result<Option<UpdateCheckResult>, UpdateError> {
        Ok(self.latest.lock().unwrap().clone())
    }

    async fn fetch(
        &self,
        url: &str,
        max_size: u64,
        progress: &(dyn Fn(u64, Option<u64>) + Send + Sync),
    ) -> Result<Vec<u8>, UpdateError> {
        let data = self
            .payloads
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(UpdateError::Http(404))?;
        if data.len() as u64 > max_size {
            return Err(UpdateError::TooLarge {
                size: data.len() as u64,
                max: max_size,
            });
        }
        progress(data.len() as u64, Some(data.len() as u64));
        Ok(data)
    }

    async fn register_installation(&self, event: &InstallationEvent) -> Result<(), UpdateError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Patch applier that copies the staged payload over the app image.
pub struct CopyPatchApplier;

impl chairside_core::PatchApplier for CopyPatchApplier {
    fn apply(
        &self,
        staging_path: &std::path::Path,
        app_path: &std::path::Path,
    ) -> Result<(), UpdateError> {
        std::fs::copy(staging_path, app_path)?;
        Ok(())
    }
}

/// Patch applier that always fails, to exercise the rollback path.
pub struct FailingPatchApplier;

impl chairside_core::PatchApplier for FailingPatchApplier {
    fn apply(
        &self,
        _staging_path: &std::path::Path,
        _app_path: &std::path::Path,
    ) -> Result<(), UpdateError> {
        Err(UpdateError::PatchFailed("scripted failure".to_string()))
    }
}

/// A patient record fixture.
pub fn patient(name: &str, phone: &str) -> Value {
    json!({ "name": name, "phone": phone })
}
