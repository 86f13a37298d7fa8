// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Chairside Core Library
//!
//! Offline-first sync core for the Chairside desktop client: a durable
//! local change log, a bidirectional delta protocol against the sync
//! service, a field-level merge engine for realtime patches, an encrypted
//! credential vault bound to a (tenant, organization, device) identity,
//! and a signed update pipeline with atomic rollback.

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub mod api;
pub mod crypto;
pub mod identity;
pub mod merge;
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub mod realtime;
pub mod storage;
pub mod sync;
pub mod update;

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use api::{
    AutoSyncScheduler, CallbackHandler, CoreConfig, CoreError, CoreEvent, CoreResult,
    EventDispatcher, EventHandler, NetworkMonitor, SyncConfig, SyncOrchestrator, SyncOutcome,
    SyncPhase, SyncStatus,
};
pub use crypto::{decrypt, encrypt, SymmetricKey};
pub use identity::{
    DeviceIdentity, DeviceRegistrar, DeviceSecretStore, DeviceSecrets, LockPolicy, LockReason,
    Platform, SecretContext, SessionLock,
};
pub use merge::{ConflictResolution, FieldConflict, MergeEngine, MergeOutcome, MergeStrategy};
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use realtime::{
    ActiveResource, ConnectionState, MockTransport, NetworkError, PresencePeer, PresenceStatus,
    PresenceTracker, RealtimeChannel, Transport, TransportConfig, WebSocketTransport,
};
pub use storage::{
    ChangeLogEntry, ChangeOperation, ConflictRecord, DomainRecord, PendingChange, SecureStorage,
    StorageError, Store, SyncCursor,
};
pub use sync::{
    CollisionStrategy, DeltaDownloader, EntityKind, PatchEnvelope, RecordMeta, SyncError,
    SyncScope, UploadQueue,
};
pub use update::{
    PatchApplier, PublisherKey, UpdateCheckResult, UpdateError, UpdateManager, UpdatePhase,
};
