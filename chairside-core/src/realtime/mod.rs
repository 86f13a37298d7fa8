// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Realtime Layer
//!
//! Long-lived connection to the realtime endpoint, delivering patch
//! envelopes and presence events.
//!
//! # Architecture
//!
//! - **Transport trait**: platform-agnostic interface for the socket
//! - **Message types**: closed client/server wire protocol
//! - **Channel**: state machine, subscriptions, heartbeat, reconnects
//! - **Presence tracker**: who-is-viewing-what cache

#[cfg(feature = "testing")]
pub mod channel;
#[cfg(not(feature = "testing"))]
mod channel;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod message;
#[cfg(not(feature = "testing"))]
mod message;

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

#[cfg(feature = "testing")]
pub mod presence;
#[cfg(not(feature = "testing"))]
mod presence;

#[cfg(feature = "testing")]
pub mod transport;
#[cfg(not(feature = "testing"))]
mod transport;

#[cfg(feature = "testing")]
pub mod websocket;
#[cfg(not(feature = "testing"))]
mod websocket;

pub use channel::{ChannelEvent, RealtimeChannel, HEARTBEAT_INTERVAL};
pub use error::NetworkError;
pub use message::{
    presence_channel, resource_channel, ActiveResource, ClientMessage, EventPayload, PresencePeer,
    PresenceStatus, RealtimeEvent, ServerMessage,
};
pub use mock::MockTransport;
pub use presence::{PresenceSignal, PresenceTracker};
pub use transport::{ConnectionState, Transport, TransportConfig, TransportResult};
pub use websocket::WebSocketTransport;
