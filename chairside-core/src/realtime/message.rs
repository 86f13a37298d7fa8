// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Realtime Wire Protocol
//!
//! JSON message types exchanged with the realtime endpoint. The sets are
//! closed: every inbound frame parses into a [`ServerMessage`] variant or
//! is rejected, and listeners register against variants, never strings.

use serde::{Deserialize, Serialize};

use crate::sync::entity::EntityKind;
use crate::sync::envelope::PatchEnvelope;

/// Presence status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    Busy,
}

/// The resource a user is currently viewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveResource {
    pub resource_type: String,
    pub resource_id: String,
}

/// A peer as seen through presence events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresencePeer {
    pub actor_id: String,
    pub status: PresenceStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_resource: Option<ActiveResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Messages the client emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe")]
    Subscribe { channels: Vec<String> },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { channels: Vec<String> },

    #[serde(rename = "presence:update")]
    PresenceUpdate {
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<PresenceStatus>,
        /// `null` clears the active resource.
        #[serde(rename = "activeResource")]
        active_resource: Option<ActiveResource>,
    },

    #[serde(rename = "presence:heartbeat")]
    Heartbeat,
}

/// A realtime event frame carrying an optional patch envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeEvent {
    pub event_id: String,
    pub event_type: String,
    pub tenant_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    pub payload: EventPayload,
    /// Unix milliseconds.
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchEnvelope>,
}

/// Messages the server emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "connection:established")]
    ConnectionEstablished {
        #[serde(default, rename = "sessionId")]
        session_id: Option<String>,
    },

    #[serde(rename = "subscribed")]
    Subscribed { channels: Vec<String> },

    #[serde(rename = "unsubscribed")]
    Unsubscribed { channels: Vec<String> },

    #[serde(rename = "realtime:event")]
    Event(RealtimeEvent),

    #[serde(rename = "presence:user_joined")]
    UserJoined(PresencePeer),

    #[serde(rename = "presence:user_left")]
    UserLeft {
        #[serde(rename = "actorId")]
        actor_id: String,
    },

    #[serde(rename = "presence:user_updated")]
    UserUpdated(PresencePeer),

    #[serde(rename = "pong")]
    Pong,
}

/// Channel address for a single resource: `resource:<type>:<id>`.
pub fn resource_channel(kind: EntityKind, resource_id: &str) -> String {
    format!("resource:{}:{}", kind.leaf_name(), resource_id)
}

/// Channel address for a presence scope.
pub fn presence_channel(scope: &str) -> String {
    format!("presence:{}", scope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_tags() {
        let msg = ClientMessage::Subscribe {
            channels: vec!["resource:patient:P1".into()],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"subscribe""#));

        let msg = ClientMessage::PresenceUpdate {
            status: Some(PresenceStatus::Busy),
            active_resource: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"presence:update""#));
        // Clearing the active resource is an explicit null on the wire.
        assert!(json.contains(r#""activeResource":null"#));
    }

    #[test]
    fn test_server_event_parses() {
        let json = r#"{
            "type": "realtime:event",
            "eventId": "e1",
            "eventType": "patient.updated",
            "tenantId": "t1",
            "organizationId": "o1",
            "payload": {},
            "timestamp": 1700000000000
        }"#;

        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        match msg {
            ServerMessage::Event(event) => {
                assert_eq!(event.event_type, "patient.updated");
                assert!(event.payload.patch.is_none());
            }
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn test_channel_addresses() {
        assert_eq!(
            resource_channel(EntityKind::Patient, "P1"),
            "resource:patient:P1"
        );
        assert_eq!(presence_channel("clinic-1"), "presence:clinic-1");
    }
}
