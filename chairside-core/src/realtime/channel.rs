// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Realtime Channel
//!
//! Long-lived connection to the realtime endpoint. Owns the transport,
//! the state machine Disconnected → Connecting → Connected →
//! (Reconnecting | Disconnected), the subscription set (preserved and
//! replayed across reconnects), the application-level heartbeat, and the
//! capped exponential reconnect backoff. After a bounded number of
//! consecutive failures the channel falls back to pull-only sync.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use rand::Rng;

use super::error::NetworkError;
use super::message::{
    ActiveResource, ClientMessage, PresenceStatus, ServerMessage,
};
use super::presence::PresenceSignal;
use super::transport::{ConnectionState, Transport, TransportConfig, TransportResult};
use crate::sync::envelope::PatchEnvelope;

/// Application-level heartbeat cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

/// A heartbeat with no pong inside this window counts as a disconnect.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Events surfaced to the orchestrator by [`RealtimeChannel::pump`].
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    SubscriptionsAcknowledged(Vec<String>),
    Patch(PatchEnvelope),
    Presence(PresenceSignal),
    /// Too many consecutive failures; the orchestrator continues pull-only.
    PullOnlyFallback,
}

/// Realtime channel over a pluggable transport.
pub struct RealtimeChannel<T: Transport> {
    transport: T,
    config: TransportConfig,
    /// Channels the caller wants; replayed on every (re)connect.
    requested: BTreeSet<String>,
    /// Channels the server has acknowledged.
    acknowledged: BTreeSet<String>,
    heartbeat_interval: Duration,
    last_heartbeat_at: Option<Instant>,
    awaiting_pong_since: Option<Instant>,
    reconnect_at: Option<Instant>,
    consecutive_failures: u32,
    pull_only: bool,
}

impl<T: Transport> RealtimeChannel<T> {
    pub fn new(transport: T, config: TransportConfig) -> Self {
        RealtimeChannel {
            transport,
            config,
            requested: BTreeSet::new(),
            acknowledged: BTreeSet::new(),
            heartbeat_interval: HEARTBEAT_INTERVAL,
            last_heartbeat_at: None,
            awaiting_pong_since: None,
            reconnect_at: None,
            consecutive_failures: 0,
            pull_only: false,
        }
    }

    /// Overrides the heartbeat cadence (hosts with stricter idle policies).
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the bearer token presented at the next (re)connect.
    pub fn set_bearer(&mut self, token: &str) {
        self.config.bearer_token = token.to_string();
    }

    /// Connects and replays the current subscription set.
    pub fn connect(&mut self) -> TransportResult<()> {
        self.transport.connect(&self.config)?;
        self.consecutive_failures = 0;
        self.reconnect_at = None;
        self.awaiting_pong_since = None;
        self.acknowledged.clear();

        if !self.requested.is_empty() {
            self.transport.send(&ClientMessage::Subscribe {
                channels: self.requested.iter().cloned().collect(),
            })?;
        }

        Ok(())
    }

    /// Disconnects; the subscription set is kept for the next connect.
    pub fn disconnect(&mut self) -> TransportResult<()> {
        self.acknowledged.clear();
        self.awaiting_pong_since = None;
        self.transport.disconnect()
    }

    pub fn state(&self) -> ConnectionState {
        if let Some(at) = self.reconnect_at {
            if self.transport.state() != ConnectionState::Connected && at > Instant::now() {
                return ConnectionState::Reconnecting {
                    attempt: self.consecutive_failures,
                };
            }
        }
        self.transport.state()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.state() == ConnectionState::Connected
    }

    /// Whether the channel has given up and sync should stay pull-only.
    pub fn is_pull_only(&self) -> bool {
        self.pull_only
    }

    /// Clears the pull-only fallback (e.g. when connectivity returns).
    pub fn reset_pull_only(&mut self) {
        self.pull_only = false;
        self.consecutive_failures = 0;
        self.reconnect_at = None;
    }

    /// Channels acknowledged by the server.
    pub fn acknowledged_channels(&self) -> Vec<String> {
        self.acknowledged.iter().cloned().collect()
    }

    /// Adds channels to the subscription set, sending when connected.
    pub fn subscribe(&mut self, channels: &[String]) -> TransportResult<()> {
        for channel in channels {
            self.requested.insert(channel.clone());
        }
        if self.is_connected() {
            self.transport.send(&ClientMessage::Subscribe {
                channels: channels.to_vec(),
            })?;
        }
        Ok(())
    }

    /// Removes channels from the subscription set, sending when connected.
    pub fn unsubscribe(&mut self, channels: &[String]) -> TransportResult<()> {
        for channel in channels {
            self.requested.remove(channel);
            self.acknowledged.remove(channel);
        }
        if self.is_connected() {
            self.transport.send(&ClientMessage::Unsubscribe {
                channels: channels.to_vec(),
            })?;
        }
        Ok(())
    }

    /// Sends a presence update.
    pub fn update_presence(
        &mut self,
        status: Option<PresenceStatus>,
        active_resource: Option<ActiveResource>,
    ) -> TransportResult<()> {
        self.transport.send(&ClientMessage::PresenceUpdate {
            status,
            active_resource,
        })
    }

    /// Drives the channel: heartbeats, pong deadlines, reconnects, and
    /// inbound frames. Returns the events produced by this pass.
    pub fn pump(&mut self) -> Vec<ChannelEvent> {
        let mut events = Vec::new();

        if self.pull_only {
            return events;
        }

        if !self.is_connected() {
            self.try_reconnect(&mut events);
            return events;
        }

        self.heartbeat(&mut events);
        if !self.is_connected() {
            // The pong deadline tore the connection down.
            return events;
        }

        loop {
            match self.transport.receive() {
                Ok(Some(message)) => self.handle_message(message, &mut events),
                Ok(None) => break,
                Err(NetworkError::ConnectionClosed) | Err(NetworkError::NotConnected) => {
                    self.handle_drop(&mut events);
                    break;
                }
                Err(e) => {
                    log::warn!("realtime receive error: {}", e);
                    break;
                }
            }
        }

        events
    }

    fn heartbeat(&mut self, events: &mut Vec<ChannelEvent>) {
        if let Some(since) = self.awaiting_pong_since {
            if since.elapsed() > PONG_TIMEOUT {
                // Missed pong: treat as disconnect.
                log::debug!("realtime pong overdue; dropping connection");
                let _ = self.transport.disconnect();
                self.handle_drop(events);
                return;
            }
        }

        let due = match self.last_heartbeat_at {
            Some(at) => at.elapsed() >= self.heartbeat_interval,
            None => true,
        };
        if due {
            match self.transport.send(&ClientMessage::Heartbeat) {
                Ok(()) => {
                    self.last_heartbeat_at = Some(Instant::now());
                    if self.awaiting_pong_since.is_none() {
                        self.awaiting_pong_since = Some(Instant::now());
                    }
                }
                Err(NetworkError::ConnectionClosed) | Err(NetworkError::NotConnected) => {
                    self.handle_drop(events);
                }
                Err(e) => log::warn!("heartbeat send failed: {}", e),
            }
        }
    }

    fn handle_message(&mut self, message: ServerMessage, events: &mut Vec<ChannelEvent>) {
        match message {
            ServerMessage::ConnectionEstablished { .. } => {
                events.push(ChannelEvent::Connected);
            }
            ServerMessage::Subscribed { channels } => {
                for channel in &channels {
                    self.acknowledged.insert(channel.clone());
                }
                events.push(ChannelEvent::SubscriptionsAcknowledged(channels));
            }
            ServerMessage::Unsubscribed { channels } => {
                for channel in &channels {
                    self.acknowledged.remove(channel);
                }
            }
            ServerMessage::Event(event) => {
                if let Some(patch) = event.payload.patch {
                    events.push(ChannelEvent::Patch(patch));
                }
            }
            ServerMessage::UserJoined(peer) => {
                events.push(ChannelEvent::Presence(PresenceSignal::Joined(peer)));
            }
            ServerMessage::UserLeft { actor_id } => {
                events.push(ChannelEvent::Presence(PresenceSignal::Left { actor_id }));
            }
            ServerMessage::UserUpdated(peer) => {
                events.push(ChannelEvent::Presence(PresenceSignal::Updated(peer)));
            }
            ServerMessage::Pong => {
                self.awaiting_pong_since = None;
            }
        }
    }

    fn handle_drop(&mut self, events: &mut Vec<ChannelEvent>) {
        self.acknowledged.clear();
        self.awaiting_pong_since = None;
        self.consecutive_failures += 1;
        events.push(ChannelEvent::Disconnected);

        if self.consecutive_failures > self.config.max_reconnect_attempts {
            self.pull_only = true;
            events.push(ChannelEvent::PullOnlyFallback);
            log::warn!(
                "realtime channel giving up after {} failures; pull-only sync",
                self.consecutive_failures
            );
        } else {
            self.reconnect_at = Some(Instant::now() + self.backoff_delay());
        }
    }

    fn try_reconnect(&mut self, events: &mut Vec<ChannelEvent>) {
        let due = match self.reconnect_at {
            Some(at) => at <= Instant::now(),
            // No schedule (e.g. never connected): attempt immediately.
            None => true,
        };
        if !due {
            return;
        }

        let _ = self.transport.disconnect();
        match self.connect() {
            Ok(()) => {
                log::debug!("realtime channel reconnected");
                events.push(ChannelEvent::Connected);
            }
            Err(e) => {
                log::debug!("realtime reconnect failed: {}", e);
                self.consecutive_failures += 1;
                if self.consecutive_failures > self.config.max_reconnect_attempts {
                    self.pull_only = true;
                    events.push(ChannelEvent::PullOnlyFallback);
                } else {
                    self.reconnect_at = Some(Instant::now() + self.backoff_delay());
                }
            }
        }
    }

    /// Exponential backoff with jitter, capped at 2^6 base delays.
    fn backoff_delay(&self) -> Duration {
        let exp = self.consecutive_failures.min(6);
        let base = self.config.reconnect_base_delay_ms * (1 << exp);
        let jitter = rand::thread_rng().gen_range(0..=(base / 5).max(1));
        Duration::from_millis(base + jitter)
    }

    /// Returns a reference to the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns a mutable reference to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
