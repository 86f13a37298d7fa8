// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Transport
//!
//! Scriptable in-memory transport for channel and orchestrator tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::error::NetworkError;
use super::message::{ClientMessage, ServerMessage};
use super::transport::{ConnectionState, Transport, TransportConfig, TransportResult};

#[derive(Default)]
struct MockInner {
    state: ConnectionState,
    sent: Vec<ClientMessage>,
    inbox: VecDeque<ServerMessage>,
    fail_next_connect: bool,
    connect_count: u32,
}

/// In-memory transport; shares its script/state through clones.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a server message for the next `receive` calls.
    pub fn queue_receive(&self, message: ServerMessage) {
        self.inner.lock().unwrap().inbox.push_back(message);
    }

    /// All client messages sent so far.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Overrides the connection state (to simulate drops).
    pub fn set_state(&self, state: ConnectionState) {
        self.inner.lock().unwrap().state = state;
    }

    /// Makes the next connect attempt fail.
    pub fn fail_next_connect(&self) {
        self.inner.lock().unwrap().fail_next_connect = true;
    }

    /// How many times connect succeeded.
    pub fn connect_count(&self) -> u32 {
        self.inner.lock().unwrap().connect_count
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _config: &TransportConfig) -> TransportResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_next_connect {
            inner.fail_next_connect = false;
            inner.state = ConnectionState::Disconnected;
            return Err(NetworkError::ConnectionFailed("scripted failure".into()));
        }
        inner.state = ConnectionState::Connected;
        inner.connect_count += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> TransportResult<()> {
        self.inner.lock().unwrap().state = ConnectionState::Disconnected;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state.clone()
    }

    fn send(&mut self, message: &ClientMessage) -> TransportResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }
        inner.sent.push(message.clone());
        Ok(())
    }

    fn receive(&mut self) -> TransportResult<Option<ServerMessage>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Connected {
            return Err(NetworkError::NotConnected);
        }
        Ok(inner.inbox.pop_front())
    }
}
