//! Transport Trait
//!
//! Platform-agnostic abstraction for the realtime connection.

use super::error::NetworkError;
use super::message::{ClientMessage, ServerMessage};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected to any server.
    #[default]
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready.
    Connected,
    /// Connection failed, will retry.
    Reconnecting { attempt: u32 },
}

/// Configuration for transport connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Realtime endpoint URL (`ws://` or `wss://`).
    pub server_url: String,
    /// Device bearer token presented at the handshake.
    pub bearer_token: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read/write timeout in milliseconds.
    pub io_timeout_ms: u64,
    /// Consecutive reconnect failures before falling back to pull-only sync.
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff (milliseconds).
    pub reconnect_base_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            server_url: String::new(),
            bearer_token: String::new(),
            connect_timeout_ms: 10_000,
            io_timeout_ms: 500,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1_000,
        }
    }
}

/// Transport trait for the realtime connection.
///
/// Abstracts the underlying mechanism (WebSocket in production, a scripted
/// mock in tests).
///
/// # Synchronous Interface
///
/// The methods block; `receive` returns `Ok(None)` on a quiet socket so a
/// host loop can pump it without stalling.
pub trait Transport: Send {
    /// Connects to the realtime endpoint.
    fn connect(&mut self, config: &TransportConfig) -> TransportResult<()>;

    /// Disconnects. Safe to call even if not connected.
    fn disconnect(&mut self) -> TransportResult<()>;

    /// Returns the current connection state.
    fn state(&self) -> ConnectionState;

    /// Sends a client message.
    fn send(&mut self, message: &ClientMessage) -> TransportResult<()>;

    /// Receives the next server message, or `None` when nothing is pending
    /// within the IO timeout.
    fn receive(&mut self) -> TransportResult<Option<ServerMessage>>;
}
