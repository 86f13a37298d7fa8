//! Realtime transport error types.

use thiserror::Error;

/// Network error types.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Maximum reconnection attempts exceeded")]
    MaxRetriesExceeded,
}
