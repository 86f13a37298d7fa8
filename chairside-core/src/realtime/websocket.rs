// SPDX-FileCopyrightText: 2026 Chairside Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket Transport
//!
//! tungstenite-backed transport for the realtime endpoint. The wire
//! protocol is JSON text frames; the device bearer token is presented in
//! the handshake's Authorization header. Both native-tls and rustls
//! backends are supported through the feature split.

use std::net::TcpStream;
use std::time::Duration;

#[cfg(all(feature = "network-native-tls", not(feature = "network-rustls")))]
use native_tls::TlsConnector;

#[cfg(feature = "network-rustls")]
use rustls::pki_types::ServerName;
#[cfg(feature = "network-rustls")]
use std::sync::Arc;

use tungstenite::client::IntoClientRequest;
use tungstenite::http::header::AUTHORIZATION;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use super::error::NetworkError;
use super::message::{ClientMessage, ServerMessage};
use super::transport::{ConnectionState, Transport, TransportConfig, TransportResult};

/// Endpoint coordinates parsed out of a `ws://` / `wss://` URL.
struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    fn parse(url: &str) -> Result<Self, NetworkError> {
        let (rest, tls) = if let Some(rest) = url.strip_prefix("wss://") {
            (rest, true)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            (rest, false)
        } else {
            return Err(NetworkError::ConnectionFailed(
                "Invalid URL scheme (expected ws:// or wss://)".into(),
            ));
        };

        let authority = rest.split('/').next().unwrap_or(rest);
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    NetworkError::ConnectionFailed(format!("Invalid port: {}", port))
                })?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), if tls { 443 } else { 80 }),
        };

        Ok(Endpoint { host, port, tls })
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// WebSocket transport for the realtime endpoint.
pub struct WebSocketTransport {
    socket: Option<WebSocket<MaybeTlsStream<TcpStream>>>,
    config: TransportConfig,
    state: ConnectionState,
}

impl WebSocketTransport {
    pub fn new() -> Self {
        WebSocketTransport {
            socket: None,
            config: TransportConfig::default(),
            state: ConnectionState::Disconnected,
        }
    }

    fn failed<T>(&mut self, error: NetworkError) -> Result<T, NetworkError> {
        self.state = ConnectionState::Disconnected;
        Err(error)
    }

    fn open_stream(&mut self, endpoint: &Endpoint) -> TransportResult<MaybeTlsStream<TcpStream>> {
        let tcp = match TcpStream::connect(endpoint.addr()) {
            Ok(tcp) => tcp,
            Err(e) => return self.failed(NetworkError::ConnectionFailed(e.to_string())),
        };

        let io_timeout = Some(Duration::from_millis(self.config.io_timeout_ms));
        tcp.set_read_timeout(io_timeout)
            .and_then(|_| tcp.set_write_timeout(io_timeout))
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        if !endpoint.tls {
            return Ok(MaybeTlsStream::Plain(tcp));
        }

        match wrap_tls(&endpoint.host, tcp) {
            Ok(stream) => Ok(stream),
            Err(e) => self.failed(e),
        }
    }
}

#[cfg(all(feature = "network-native-tls", not(feature = "network-rustls")))]
fn wrap_tls(host: &str, tcp: TcpStream) -> Result<MaybeTlsStream<TcpStream>, NetworkError> {
    let connector = TlsConnector::new()
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS error: {}", e)))?;
    let stream = connector
        .connect(host, tcp)
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS handshake failed: {}", e)))?;
    Ok(MaybeTlsStream::NativeTls(stream))
}

#[cfg(feature = "network-rustls")]
fn wrap_tls(host: &str, tcp: TcpStream) -> Result<MaybeTlsStream<TcpStream>, NetworkError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name: ServerName<'_> = host
        .try_into()
        .map_err(|_| NetworkError::ConnectionFailed(format!("Invalid server name: {}", host)))?;

    let conn = rustls::ClientConnection::new(Arc::new(tls_config), server_name.to_owned())
        .map_err(|e| NetworkError::ConnectionFailed(format!("TLS setup failed: {}", e)))?;

    Ok(MaybeTlsStream::Rustls(rustls::StreamOwned::new(conn, tcp)))
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, config: &TransportConfig) -> TransportResult<()> {
        if matches!(self.state, ConnectionState::Connected) {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        self.config = config.clone();

        let endpoint = match Endpoint::parse(&config.server_url) {
            Ok(endpoint) => endpoint,
            Err(e) => return self.failed(e),
        };
        let stream = self.open_stream(&endpoint)?;

        let mut request = match config.server_url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                return self.failed(NetworkError::ConnectionFailed(format!(
                    "Invalid WebSocket request: {}",
                    e
                )))
            }
        };

        let bearer = match format!("Bearer {}", config.bearer_token).parse() {
            Ok(value) => value,
            Err(_) => {
                return self
                    .failed(NetworkError::AuthenticationFailed("Invalid bearer token".into()))
            }
        };
        request.headers_mut().insert(AUTHORIZATION, bearer);

        match tungstenite::client(request, stream) {
            Ok((socket, _response)) => {
                self.socket = Some(socket);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => self.failed(NetworkError::ConnectionFailed(format!(
                "WebSocket handshake failed: {}",
                e
            ))),
        }
    }

    fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut socket) = self.socket.take() {
            // A close error at teardown is irrelevant.
            let _ = socket.close(None);
        }
        self.state = ConnectionState::Disconnected;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state.clone()
    }

    fn send(&mut self, message: &ClientMessage) -> TransportResult<()> {
        let socket = self.socket.as_mut().ok_or(NetworkError::NotConnected)?;

        let text = serde_json::to_string(message)
            .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;

        if let Err(e) = socket.send(Message::Text(text)) {
            return match e {
                tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                    self.state = ConnectionState::Disconnected;
                    Err(NetworkError::ConnectionClosed)
                }
                other => Err(NetworkError::SendFailed(other.to_string())),
            };
        }

        socket
            .flush()
            .map_err(|e| NetworkError::SendFailed(format!("Flush failed: {}", e)))
    }

    fn receive(&mut self) -> TransportResult<Option<ServerMessage>> {
        let socket = self.socket.as_mut().ok_or(NetworkError::NotConnected)?;

        match socket.read() {
            Ok(Message::Text(text)) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| NetworkError::InvalidMessage(e.to_string())),
            Ok(Message::Ping(payload)) => {
                let _ = socket.send(Message::Pong(payload));
                Ok(None)
            }
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => Ok(None),
            Ok(Message::Close(_)) => {
                self.state = ConnectionState::Disconnected;
                Err(NetworkError::ConnectionClosed)
            }
            // The protocol is text-only.
            Ok(Message::Binary(_)) => Err(NetworkError::InvalidMessage(
                "Unexpected binary message".into(),
            )),
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                // Quiet socket within the IO timeout.
                Ok(None)
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                self.state = ConnectionState::Disconnected;
                Err(NetworkError::ConnectionClosed)
            }
            Err(e) => Err(NetworkError::ReceiveFailed(e.to_string())),
        }
    }
}

// INLINE_TEST_REQUIRED: Tests the private Endpoint parser for URL handling
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wss_defaults_to_443() {
        let endpoint = Endpoint::parse("wss://realtime.example.com").unwrap();
        assert_eq!(endpoint.host, "realtime.example.com");
        assert_eq!(endpoint.port, 443);
        assert!(endpoint.tls);
    }

    #[test]
    fn test_parse_ws_with_port() {
        let endpoint = Endpoint::parse("ws://localhost:8080").unwrap();
        assert_eq!(endpoint.host, "localhost");
        assert_eq!(endpoint.port, 8080);
        assert!(!endpoint.tls);
    }

    #[test]
    fn test_parse_strips_path() {
        let endpoint = Endpoint::parse("wss://realtime.example.com:9000/ws").unwrap();
        assert_eq!(endpoint.host, "realtime.example.com");
        assert_eq!(endpoint.port, 9000);
        assert_eq!(endpoint.addr(), "realtime.example.com:9000");
    }

    #[test]
    fn test_parse_rejects_http_scheme() {
        assert!(Endpoint::parse("http://example.com").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(Endpoint::parse("ws://example.com:notaport").is_err());
    }

    #[test]
    fn test_new_transport_disconnected() {
        let transport = WebSocketTransport::new();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_without_connect_fails() {
        let mut transport = WebSocketTransport::new();
        let result = transport.send(&ClientMessage::Heartbeat);
        assert!(matches!(result, Err(NetworkError::NotConnected)));
    }

    #[test]
    fn test_receive_without_connect_fails() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.receive(),
            Err(NetworkError::NotConnected)
        ));
    }

    #[test]
    fn test_disconnect_when_not_connected_ok() {
        let mut transport = WebSocketTransport::new();
        assert!(transport.disconnect().is_ok());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }
}
