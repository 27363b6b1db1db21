// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Async message-socket contract to the push service (§6 "Server contract").

use async_trait::async_trait;

use super::error::NetworkError;
use super::message::WebSocketRequest;
use crate::model::SocketState;

pub type TransportResult<T> = Result<T, NetworkError>;

/// Connection parameters for a [`MessageSocket`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub server_url: String,
    pub connect_timeout_ms: u64,
    /// Path used for keepalive pings; `disconnect=true` is appended so a
    /// missed keepalive forces the server to close the socket.
    pub keepalive_path: String,
    pub keepalive_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            server_url: String::new(),
            connect_timeout_ms: 10_000,
            keepalive_path: "/v1/keepalive".to_string(),
            keepalive_interval_ms: 30_000,
        }
    }
}

impl TransportConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        TransportConfig {
            server_url: server_url.into(),
            ..Default::default()
        }
    }
}

/// A long-lived push-service socket (spec §4.4, §6). Implementors frame
/// inbound pushes as [`WebSocketRequest`]s and accept outbound keepalive
/// pings; the teacher's synchronous `Transport` trait shape
/// (connect/send/receive/state) is kept but made `async fn` to fit the
/// engine's cooperative event loop.
#[async_trait]
pub trait MessageSocket: Send {
    /// Opens the socket. Does not return until the handshake completes.
    async fn connect(&mut self, config: &TransportConfig) -> TransportResult<()>;

    /// Closes with the given WebSocket close code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()>;

    fn state(&self) -> SocketState;

    /// The close code and reason observed when the socket transitioned to
    /// `Closed`, if any — used by the socket supervisor to distinguish
    /// close codes 3000/3001 from transient failures.
    fn close_code(&self) -> Option<(u16, String)>;

    /// Awaits the next server-pushed request, or `Ok(None)` once the
    /// socket has closed with no more frames pending.
    async fn next_request(&mut self) -> TransportResult<Option<WebSocketRequest>>;

    async fn send_keepalive(&mut self) -> TransportResult<()>;
}
