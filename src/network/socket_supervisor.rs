// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! WebSocket lifecycle supervisor (§4.4).
//!
//! Generalizes `ConnectionManager`'s connect/reconnect bookkeeping (same
//! `base_delay * 2^min(attempt,6)` backoff shape) to the spec's close-code
//! semantics: code 3000 is a terminal user-close, 3001 means the server
//! drained the inbox and should not trigger a reconnect, and everything
//! else probes connectivity via `Server::get_devices` before deciding to
//! reconnect.

use std::time::Duration;

use tokio::sync::Notify;

use super::error::NetworkError;
use super::transport::{MessageSocket, TransportConfig, TransportResult};
use crate::model::close_code;
use crate::model::SocketState;
use crate::store::Server;

/// What the caller should do after a socket close was observed.
#[derive(Debug, PartialEq, Eq)]
pub enum CloseOutcome {
    /// User-initiated close (3000). Terminal.
    Terminal,
    /// Server-drained close (3001). Caller should invoke `on_empty` but
    /// must not reconnect.
    ServerDrained,
    /// Connectivity probe succeeded; caller should reconnect.
    Reconnect,
    /// Connectivity probe failed; caller should surface an `error` event.
    ProbeFailed(NetworkError),
}

pub struct SocketSupervisor<S: MessageSocket> {
    socket: Option<S>,
    config: TransportConfig,
    number: String,
    called_close: bool,
    has_connected: bool,
    reconnect_attempt: u32,
    /// Notified once the owning task chain has fully drained, so
    /// `close()` can wait on it before returning.
    drained: std::sync::Arc<Notify>,
}

impl<S: MessageSocket> SocketSupervisor<S> {
    pub fn new(socket: S, config: TransportConfig, number: impl Into<String>) -> Self {
        SocketSupervisor {
            socket: Some(socket),
            config,
            number: number.into(),
            called_close: false,
            has_connected: false,
            reconnect_attempt: 0,
            drained: std::sync::Arc::new(Notify::new()),
        }
    }

    pub fn state(&self) -> SocketState {
        self.socket
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(SocketState::Disconnected)
    }

    pub fn called_close(&self) -> bool {
        self.called_close
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// `connect()`: no-op once `close()` has been called. Closes any
    /// existing non-terminal socket before opening a new one.
    pub async fn connect(&mut self) -> TransportResult<bool> {
        if self.called_close {
            return Ok(false);
        }
        let is_reconnect = self.has_connected;
        if let Some(socket) = self.socket.as_mut() {
            if socket.state() != SocketState::Closed {
                socket.close(1000, "reconnecting").await?;
            }
            socket.connect(&self.config).await?;
            self.has_connected = true;
            self.reconnect_attempt = 0;
        }
        Ok(is_reconnect)
    }

    /// `onclose(code, reason)`.
    pub async fn handle_close(&mut self, code: u16, server: &dyn Server) -> CloseOutcome {
        if self.called_close {
            return CloseOutcome::Terminal;
        }
        match code {
            close_code::USER_CLOSE => CloseOutcome::Terminal,
            close_code::SERVER_DRAINED => CloseOutcome::ServerDrained,
            _ => match server.get_devices(&self.number).await {
                Ok(_) => {
                    self.reconnect_attempt += 1;
                    CloseOutcome::Reconnect
                }
                Err(e) => CloseOutcome::ProbeFailed(e),
            },
        }
    }

    /// Exponential backoff with a cap, `base_delay * 2^min(attempt,6)`, plus
    /// up to 10% jitter so a fleet of receivers reconnecting after the same
    /// outage doesn't all retry in lockstep.
    pub fn reconnect_delay(&self, base_delay: Duration) -> Duration {
        let exponent = self.reconnect_attempt.min(6);
        let capped = base_delay * 2u32.pow(exponent);
        let jitter_millis = (capped.as_millis() as u64 / 10).max(1);
        capped + Duration::from_millis(rand::random::<u64>() % jitter_millis)
    }

    /// `close(reason)`: sets `calledClose`, closes with code 3000, and
    /// returns a handle whose `wait()` resolves once the task chain has
    /// drained.
    pub async fn close(&mut self, reason: &str) -> TransportResult<std::sync::Arc<Notify>> {
        self.called_close = true;
        if let Some(socket) = self.socket.as_mut() {
            socket.close(close_code::USER_CLOSE, reason).await?;
        }
        Ok(self.drained.clone())
    }

    /// Signals that the owning task chain has drained; wakes any waiter
    /// on the handle returned by `close()`.
    pub fn notify_drained(&self) {
        self.drained.notify_waiters();
    }

    pub fn socket_mut(&mut self) -> Option<&mut S> {
        self.socket.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockTransport;
    use crate::store::StubServer;

    fn config() -> TransportConfig {
        TransportConfig::new("ws://localhost/v1/websocket")
    }

    #[tokio::test]
    async fn connect_then_connect_again_closes_prior_socket() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");

        let first = sup.connect().await.unwrap();
        assert!(!first);
        assert_eq!(sup.state(), SocketState::Open);

        let second = sup.connect().await.unwrap();
        assert!(second, "second connect() is a reconnect");
    }

    #[tokio::test]
    async fn close_is_terminal_and_connect_becomes_noop() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");
        sup.connect().await.unwrap();

        sup.close("called close").await.unwrap();
        assert!(sup.called_close());
        assert_eq!(sup.state(), SocketState::Closed);

        let reconnected = sup.connect().await.unwrap();
        assert!(!reconnected);
        assert_eq!(sup.state(), SocketState::Closed);
    }

    #[tokio::test]
    async fn user_close_code_is_terminal() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");
        sup.connect().await.unwrap();
        let server = StubServer::always_ok();
        let outcome = sup.handle_close(close_code::USER_CLOSE, &server).await;
        assert_eq!(outcome, CloseOutcome::Terminal);
    }

    #[tokio::test]
    async fn server_drained_code_does_not_reconnect() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");
        sup.connect().await.unwrap();
        let server = StubServer::always_ok();
        let outcome = sup.handle_close(close_code::SERVER_DRAINED, &server).await;
        assert_eq!(outcome, CloseOutcome::ServerDrained);
    }

    #[tokio::test]
    async fn other_close_code_probes_and_reconnects_on_success() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");
        sup.connect().await.unwrap();
        let server = StubServer::always_ok();
        let outcome = sup.handle_close(4000, &server).await;
        assert_eq!(outcome, CloseOutcome::Reconnect);
        assert_eq!(sup.reconnect_attempt(), 1);
    }

    #[test]
    fn backoff_caps_at_attempt_6() {
        let transport = MockTransport::new();
        let mut sup = SocketSupervisor::new(transport, config(), "+15550001111");
        sup.reconnect_attempt = 10;
        let delay = sup.reconnect_delay(Duration::from_millis(100));
        let capped = Duration::from_millis(100 * 64);
        assert!(delay >= capped);
        assert!(delay <= capped + Duration::from_millis(capped.as_millis() as u64 / 10));
    }
}
