// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock [`MessageSocket`] for tests — allows injecting inbound requests
//! and inspecting what the engine responded, without a real server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::error::NetworkError;
use super::message::{WebSocketRequest, WireFrame};
use super::transport::{MessageSocket, TransportConfig, TransportResult};
use crate::model::SocketState;

pub struct MockTransport {
    state: SocketState,
    close_code: Option<(u16, String)>,
    inbound: VecDeque<(String, String, Vec<u8>)>,
    ack_tx: mpsc::UnboundedSender<WireFrame>,
    ack_rx: mpsc::UnboundedReceiver<WireFrame>,
    next_id: AtomicU64,
    inject_error: Option<NetworkError>,
}

impl Default for MockTransport {
    fn default() -> Self {
        MockTransport::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        MockTransport {
            state: SocketState::Disconnected,
            close_code: None,
            inbound: VecDeque::new(),
            ack_tx,
            ack_rx,
            next_id: AtomicU64::new(1),
            inject_error: None,
        }
    }

    /// Queues a request the engine will see on its next `next_request()`.
    pub fn queue_request(&mut self, verb: &str, path: &str, body: Vec<u8>) {
        self.inbound
            .push_back((verb.to_string(), path.to_string(), body));
    }

    pub fn inject_error(&mut self, error: NetworkError) {
        self.inject_error = Some(error);
    }

    /// Drains responses the engine has sent back (e.g. `respond(200, ...)`).
    pub fn drain_responses(&mut self) -> Vec<WireFrame> {
        let mut out = Vec::new();
        while let Ok(frame) = self.ack_rx.try_recv() {
            out.push(frame);
        }
        out
    }
}

#[async_trait]
impl MessageSocket for MockTransport {
    async fn connect(&mut self, _config: &TransportConfig) -> TransportResult<()> {
        if let Some(err) = self.inject_error.take() {
            return Err(err);
        }
        self.state = SocketState::Open;
        self.close_code = None;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        self.state = SocketState::Closed;
        self.close_code = Some((code, reason.to_string()));
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn close_code(&self) -> Option<(u16, String)> {
        self.close_code.clone()
    }

    async fn next_request(&mut self) -> TransportResult<Option<WebSocketRequest>> {
        if let Some(err) = self.inject_error.take() {
            return Err(err);
        }
        if self.state != SocketState::Open {
            return Err(NetworkError::NotConnected);
        }
        let Some((verb, path, body)) = self.inbound.pop_front() else {
            return Ok(None);
        };
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Some(WebSocketRequest {
            id,
            verb,
            path,
            body,
            ack_tx: self.ack_tx.clone(),
            responded: Arc::new(AtomicBool::new(false)),
        }))
    }

    async fn send_keepalive(&mut self) -> TransportResult<()> {
        if self.state != SocketState::Open {
            return Err(NetworkError::NotConnected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_request_is_observed_and_respond_is_recorded() {
        let mut transport = MockTransport::new();
        transport.connect(&TransportConfig::default()).await.unwrap();
        transport.queue_request("PUT", "/api/v1/message", vec![1, 2, 3]);

        let req = transport.next_request().await.unwrap().unwrap();
        assert_eq!(req.path, "/api/v1/message");
        req.respond(200, "OK").unwrap();

        let responses = transport.drain_responses();
        assert_eq!(responses.len(), 1);
        match &responses[0] {
            WireFrame::Response { status, .. } => assert_eq!(*status, 200),
            _ => panic!("expected response frame"),
        }
    }

    #[tokio::test]
    async fn respond_twice_is_rejected() {
        let mut transport = MockTransport::new();
        transport.connect(&TransportConfig::default()).await.unwrap();
        transport.queue_request("PUT", "/api/v1/message", vec![]);
        let req = transport.next_request().await.unwrap().unwrap();
        req.respond(200, "OK").unwrap();
        assert!(req.respond(200, "OK").is_err());
    }
}
