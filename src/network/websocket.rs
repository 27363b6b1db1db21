// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Production [`MessageSocket`] over `tokio-tungstenite` (§4.4, §6).
//!
//! Frames are split into a reader half, polled directly by
//! [`next_request`](MessageSocket::next_request), and a writer half owned
//! by a background task fed through an unbounded channel — `respond()`
//! and `send_keepalive()` enqueue onto that channel rather than taking a
//! `&mut` write lock, so a slow or stuck write never blocks the dispatcher
//! reading the next request.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::error::NetworkError;
use super::message::{WebSocketRequest, WireFrame};
use super::transport::{MessageSocket, TransportConfig, TransportResult};
use crate::model::SocketState;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketTransport {
    reader: Option<futures_util::stream::SplitStream<WsStream>>,
    writer_task: Option<JoinHandle<()>>,
    ack_tx: Option<mpsc::UnboundedSender<WireFrame>>,
    state: SocketState,
    close_code: Option<(u16, String)>,
    next_request_id: AtomicU64,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        WebSocketTransport::new()
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        WebSocketTransport {
            reader: None,
            writer_task: None,
            ack_tx: None,
            state: SocketState::Disconnected,
            close_code: None,
            next_request_id: AtomicU64::new(1),
        }
    }

    fn spawn_writer(
        mut sink: futures_util::stream::SplitSink<WsStream, Message>,
    ) -> mpsc::UnboundedSender<WireFrame> {
        let (tx, mut rx) = mpsc::unbounded_channel::<WireFrame>();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let Ok(text) = serde_json::to_string(&frame) else {
                    continue;
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });
        tx
    }
}

#[async_trait]
impl MessageSocket for WebSocketTransport {
    async fn connect(&mut self, config: &TransportConfig) -> TransportResult<()> {
        self.state = SocketState::Connecting;
        let (stream, _response) = connect_async(&config.server_url)
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        let (sink, reader) = stream.split();
        self.ack_tx = Some(Self::spawn_writer(sink));
        self.reader = Some(reader);
        self.close_code = None;
        self.state = SocketState::Open;
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> TransportResult<()> {
        self.state = SocketState::Closing;
        if let Some(ack_tx) = self.ack_tx.take() {
            drop(ack_tx);
        }
        if let Some(handle) = self.writer_task.take() {
            handle.abort();
        }
        self.reader = None;
        self.close_code = Some((code, reason.to_string()));
        self.state = SocketState::Closed;
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state
    }

    fn close_code(&self) -> Option<(u16, String)> {
        self.close_code.clone()
    }

    async fn next_request(&mut self) -> TransportResult<Option<WebSocketRequest>> {
        let (Some(reader), Some(ack_tx)) = (self.reader.as_mut(), self.ack_tx.as_ref()) else {
            return Err(NetworkError::NotConnected);
        };

        loop {
            let Some(msg) = reader.next().await else {
                self.state = SocketState::Closed;
                return Ok(None);
            };
            let msg = msg.map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;
            match msg {
                Message::Text(text) => {
                    let frame: WireFrame = serde_json::from_str(&text)
                        .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
                    match frame {
                        WireFrame::Request {
                            id,
                            verb,
                            path,
                            body,
                        } => {
                            return Ok(Some(WebSocketRequest {
                                id,
                                verb,
                                path,
                                body,
                                ack_tx: ack_tx.clone(),
                                responded: Arc::new(AtomicBool::new(false)),
                            }));
                        }
                        WireFrame::Response { .. } => continue,
                    }
                }
                Message::Close(frame) => {
                    let (code, reason) = close_frame_parts(frame);
                    self.close_code = Some((code, reason));
                    self.state = SocketState::Closed;
                    return Ok(None);
                }
                _ => continue,
            }
        }
    }

    async fn send_keepalive(&mut self) -> TransportResult<()> {
        let ack_tx = self.ack_tx.as_ref().ok_or(NetworkError::NotConnected)?;
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        ack_tx
            .send(WireFrame::Request {
                id,
                verb: "GET".to_string(),
                path: "/v1/keepalive".to_string(),
                body: Vec::new(),
            })
            .map_err(|_| NetworkError::ConnectionClosed)
    }
}

fn close_frame_parts(frame: Option<CloseFrame<'static>>) -> (u16, String) {
    match frame {
        Some(cf) => (cf.code.into(), cf.reason.to_string()),
        None => (1000, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_socket_starts_disconnected() {
        let transport = WebSocketTransport::new();
        assert_eq!(transport.state(), SocketState::Disconnected);
        assert!(transport.close_code().is_none());
    }
}
