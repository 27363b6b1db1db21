// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Framed push-service requests (§6 "Server contract": `getMessageSocket()`).
//!
//! A `WebSocketRequest` pairs an inbound `verb`/`path`/`body` frame with a
//! single-use `respond(status, reason)` capability, mirroring the way
//! [`crate::events`] attaches a `confirm()` capability to dispatched events:
//! the socket hands out the request, the dispatcher decides the response.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use super::error::NetworkError;

/// On-the-wire shape of one socket frame. The real Signal push protocol
/// frames this as a protobuf `WebSocketMessage`; protobuf schemas are out
/// of scope here (see `SPEC_FULL.md` §A), so frames are plain JSON text
/// messages carrying the same fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireFrame {
    Request {
        id: u64,
        verb: String,
        path: String,
        #[serde(with = "base64_body")]
        body: Vec<u8>,
    },
    Response {
        id: u64,
        status: u16,
        message: String,
    },
}

mod base64_body {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// A server-pushed request awaiting exactly one `respond()` call.
#[derive(Debug)]
pub struct WebSocketRequest {
    pub id: u64,
    pub verb: String,
    pub path: String,
    pub body: Vec<u8>,
    pub(crate) ack_tx: mpsc::UnboundedSender<WireFrame>,
    pub(crate) responded: Arc<AtomicBool>,
}

impl WebSocketRequest {
    /// Responds exactly once. A second call returns
    /// [`NetworkError::AlreadyResponded`].
    pub fn respond(&self, status: u16, reason: &str) -> Result<(), NetworkError> {
        if self.responded.swap(true, Ordering::SeqCst) {
            return Err(NetworkError::AlreadyResponded(self.id));
        }
        self.ack_tx
            .send(WireFrame::Response {
                id: self.id,
                status,
                message: reason.to_string(),
            })
            .map_err(|_| NetworkError::ConnectionClosed)
    }
}
