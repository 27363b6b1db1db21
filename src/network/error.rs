// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timeout")]
    Timeout,

    #[error("socket already responded to request {0}")]
    AlreadyResponded(u64),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    #[error("transport not connected")]
    NotConnected,

    #[error("{0} is not a registered user")]
    NotFound(String),
}
