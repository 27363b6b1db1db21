// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Engine-wide error taxonomy (§7).
//!
//! Per-component errors (`StorageError`, `NetworkError`) convert into
//! `EngineError` via `#[from]`, the same aggregation shape
//! `api::error::VauchiError` uses over `storage::StorageError` and
//! `network::error::NetworkError`.

use crate::model::SessionAddress;
use crate::network::NetworkError;
use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("outgoing message to {number} failed: {cause}")]
    OutgoingMessage {
        number: String,
        original_content: Vec<u8>,
        timestamp: u64,
        cause: String,
    },

    #[error("network error sending to {number}: {cause}")]
    SendMessageNetwork {
        number: String,
        json_bundle: String,
        cause: String,
        timestamp: u64,
    },

    #[error("identity key changed for {number} while sending")]
    OutgoingIdentityKey {
        number: String,
        original_content: Vec<u8>,
        timestamp: u64,
        identity_key: Vec<u8>,
    },

    #[error("identity key changed for {address} while receiving")]
    IncomingIdentityKey {
        address: SessionAddress,
        ciphertext: Vec<u8>,
        identity_key: Vec<u8>,
    },

    #[error("{number} is not a registered user: {cause}")]
    UnregisteredUser { number: String, cause: String },

    #[error("invalid padding")]
    InvalidPadding,

    #[error("unknown data message flags: {0:#x}")]
    UnknownFlags(u32),

    #[error("malformed envelope")]
    MalformedEnvelope,

    #[error("unsupported content")]
    UnsupportedContent,

    #[error("unknown message type")]
    UnknownMessageType,

    #[error("worker job {0} timed out")]
    WorkerTimeout(u64),

    #[error("ratchet error: {0}")]
    Ratchet(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
