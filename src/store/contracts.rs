// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Trait shapes for the engine's three external collaborators: the
//! persistent `Store`, the ratchet (`SessionCipher`/`SessionBuilder`),
//! and the push `Server`. None of these are implemented here — a real
//! client brings its own `Store` backed by its account database and its
//! own ratchet and HTTP client; the engine only calls through these
//! contracts.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{DeviceCiphertext, SessionAddress, UnprocessedItem};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum RatchetError {
    /// The ratchet encountered an identity key it has not seen before for
    /// this address; the caller must decide whether to accept it.
    #[error("unknown identity key for {address}")]
    UnknownIdentityKey {
        address: SessionAddress,
        identity_key: Vec<u8>,
    },
    #[error("ratchet error: {0}")]
    Other(String),
}

/// Result of a ratchet encrypt call: either a Signal ("Whisper") message
/// on an established session, or a pre-key message that also bootstraps
/// one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextKind {
    Whisper,
    PreKey,
}

#[derive(Debug, Clone)]
pub struct RatchetCiphertext {
    pub kind: CiphertextKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct PreKeyEntry {
    pub key_id: u32,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SignedPreKeyEntry {
    pub key_id: u32,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

/// One device's key material, as returned by `getKeysForNumber`.
#[derive(Debug, Clone)]
pub struct PreKeyBundle {
    pub device_id: u32,
    pub registration_id: u32,
    pub pre_key: Option<PreKeyEntry>,
    pub signed_pre_key: SignedPreKeyEntry,
}

#[derive(Debug, Clone)]
pub struct KeyFetchResult {
    pub identity_key: Vec<u8>,
    pub devices: Vec<PreKeyBundle>,
}

/// Whether the ratchet's message-key retention should be unlimited for
/// this session — set when the destination is the local number's own
/// other devices (self-sync), per §4.5/§4.7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherOptions {
    pub unlimited_message_keys: bool,
}

#[derive(Error, Debug)]
#[error("signaling key decrypt failed: {0}")]
pub struct SignalingKeyError(pub String);

/// Websocket-layer framing decrypt (AES-CBC + HMAC), external to the engine
/// per §4.5 — the engine only calls through it before protobuf `Envelope`
/// decode.
pub trait SignalingKeyCipher: Send + Sync {
    fn decrypt(&self, framed: &[u8]) -> Result<Vec<u8>, SignalingKeyError>;
}

/// Pre-key processing and encrypt/decrypt against a specific
/// `SessionAddress`. Grounded on the real `libsignal-client`
/// `SessionCipher`/`message_encrypt`/`message_decrypt` shape.
#[async_trait]
pub trait SessionCipher: Send + Sync {
    async fn encrypt(
        &self,
        address: &SessionAddress,
        plaintext: &[u8],
        options: CipherOptions,
    ) -> Result<RatchetCiphertext, RatchetError>;

    async fn decrypt_whisper_message(
        &self,
        address: &SessionAddress,
        ciphertext: &[u8],
        options: CipherOptions,
    ) -> Result<Vec<u8>, RatchetError>;

    async fn decrypt_pre_key_whisper_message(
        &self,
        address: &SessionAddress,
        ciphertext: &[u8],
        options: CipherOptions,
    ) -> Result<Vec<u8>, RatchetError>;

    async fn has_open_session(&self, address: &SessionAddress) -> Result<bool, RatchetError>;

    async fn close_open_session_for_device(
        &self,
        address: &SessionAddress,
    ) -> Result<(), RatchetError>;

    async fn delete_all_sessions_for_device(
        &self,
        address: &SessionAddress,
    ) -> Result<(), RatchetError>;
}

#[async_trait]
pub trait SessionBuilder: Send + Sync {
    async fn process_pre_key(
        &self,
        address: &SessionAddress,
        bundle: &PreKeyBundle,
        identity_key: &[u8],
    ) -> Result<(), RatchetError>;
}

/// Identity/session bookkeeping (§6 "Store contract").
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_device_ids(&self, number: &str) -> Result<Vec<u32>, StoreError>;
    async fn remove_session(&self, address: &SessionAddress) -> Result<(), StoreError>;
    async fn user_get_number(&self) -> Result<String, StoreError>;
    /// Registration id the session for `address` was bootstrapped with;
    /// carried in the `PreKeyBundle` at build time and persisted alongside
    /// the session record (§3 `DeviceCiphertext.destinationRegistrationId`).
    async fn get_registration_id(&self, address: &SessionAddress) -> Result<u32, StoreError>;
}

/// Durable unprocessed-envelope cache (§4.2, §6).
#[async_trait]
pub trait UnprocessedCacheStore: Send + Sync {
    async fn add_unprocessed(&self, item: &UnprocessedItem) -> Result<(), StoreError>;
    async fn update_unprocessed(&self, item: &UnprocessedItem) -> Result<(), StoreError>;
    async fn get_unprocessed(&self, id: &str) -> Result<Option<UnprocessedItem>, StoreError>;
    async fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, StoreError>;
    async fn count_unprocessed(&self) -> Result<usize, StoreError>;
    async fn remove_unprocessed(&self, id: &str) -> Result<(), StoreError>;
    async fn remove_all_unprocessed(&self) -> Result<(), StoreError>;
    /// Startup scan; see [`crate::storage::envelope_cache::Storage::queue_all_cached`].
    async fn queue_all_cached(&self) -> Result<Vec<UnprocessedItem>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub id: Vec<u8>,
    pub members: Vec<String>,
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn groups_get_group(&self, id: &[u8]) -> Result<Option<GroupRecord>, StoreError>;
    async fn groups_get_numbers(&self, id: &[u8]) -> Result<Vec<String>, StoreError>;
    async fn groups_create_new_group(
        &self,
        members: Vec<String>,
        id: &[u8],
    ) -> Result<(), StoreError>;
    async fn groups_update_numbers(&self, id: &[u8], members: Vec<String>)
        -> Result<(), StoreError>;
    async fn groups_remove_number(&self, id: &[u8], number: &str) -> Result<(), StoreError>;
    async fn groups_delete_group(&self, id: &[u8]) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str, default: Option<String>) -> Result<Option<String>, StoreError>;
    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// The full external Store contract; a concrete implementation only needs
/// to provide the four smaller traits above, composed here for engine
/// code that needs the whole thing as one `dyn`-safe object.
pub trait Store: SessionStore + UnprocessedCacheStore + GroupStore + PreferenceStore {}
impl<T: SessionStore + UnprocessedCacheStore + GroupStore + PreferenceStore> Store for T {}

#[derive(Error, Debug)]
pub enum SendMessagesError {
    /// HTTP 409: extra devices no longer registered, missing devices not
    /// yet known locally.
    #[error("extra/missing devices for {number}")]
    Conflict {
        number: String,
        extra_devices: Vec<u32>,
        missing_devices: Vec<u32>,
    },
    /// HTTP 410: devices whose session is stale and must be rebuilt.
    #[error("stale devices for {number}")]
    Gone {
        number: String,
        stale_devices: Vec<u32>,
    },
    /// HTTP 404.
    #[error("{number} is not a registered user")]
    NotFound { number: String },
    #[error("network error: {0}")]
    Network(#[from] crate::network::NetworkError),
}

/// The push service HTTP/WebSocket surface (§6 "Server contract").
#[async_trait]
pub trait Server: Send + Sync {
    async fn get_keys_for_number(
        &self,
        number: &str,
        device_id: Option<u32>,
    ) -> Result<KeyFetchResult, crate::network::NetworkError>;

    async fn send_messages(
        &self,
        number: &str,
        bundle: Vec<DeviceCiphertext>,
        timestamp: u64,
        silent: bool,
    ) -> Result<(), SendMessagesError>;

    async fn get_attachment(&self, id: u64) -> Result<Vec<u8>, crate::network::NetworkError>;

    /// Used purely as a connectivity probe by the socket supervisor.
    async fn get_devices(&self, number: &str) -> Result<Vec<u32>, crate::network::NetworkError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Minimal `Server` stub for socket-supervisor reconnect-probe tests.
    pub struct StubServer {
        devices_ok: bool,
    }

    impl StubServer {
        pub fn always_ok() -> Self {
            StubServer { devices_ok: true }
        }

        pub fn always_fails() -> Self {
            StubServer { devices_ok: false }
        }
    }

    #[async_trait]
    impl Server for StubServer {
        async fn get_keys_for_number(
            &self,
            _number: &str,
            _device_id: Option<u32>,
        ) -> Result<KeyFetchResult, crate::network::NetworkError> {
            unimplemented!("not exercised by socket supervisor tests")
        }

        async fn send_messages(
            &self,
            _number: &str,
            _bundle: Vec<DeviceCiphertext>,
            _timestamp: u64,
            _silent: bool,
        ) -> Result<(), SendMessagesError> {
            unimplemented!("not exercised by socket supervisor tests")
        }

        async fn get_attachment(
            &self,
            _id: u64,
        ) -> Result<Vec<u8>, crate::network::NetworkError> {
            unimplemented!("not exercised by socket supervisor tests")
        }

        async fn get_devices(
            &self,
            _number: &str,
        ) -> Result<Vec<u32>, crate::network::NetworkError> {
            if self.devices_ok {
                Ok(vec![1])
            } else {
                Err(crate::network::NetworkError::ConnectionFailed(
                    "probe failed".to_string(),
                ))
            }
        }
    }
}
