// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! `sendToNumber` / `doSendMessage` (§4.7): per-number multi-device
//! fan-out, key-fetch-and-build on stale/unknown devices, and the bounded
//! 409/410 recovery loop.

use base64::Engine;
use futures_util::future::join_all;
use std::sync::Arc;

use crate::codec::pad;
use crate::error::{EngineError, EngineResult};
use crate::model::{Content, DataMessage, DeviceCiphertext, SessionAddress};
use crate::send::batch::SendOutcome;
use crate::store::{
    CipherOptions, PreKeyBundle, RatchetError, SendMessagesError, Server, SessionBuilder,
    SessionCipher, Store,
};

/// Signal wire ciphertext type tags (`libsignal-protocol`'s
/// `CiphertextMessageType`), used verbatim in the outgoing JSON bundle.
const WHISPER_CIPHERTEXT_TYPE: u8 = 1;
const PREKEY_CIPHERTEXT_TYPE: u8 = 3;

/// Bootstrap device id assumed for a number the Store has never seen.
const BOOTSTRAP_DEVICE_ID: u32 = 1;

pub struct SendEngine {
    store: Arc<dyn Store>,
    cipher: Arc<dyn SessionCipher>,
    builder: Arc<dyn SessionBuilder>,
    server: Arc<dyn Server>,
    local_number: String,
}

impl SendEngine {
    pub fn new(
        store: Arc<dyn Store>,
        cipher: Arc<dyn SessionCipher>,
        builder: Arc<dyn SessionBuilder>,
        server: Arc<dyn Server>,
        local_number: impl Into<String>,
    ) -> Self {
        SendEngine {
            store,
            cipher,
            builder,
            server,
            local_number: local_number.into(),
        }
    }

    /// `DataMessage` → `Content` → pad → fan out to every number, each
    /// independently recovering from 409/410/404. Every number reports in
    /// exactly once; the aggregate fires only once every number has.
    pub async fn send(
        &self,
        numbers: Vec<String>,
        message: DataMessage,
        timestamp: u64,
        silent: bool,
    ) -> SendOutcome {
        let content = Content {
            data_message: Some(message),
            ..Content::default()
        };
        let plaintext = bincode::serialize(&content).expect("Content always serializes");
        let padded = pad(&plaintext);

        let results = join_all(
            numbers
                .iter()
                .map(|number| self.send_to_number(number, timestamp, &padded, silent)),
        )
        .await;

        let mut successful_numbers = Vec::new();
        let mut errors = Vec::new();
        for (number, result) in numbers.into_iter().zip(results) {
            match result {
                Ok(()) => successful_numbers.push(number),
                Err(e) => errors.push(e),
            }
        }
        SendOutcome {
            successful_numbers,
            errors,
        }
    }

    async fn send_to_number(
        &self,
        number: &str,
        timestamp: u64,
        content: &[u8],
        silent: bool,
    ) -> EngineResult<()> {
        let update_devices = self.get_stale_device_ids_for_number(number).await?;
        if !update_devices.is_empty() {
            self.get_keys_for_number(number, Some(update_devices), timestamp, content)
                .await?;
        }
        self.do_send_message(number, timestamp, content, silent, true)
            .await
    }

    /// `getStaleDeviceIdsForNumber`: devices lacking an open session, or
    /// `[1]` when the Store has never heard of this number (bootstrap).
    async fn get_stale_device_ids_for_number(&self, number: &str) -> EngineResult<Vec<u32>> {
        let device_ids = self.store.get_device_ids(number).await?;
        if device_ids.is_empty() {
            return Ok(vec![BOOTSTRAP_DEVICE_ID]);
        }

        let mut update_devices = Vec::new();
        for device_id in device_ids {
            let address = SessionAddress::new(number, device_id);
            let has_session = self
                .cipher
                .has_open_session(&address)
                .await
                .map_err(ratchet_to_engine_error)?;
            if !has_session {
                update_devices.push(device_id);
            }
        }
        Ok(update_devices)
    }

    /// `getKeysForNumber`: `None` fetches and processes every device for a
    /// full refresh; `Some(devices)` fetches each listed device serially,
    /// reconciling 404s against the Store as it goes.
    async fn get_keys_for_number(
        &self,
        number: &str,
        update_devices: Option<Vec<u32>>,
        timestamp: u64,
        content: &[u8],
    ) -> EngineResult<()> {
        match update_devices {
            None => {
                let fetched = self.server.get_keys_for_number(number, None).await;
                match fetched {
                    Ok(result) => {
                        for bundle in &result.devices {
                            self.process_pre_key_bundle(
                                number,
                                bundle,
                                &result.identity_key,
                                timestamp,
                                content,
                            )
                            .await?;
                        }
                        Ok(())
                    }
                    Err(crate::network::NetworkError::NotFound(cause)) => {
                        Err(EngineError::UnregisteredUser {
                            number: number.to_string(),
                            cause,
                        })
                    }
                    Err(e) => Err(EngineError::Network(e)),
                }
            }
            Some(devices) => {
                for device_id in devices {
                    let fetched = self
                        .server
                        .get_keys_for_number(number, Some(device_id))
                        .await;
                    match fetched {
                        Ok(result) => {
                            for bundle in &result.devices {
                                self.process_pre_key_bundle(
                                    number,
                                    bundle,
                                    &result.identity_key,
                                    timestamp,
                                    content,
                                )
                                .await?;
                            }
                        }
                        Err(crate::network::NetworkError::NotFound(cause)) => {
                            if device_id == BOOTSTRAP_DEVICE_ID {
                                return Err(EngineError::UnregisteredUser {
                                    number: number.to_string(),
                                    cause,
                                });
                            }
                            let address = SessionAddress::new(number, device_id);
                            let _ = self.store.remove_session(&address).await;
                        }
                        Err(e) => return Err(EngineError::Network(e)),
                    }
                }
                Ok(())
            }
        }
    }

    async fn process_pre_key_bundle(
        &self,
        number: &str,
        bundle: &PreKeyBundle,
        identity_key: &[u8],
        timestamp: u64,
        content: &[u8],
    ) -> EngineResult<()> {
        let address = SessionAddress::new(number, bundle.device_id);
        match self
            .builder
            .process_pre_key(&address, bundle, identity_key)
            .await
        {
            Ok(()) => Ok(()),
            Err(RatchetError::UnknownIdentityKey { identity_key, .. }) => {
                Err(EngineError::OutgoingIdentityKey {
                    number: number.to_string(),
                    original_content: content.to_vec(),
                    timestamp,
                    identity_key,
                })
            }
            Err(RatchetError::Other(message)) => Err(EngineError::Ratchet(message)),
        }
    }

    /// `reloadDevicesAndSend` / `doSendMessage`: load the current device
    /// roster, encrypt once per device (concurrently; §5 "unordered"),
    /// POST the batch, and recover from 409/410 per the asymmetric
    /// recursion rule in §9 — preserved exactly rather than simplified.
    async fn do_send_message(
        &self,
        number: &str,
        timestamp: u64,
        content: &[u8],
        silent: bool,
        mut recurse: bool,
    ) -> EngineResult<()> {
        loop {
            let device_ids = self.store.get_device_ids(number).await?;
            if device_ids.is_empty() {
                return Err(EngineError::OutgoingMessage {
                    number: number.to_string(),
                    original_content: content.to_vec(),
                    timestamp,
                    cause: "empty device list".to_string(),
                });
            }

            let encrypted = join_all(
                device_ids
                    .iter()
                    .map(|&device_id| self.encrypt_for_device(number, device_id, content, timestamp)),
            )
            .await;

            let mut bundle = Vec::with_capacity(encrypted.len());
            for device_ciphertext in encrypted {
                bundle.push(device_ciphertext?);
            }

            match self
                .server
                .send_messages(number, bundle, timestamp, silent)
                .await
            {
                Ok(()) => return Ok(()),
                Err(SendMessagesError::Conflict {
                    extra_devices,
                    missing_devices,
                    ..
                }) => {
                    if !recurse {
                        return Err(EngineError::OutgoingMessage {
                            number: number.to_string(),
                            original_content: content.to_vec(),
                            timestamp,
                            cause: "Hit retry limit".to_string(),
                        });
                    }
                    for device_id in &extra_devices {
                        let address = SessionAddress::new(number, *device_id);
                        let _ = self.store.remove_session(&address).await;
                    }
                    if !missing_devices.is_empty() {
                        self.get_keys_for_number(
                            number,
                            Some(missing_devices),
                            timestamp,
                            content,
                        )
                        .await?;
                    }
                    recurse = true;
                }
                Err(SendMessagesError::Gone { stale_devices, .. }) => {
                    if !recurse {
                        return Err(EngineError::OutgoingMessage {
                            number: number.to_string(),
                            original_content: content.to_vec(),
                            timestamp,
                            cause: "Hit retry limit".to_string(),
                        });
                    }
                    for device_id in &stale_devices {
                        let address = SessionAddress::new(number, *device_id);
                        let _ = self.cipher.close_open_session_for_device(&address).await;
                    }
                    self.get_keys_for_number(number, Some(stale_devices), timestamp, content)
                        .await?;
                    recurse = false;
                }
                Err(SendMessagesError::NotFound { .. }) => {
                    return Err(EngineError::UnregisteredUser {
                        number: number.to_string(),
                        cause: "404 from send".to_string(),
                    });
                }
                Err(SendMessagesError::Network(cause)) => {
                    return Err(EngineError::SendMessageNetwork {
                        number: number.to_string(),
                        json_bundle: String::new(),
                        cause: cause.to_string(),
                        timestamp,
                    });
                }
            }
        }
    }

    async fn encrypt_for_device(
        &self,
        number: &str,
        device_id: u32,
        content: &[u8],
        timestamp: u64,
    ) -> EngineResult<DeviceCiphertext> {
        let address = SessionAddress::new(number, device_id);
        let options = CipherOptions {
            unlimited_message_keys: number == self.local_number,
        };

        let ciphertext = match self.cipher.encrypt(&address, content, options).await {
            Ok(c) => c,
            Err(RatchetError::UnknownIdentityKey { identity_key, .. }) => {
                return Err(EngineError::OutgoingIdentityKey {
                    number: number.to_string(),
                    original_content: content.to_vec(),
                    timestamp,
                    identity_key,
                })
            }
            Err(RatchetError::Other(message)) => return Err(EngineError::Ratchet(message)),
        };

        let registration_id = self.store.get_registration_id(&address).await?;
        let ciphertext_type = match ciphertext.kind {
            crate::store::CiphertextKind::Whisper => WHISPER_CIPHERTEXT_TYPE,
            crate::store::CiphertextKind::PreKey => PREKEY_CIPHERTEXT_TYPE,
        };

        Ok(DeviceCiphertext {
            ciphertext_type,
            destination_device_id: device_id,
            destination_registration_id: registration_id,
            content: base64::engine::general_purpose::STANDARD.encode(ciphertext.bytes),
        })
    }
}

fn ratchet_to_engine_error(e: RatchetError) -> EngineError {
    match e {
        RatchetError::UnknownIdentityKey { address, identity_key } => {
            EngineError::OutgoingIdentityKey {
                number: address.number,
                original_content: Vec::new(),
                timestamp: 0,
                identity_key,
            }
        }
        RatchetError::Other(message) => EngineError::Ratchet(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UnprocessedItem;
    use crate::network::NetworkError;
    use crate::store::{
        CiphertextKind, GroupRecord, KeyFetchResult, RatchetCiphertext, SignedPreKeyEntry,
        StoreError, UnprocessedCacheStore,
    };
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct StubStore {
        devices: StdMutex<std::collections::HashMap<String, Vec<u32>>>,
        registration_ids: StdMutex<std::collections::HashMap<(String, u32), u32>>,
        removed_sessions: StdMutex<Vec<SessionAddress>>,
    }

    #[async_trait]
    impl crate::store::SessionStore for StubStore {
        async fn get_device_ids(&self, number: &str) -> Result<Vec<u32>, StoreError> {
            Ok(self
                .devices
                .lock()
                .unwrap()
                .get(number)
                .cloned()
                .unwrap_or_default())
        }
        async fn remove_session(&self, address: &SessionAddress) -> Result<(), StoreError> {
            self.removed_sessions.lock().unwrap().push(address.clone());
            if let Some(devices) = self.devices.lock().unwrap().get_mut(&address.number) {
                devices.retain(|d| *d != address.device_id);
            }
            Ok(())
        }
        async fn user_get_number(&self) -> Result<String, StoreError> {
            Ok("+15550000000".to_string())
        }
        async fn get_registration_id(&self, address: &SessionAddress) -> Result<u32, StoreError> {
            Ok(self
                .registration_ids
                .lock()
                .unwrap()
                .get(&(address.number.clone(), address.device_id))
                .copied()
                .unwrap_or(42))
        }
    }

    #[async_trait]
    impl UnprocessedCacheStore for StubStore {
        async fn add_unprocessed(&self, _item: &UnprocessedItem) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn update_unprocessed(&self, _item: &UnprocessedItem) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn get_unprocessed(&self, _id: &str) -> Result<Option<UnprocessedItem>, StoreError> {
            unimplemented!()
        }
        async fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, StoreError> {
            unimplemented!()
        }
        async fn count_unprocessed(&self) -> Result<usize, StoreError> {
            unimplemented!()
        }
        async fn remove_unprocessed(&self, _id: &str) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn remove_all_unprocessed(&self) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn queue_all_cached(&self) -> Result<Vec<UnprocessedItem>, StoreError> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl crate::store::GroupStore for StubStore {
        async fn groups_get_group(&self, _id: &[u8]) -> Result<Option<GroupRecord>, StoreError> {
            unimplemented!()
        }
        async fn groups_get_numbers(&self, _id: &[u8]) -> Result<Vec<String>, StoreError> {
            unimplemented!()
        }
        async fn groups_create_new_group(
            &self,
            _members: Vec<String>,
            _id: &[u8],
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn groups_update_numbers(
            &self,
            _id: &[u8],
            _members: Vec<String>,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn groups_remove_number(&self, _id: &[u8], _number: &str) -> Result<(), StoreError> {
            unimplemented!()
        }
        async fn groups_delete_group(&self, _id: &[u8]) -> Result<(), StoreError> {
            unimplemented!()
        }
    }

    #[async_trait]
    impl crate::store::PreferenceStore for StubStore {
        async fn get(
            &self,
            _key: &str,
            _default: Option<String>,
        ) -> Result<Option<String>, StoreError> {
            unimplemented!()
        }
        async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            unimplemented!()
        }
    }

    struct AlwaysOpenCipher;

    #[async_trait]
    impl SessionCipher for AlwaysOpenCipher {
        async fn encrypt(
            &self,
            _address: &SessionAddress,
            plaintext: &[u8],
            _options: CipherOptions,
        ) -> Result<RatchetCiphertext, RatchetError> {
            Ok(RatchetCiphertext {
                kind: CiphertextKind::Whisper,
                bytes: plaintext.to_vec(),
            })
        }
        async fn decrypt_whisper_message(
            &self,
            _address: &SessionAddress,
            _ciphertext: &[u8],
            _options: CipherOptions,
        ) -> Result<Vec<u8>, RatchetError> {
            unimplemented!()
        }
        async fn decrypt_pre_key_whisper_message(
            &self,
            _address: &SessionAddress,
            _ciphertext: &[u8],
            _options: CipherOptions,
        ) -> Result<Vec<u8>, RatchetError> {
            unimplemented!()
        }
        async fn has_open_session(&self, _address: &SessionAddress) -> Result<bool, RatchetError> {
            Ok(true)
        }
        async fn close_open_session_for_device(
            &self,
            _address: &SessionAddress,
        ) -> Result<(), RatchetError> {
            Ok(())
        }
        async fn delete_all_sessions_for_device(
            &self,
            _address: &SessionAddress,
        ) -> Result<(), RatchetError> {
            Ok(())
        }
    }

    struct NoopBuilder;

    #[async_trait]
    impl SessionBuilder for NoopBuilder {
        async fn process_pre_key(
            &self,
            _address: &SessionAddress,
            _bundle: &PreKeyBundle,
            _identity_key: &[u8],
        ) -> Result<(), RatchetError> {
            Ok(())
        }
    }

    struct ConflictThenOkServer {
        conflicted_once: StdMutex<bool>,
    }

    #[async_trait]
    impl Server for ConflictThenOkServer {
        async fn get_keys_for_number(
            &self,
            _number: &str,
            device_id: Option<u32>,
        ) -> Result<KeyFetchResult, NetworkError> {
            Ok(KeyFetchResult {
                identity_key: vec![9; 32],
                devices: vec![PreKeyBundle {
                    device_id: device_id.unwrap_or(3),
                    registration_id: 7,
                    pre_key: None,
                    signed_pre_key: SignedPreKeyEntry {
                        key_id: 1,
                        public_key: vec![1; 32],
                        signature: vec![2; 64],
                    },
                }],
            })
        }

        async fn send_messages(
            &self,
            number: &str,
            _bundle: Vec<DeviceCiphertext>,
            _timestamp: u64,
            _silent: bool,
        ) -> Result<(), SendMessagesError> {
            let mut conflicted = self.conflicted_once.lock().unwrap();
            if !*conflicted {
                *conflicted = true;
                return Err(SendMessagesError::Conflict {
                    number: number.to_string(),
                    extra_devices: vec![2],
                    missing_devices: vec![3],
                });
            }
            Ok(())
        }

        async fn get_attachment(&self, _id: u64) -> Result<Vec<u8>, NetworkError> {
            unimplemented!()
        }

        async fn get_devices(&self, _number: &str) -> Result<Vec<u32>, NetworkError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn conflict_recovers_and_retries_with_recurse_true() {
        let store = Arc::new(StubStore::default());
        store
            .devices
            .lock()
            .unwrap()
            .insert("+1".to_string(), vec![1, 2]);

        let engine = SendEngine::new(
            store.clone(),
            Arc::new(AlwaysOpenCipher),
            Arc::new(NoopBuilder),
            Arc::new(ConflictThenOkServer {
                conflicted_once: StdMutex::new(false),
            }),
            "+15550000000",
        );

        let outcome = engine
            .send(
                vec!["+1".to_string()],
                DataMessage::default(),
                1000,
                false,
            )
            .await;

        assert_eq!(outcome.successful_numbers, vec!["+1".to_string()]);
        assert!(outcome.errors.is_empty());
        assert_eq!(store.removed_sessions.lock().unwrap().len(), 1);
    }

    struct AlwaysGoneServer;

    #[async_trait]
    impl Server for AlwaysGoneServer {
        async fn get_keys_for_number(
            &self,
            _number: &str,
            device_id: Option<u32>,
        ) -> Result<KeyFetchResult, NetworkError> {
            Ok(KeyFetchResult {
                identity_key: vec![9; 32],
                devices: vec![PreKeyBundle {
                    device_id: device_id.unwrap_or(1),
                    registration_id: 7,
                    pre_key: None,
                    signed_pre_key: SignedPreKeyEntry {
                        key_id: 1,
                        public_key: vec![1; 32],
                        signature: vec![2; 64],
                    },
                }],
            })
        }

        async fn send_messages(
            &self,
            number: &str,
            _bundle: Vec<DeviceCiphertext>,
            _timestamp: u64,
            _silent: bool,
        ) -> Result<(), SendMessagesError> {
            Err(SendMessagesError::Gone {
                number: number.to_string(),
                stale_devices: vec![1],
            })
        }

        async fn get_attachment(&self, _id: u64) -> Result<Vec<u8>, NetworkError> {
            unimplemented!()
        }

        async fn get_devices(&self, _number: &str) -> Result<Vec<u32>, NetworkError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn repeated_410_hits_the_retry_limit() {
        let store = Arc::new(StubStore::default());
        store
            .devices
            .lock()
            .unwrap()
            .insert("+1".to_string(), vec![1]);

        let engine = SendEngine::new(
            store,
            Arc::new(AlwaysOpenCipher),
            Arc::new(NoopBuilder),
            Arc::new(AlwaysGoneServer),
            "+15550000000",
        );

        let outcome = engine
            .send(
                vec!["+1".to_string()],
                DataMessage::default(),
                1000,
                false,
            )
            .await;

        assert!(outcome.successful_numbers.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        match &outcome.errors[0] {
            EngineError::OutgoingMessage { cause, .. } => assert_eq!(cause, "Hit retry limit"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bootstraps_device_one_for_an_unknown_number() {
        let store = Arc::new(StubStore::default());
        let engine = SendEngine::new(
            store.clone(),
            Arc::new(AlwaysOpenCipher),
            Arc::new(NoopBuilder),
            Arc::new(ConflictThenOkServer {
                conflicted_once: StdMutex::new(true),
            }),
            "+15550000000",
        );

        let devices = engine.get_stale_device_ids_for_number("+1").await.unwrap();
        assert_eq!(devices, vec![BOOTSTRAP_DEVICE_ID]);
    }
}
