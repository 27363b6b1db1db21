// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Inbound envelope dispatch (§4.5): `handleRequest`, `handleEnvelope`,
//! `decrypt`, and the content-variant routers.

use std::sync::Arc;

use tracing::{error, warn};

use crate::codec::unpad;
use crate::error::{EngineError, EngineResult};
use crate::events::{Confirm, EngineEvent, EventDispatcher};
use crate::model::{
    Content, DataMessage, DataMessageFlags, Envelope, EnvelopeType, SentTranscript,
    SessionAddress,
};
use crate::network::WebSocketRequest;
use crate::queue::{IncomingSequencer, TaskQueue};
use crate::store::{
    CipherOptions, GroupStore, RatchetError, Server, SessionCipher, SignalingKeyCipher, Store,
    UnprocessedCacheStore,
};
use zeroize::Zeroizing;

const QUEUE_EMPTY_PATH: &str = "/api/v1/queue/empty";
const MESSAGE_PATH: &str = "/api/v1/message";

/// Wires together the external collaborators the inbound dispatcher needs:
/// the durable cache and group/preference tables (via `Store`), the
/// ratchet (`SessionCipher`), the websocket-framing decrypt, the event
/// fan-out, and the ordering primitives from [`crate::queue`].
#[derive(Clone)]
pub struct InboundDispatcher {
    store: Arc<dyn Store>,
    /// Same backing store as `store`, coerced to the narrower
    /// `UnprocessedCacheStore` object so [`Confirm`] only ever carries the
    /// capability to remove a cache entry, never the wider `Store` surface.
    cache: Arc<dyn UnprocessedCacheStore>,
    /// Same backing store again, coerced to `GroupStore` for
    /// `process_decrypted`'s group reconciliation — kept as its own object
    /// rather than re-derived from `store` to avoid trait-object-to-trait-
    /// object casts between sibling facets of the same concrete type.
    groups: Arc<dyn GroupStore>,
    cipher: Arc<dyn SessionCipher>,
    signaling_key: Arc<dyn SignalingKeyCipher>,
    /// Where `process_decrypted` fetches attachments and group avatars
    /// from (§4.6).
    server: Arc<dyn Server>,
    events: Arc<EventDispatcher>,
    queue: Arc<TaskQueue>,
    sequencer: Arc<IncomingSequencer>,
    local_number: String,
    local_device_id: u32,
}

impl InboundDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn UnprocessedCacheStore>,
        groups: Arc<dyn GroupStore>,
        cipher: Arc<dyn SessionCipher>,
        signaling_key: Arc<dyn SignalingKeyCipher>,
        server: Arc<dyn Server>,
        events: Arc<EventDispatcher>,
        queue: Arc<TaskQueue>,
        sequencer: Arc<IncomingSequencer>,
        local_number: impl Into<String>,
        local_device_id: u32,
    ) -> Self {
        InboundDispatcher {
            store,
            cache,
            groups,
            cipher,
            signaling_key,
            server,
            events,
            queue,
            sequencer,
            local_number: local_number.into(),
            local_device_id,
        }
    }

    fn make_confirm(&self, cache_key: &str) -> Confirm {
        Confirm::new(cache_key.to_string(), self.cache.clone())
    }

    async fn is_blocked(&self, number: &str) -> EngineResult<bool> {
        let blocked = self.store.get("blocked", None).await?;
        Ok(blocked
            .map(|csv| csv.split(',').any(|n| n == number))
            .unwrap_or(false))
    }

    /// `handleRequest(req)`.
    pub async fn handle_request(&self, req: WebSocketRequest) {
        if req.verb == "PUT" && req.path == QUEUE_EMPTY_PATH {
            if let Err(e) = req.respond(200, "OK") {
                warn!(error = %e, "failed to ack queue/empty");
            }
            self.flush_empty().await;
            return;
        }

        if req.verb == "PUT" && req.path == MESSAGE_PATH {
            self.handle_message_request(req).await;
            return;
        }

        if let Err(e) = req.respond(200, "OK") {
            warn!(error = %e, "failed to ack non-message request");
        }
    }

    async fn flush_empty(&self) {
        self.sequencer.wait_all_settled().await;
        let events = self.events.clone();
        let _ = self
            .queue
            .add_to_queue::<_, (), ()>(async move {
                events.dispatch(EngineEvent::Empty);
                Ok(())
            })
            .await;
    }

    async fn handle_message_request(&self, req: WebSocketRequest) {
        let ticket = self.sequencer.take_ticket();

        let plaintext = match self.signaling_key.decrypt(&req.body) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = req.respond(500, "signaling key decrypt failed");
                error!(error = %e, "signaling key decrypt failed");
                self.events.dispatch(EngineEvent::Error {
                    message: e.to_string(),
                    confirm: None,
                });
                self.sequencer.advance().await;
                return;
            }
        };

        let envelope: Envelope = match bincode::deserialize(&plaintext) {
            Ok(e) => e,
            Err(e) => {
                let _ = req.respond(500, "malformed envelope");
                error!(error = %e, "failed to decode envelope");
                self.events.dispatch(EngineEvent::Error {
                    message: format!("malformed envelope: {e}"),
                    confirm: None,
                });
                self.sequencer.advance().await;
                return;
            }
        };

        match self.is_blocked(&envelope.source).await {
            Ok(true) => {
                let _ = req.respond(200, "OK");
                self.sequencer.advance().await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                let _ = req.respond(500, "blocked-list lookup failed");
                error!(error = %e, "blocked-list lookup failed");
                self.sequencer.advance().await;
                return;
            }
        }

        let cache_key = envelope.identity().as_key();
        let item = crate::model::UnprocessedItem::new(
            cache_key.clone(),
            plaintext,
            envelope.timestamp,
        );

        if let Err(e) = self.store.add_unprocessed(&item).await {
            let _ = req.respond(500, "cache insert failed");
            error!(error = %e, "failed to persist envelope to cache");
            self.sequencer.advance().await;
            return;
        }
        let _ = req.respond(200, "OK");

        self.sequencer.wait_turn(ticket).await;
        // Claim this ticket's chain slot now, before releasing the next
        // ticket — otherwise a later ticket's detached task could get
        // polled and lock the chain before this one's task is even
        // scheduled, dispatching envelopes out of arrival order.
        let slot = self.queue.clone().acquire_slot().await;
        self.sequencer.advance().await;

        let dispatcher = self.clone();
        tokio::spawn(async move {
            let key = cache_key.clone();
            let result = slot
                .run::<_, (), EngineError>(async move {
                    dispatcher.handle_envelope(envelope, key).await
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "dispatch task for {} did not complete cleanly", cache_key);
            }
        });
    }

    /// `handleEnvelope(envelope)`.
    async fn handle_envelope(&self, envelope: Envelope, cache_key: String) -> EngineResult<()> {
        if envelope.envelope_type == EnvelopeType::Receipt {
            let confirm = self.make_confirm(&cache_key);
            self.events.dispatch(EngineEvent::Delivery {
                timestamp: envelope.timestamp,
                source: envelope.source.clone(),
                source_device: envelope.source_device,
                confirm,
            });
            return Ok(());
        }

        if let Some(ciphertext) = envelope.content.clone() {
            let plaintext = self.decrypt(&envelope, &ciphertext, &cache_key).await?;
            let content: Content = bincode::deserialize(&plaintext)
                .map_err(|_| EngineError::UnsupportedContent)?;
            return self
                .inner_handle_content_message(&envelope, content, cache_key)
                .await;
        }

        if let Some(ciphertext) = envelope.legacy_message.clone() {
            let plaintext = self.decrypt(&envelope, &ciphertext, &cache_key).await?;
            let message: DataMessage = bincode::deserialize(&plaintext)
                .map_err(|_| EngineError::MalformedEnvelope)?;
            return self
                .handle_data_message(&envelope, message, cache_key)
                .await;
        }

        let _ = self.store.remove_unprocessed(&cache_key).await;
        Err(EngineError::MalformedEnvelope)
    }

    /// `decrypt(envelope, ciphertext)`.
    async fn decrypt(
        &self,
        envelope: &Envelope,
        ciphertext: &[u8],
        cache_key: &str,
    ) -> EngineResult<Vec<u8>> {
        let address = SessionAddress::new(envelope.source.clone(), envelope.source_device);
        let options = CipherOptions {
            unlimited_message_keys: envelope.source == self.local_number,
        };

        let result = match envelope.envelope_type {
            EnvelopeType::Ciphertext => {
                self.cipher
                    .decrypt_whisper_message(&address, ciphertext, options)
                    .await
            }
            EnvelopeType::PreKeyBundle => {
                self.cipher
                    .decrypt_pre_key_whisper_message(&address, ciphertext, options)
                    .await
            }
            EnvelopeType::Receipt => return Err(EngineError::UnknownMessageType),
        };

        match result {
            Ok(padded) => {
                // The ratchet hands back the raw padded plaintext; zero it
                // once unpadded rather than leaving a second copy of the
                // decrypted bytes sitting in memory.
                let padded = Zeroizing::new(padded);
                let plaintext = unpad(&padded).map_err(|_| EngineError::InvalidPadding)?;
                self.persist_decrypted(cache_key, &plaintext).await;
                Ok(plaintext)
            }
            Err(RatchetError::UnknownIdentityKey {
                address,
                identity_key,
            }) => {
                let confirm = self.make_confirm(cache_key);
                self.events.dispatch(EngineEvent::Error {
                    message: format!("identity key changed for {address}"),
                    confirm: Some(confirm),
                });
                Err(EngineError::IncomingIdentityKey {
                    address,
                    ciphertext: ciphertext.to_vec(),
                    identity_key,
                })
            }
            Err(RatchetError::Other(message)) => Err(EngineError::Ratchet(message)),
        }
    }

    async fn persist_decrypted(&self, cache_key: &str, plaintext: &[u8]) {
        match self.store.get_unprocessed(cache_key).await {
            Ok(Some(mut item)) => {
                item.decrypted = Some(plaintext.to_vec());
                if let Err(e) = self.store.update_unprocessed(&item).await {
                    warn!(error = %e, "failed to persist decrypted payload");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to reload cache entry for decrypted upgrade"),
        }
    }

    /// `innerHandleContentMessage`.
    async fn inner_handle_content_message(
        &self,
        envelope: &Envelope,
        content: Content,
        cache_key: String,
    ) -> EngineResult<()> {
        if content.set_variant_count() != 1 {
            let _ = self.store.remove_unprocessed(&cache_key).await;
            return Err(EngineError::UnsupportedContent);
        }

        if let Some(message) = content.data_message {
            return self.handle_data_message(envelope, message, cache_key).await;
        }
        if let Some(sync) = content.sync_message {
            return self.handle_sync_message(envelope, sync, cache_key).await;
        }
        if content.null_message.is_some() {
            self.make_confirm(&cache_key).confirm().await.ok();
            return Ok(());
        }
        if content.call_message.is_some() {
            self.make_confirm(&cache_key).confirm().await.ok();
            return Ok(());
        }
        if let Some(receipt) = content.receipt_message {
            let confirm = self.make_confirm(&cache_key);
            for timestamp in receipt.timestamps {
                self.events.dispatch(EngineEvent::Delivery {
                    timestamp,
                    source: envelope.source.clone(),
                    source_device: envelope.source_device,
                    confirm: confirm.clone(),
                });
            }
            return Ok(());
        }

        let _ = self.store.remove_unprocessed(&cache_key).await;
        Err(EngineError::UnsupportedContent)
    }

    async fn handle_end_session(&self, number: &str) -> EngineResult<()> {
        let device_ids = self.store.get_device_ids(number).await?;
        for device_id in device_ids {
            let address = SessionAddress::new(number.to_string(), device_id);
            self.cipher
                .delete_all_sessions_for_device(&address)
                .await
                .map_err(|e| EngineError::Ratchet(e.to_string()))?;
        }
        Ok(())
    }

    /// `handleDataMessage`.
    async fn handle_data_message(
        &self,
        envelope: &Envelope,
        mut message: DataMessage,
        cache_key: String,
    ) -> EngineResult<()> {
        if DataMessageFlags(message.flags).contains(DataMessageFlags::END_SESSION) {
            self.handle_end_session(&envelope.source).await?;
        }
        super::process_decrypted::process_decrypted(
            &mut message,
            &envelope.source,
            &self.local_number,
            &*self.groups,
            &*self.server,
        )
        .await?;

        let confirm = self.make_confirm(&cache_key);
        self.events.dispatch(EngineEvent::Message {
            source: envelope.source.clone(),
            source_device: envelope.source_device,
            message,
            confirm,
        });
        Ok(())
    }

    /// `handleSyncMessage`: only accepted from the local number's other
    /// devices.
    async fn handle_sync_message(
        &self,
        envelope: &Envelope,
        sync: crate::model::SyncMessage,
        cache_key: String,
    ) -> EngineResult<()> {
        if envelope.source != self.local_number || envelope.source_device == self.local_device_id
        {
            let _ = self.store.remove_unprocessed(&cache_key).await;
            return Err(EngineError::MalformedEnvelope);
        }

        match sync.first_set_field() {
            Some("sent") => {
                self.handle_sent_message(envelope, sync.sent.unwrap(), cache_key)
                    .await
            }
            Some("contacts") => {
                let confirm = self.make_confirm(&cache_key);
                self.events.dispatch(EngineEvent::ContactSync { confirm });
                Ok(())
            }
            Some("groups") => {
                let confirm = self.make_confirm(&cache_key);
                self.events.dispatch(EngineEvent::GroupSync { confirm });
                Ok(())
            }
            Some("blocked") => {
                let blocked = sync.blocked.unwrap();
                self.store
                    .put("blocked", &blocked.numbers.join(","))
                    .await?;
                let group_ids: Vec<String> =
                    blocked.group_ids.iter().map(hex::encode).collect();
                self.store
                    .put("blocked-groups", &group_ids.join(","))
                    .await?;
                self.make_confirm(&cache_key).confirm().await.ok();
                Ok(())
            }
            Some("request") => {
                self.make_confirm(&cache_key).confirm().await.ok();
                Ok(())
            }
            Some("read") => {
                let confirm = self.make_confirm(&cache_key);
                self.events.dispatch(EngineEvent::Read {
                    messages: sync.read.unwrap(),
                    confirm,
                });
                Ok(())
            }
            Some("verified") => {
                let confirm = self.make_confirm(&cache_key);
                self.events.dispatch(EngineEvent::Verified {
                    verified: sync.verified.unwrap(),
                    confirm,
                });
                Ok(())
            }
            Some("configuration") => {
                let confirm = self.make_confirm(&cache_key);
                self.events.dispatch(EngineEvent::Configuration {
                    configuration: sync.configuration.unwrap(),
                    confirm,
                });
                Ok(())
            }
            _ => {
                let _ = self.store.remove_unprocessed(&cache_key).await;
                Err(EngineError::MalformedEnvelope)
            }
        }
    }

    /// `handleSentMessage`: mirrors `handleDataMessage`, emits `sent`.
    async fn handle_sent_message(
        &self,
        envelope: &Envelope,
        transcript: SentTranscript,
        cache_key: String,
    ) -> EngineResult<()> {
        let mut message = transcript.message.clone();
        if DataMessageFlags(message.flags).contains(DataMessageFlags::END_SESSION) {
            let destination = transcript
                .destination
                .clone()
                .unwrap_or_else(|| envelope.source.clone());
            self.handle_end_session(&destination).await?;
        }
        super::process_decrypted::process_decrypted(
            &mut message,
            &envelope.source,
            &self.local_number,
            &*self.groups,
            &*self.server,
        )
        .await?;

        let confirm = self.make_confirm(&cache_key);
        self.events.dispatch(EngineEvent::Sent {
            transcript: SentTranscript {
                message,
                ..transcript
            },
            confirm,
        });
        Ok(())
    }

    /// Resumes one startup-scanned cache item (§4.2). `item.envelope` holds
    /// the websocket-decrypted bytes cached before protobuf decode, the same
    /// shape `handleMessageRequest` inserts; `item.decrypted`, if present,
    /// lets a replay skip straight to content routing instead of
    /// re-running the ratchet.
    pub async fn replay_cached(&self, item: crate::model::UnprocessedItem) -> EngineResult<()> {
        let envelope: Envelope =
            bincode::deserialize(&item.envelope).map_err(|_| EngineError::MalformedEnvelope)?;
        let cache_key = item.id;

        let decrypted = match item.decrypted {
            Some(bytes) => bytes,
            None => return self.handle_envelope(envelope, cache_key).await,
        };

        if envelope.content.is_some() {
            let content: Content = bincode::deserialize(&decrypted)
                .map_err(|_| EngineError::UnsupportedContent)?;
            self.inner_handle_content_message(&envelope, content, cache_key)
                .await
        } else {
            let message: DataMessage = bincode::deserialize(&decrypted)
                .map_err(|_| EngineError::MalformedEnvelope)?;
            self.handle_data_message(&envelope, message, cache_key).await
        }
    }
}
