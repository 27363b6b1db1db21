// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! `tryMessageAgain` (§4.8): re-decrypt a specific ciphertext after a
//! previously stored identity-key error has been accepted by the caller,
//! picking the right proto generation by a calendar cutoff.

use std::sync::Arc;

use crate::codec::unpad;
use crate::error::{EngineError, EngineResult};
use crate::model::{Content, DataMessage, SessionAddress};
use crate::store::{CipherOptions, SessionCipher};

/// 2017-06-01T07:00:00Z, the point the source switches from legacy
/// `DataMessage` framing to the `Content` envelope. Messages sent before
/// this can only ever be legacy `DataMessage`.
const CONTENT_PROTO_CUTOFF_MS: u64 = 1_496_300_400_000;

/// Which proto generation a re-decrypted retry landed on.
#[derive(Debug, Clone)]
pub enum RetryOutcome {
    Legacy(DataMessage),
    Content(Content),
}

pub struct RetryNegotiator {
    cipher: Arc<dyn SessionCipher>,
}

impl RetryNegotiator {
    pub fn new(cipher: Arc<dyn SessionCipher>) -> Self {
        RetryNegotiator { cipher }
    }

    /// `from` is `"{number}.{deviceId}"`, matching the envelope identity
    /// shape used elsewhere in the engine.
    pub async fn try_message_again(
        &self,
        from: &SessionAddress,
        ciphertext: &[u8],
        sent_at: u64,
    ) -> EngineResult<RetryOutcome> {
        let options = CipherOptions {
            unlimited_message_keys: false,
        };
        let padded = self
            .cipher
            .decrypt_pre_key_whisper_message(from, ciphertext, options)
            .await
            .map_err(|e| EngineError::Ratchet(e.to_string()))?;
        let plaintext = unpad(&padded).map_err(|_| EngineError::InvalidPadding)?;

        if sent_at < CONTENT_PROTO_CUTOFF_MS {
            return decode_legacy(&plaintext);
        }

        if let Ok(content) = bincode::deserialize::<Content>(&plaintext) {
            if validate_retry_content_message(&content) {
                return Ok(RetryOutcome::Content(content));
            }
        }
        decode_legacy(&plaintext)
    }
}

fn decode_legacy(plaintext: &[u8]) -> EngineResult<RetryOutcome> {
    let message: DataMessage =
        bincode::deserialize(plaintext).map_err(|_| EngineError::MalformedEnvelope)?;
    Ok(RetryOutcome::Legacy(message))
}

/// A retried `Content` must carry no sync payload and exactly one of
/// `{dataMessage, callMessage, nullMessage}`; a `dataMessage` among those
/// must carry at least one field worth dispatching.
fn validate_retry_content_message(content: &Content) -> bool {
    if content.sync_message.is_some() {
        return false;
    }

    let set_count = [
        content.data_message.is_some(),
        content.call_message.is_some(),
        content.null_message.is_some(),
    ]
    .into_iter()
    .filter(|b| *b)
    .count();
    if set_count != 1 {
        return false;
    }

    if let Some(data_message) = &content.data_message {
        let has_meaningful_field = !data_message.attachments.is_empty()
            || data_message.body.is_some()
            || data_message.expire_timer != 0
            || data_message.flags != 0
            || data_message.group.is_some();
        if !has_meaningful_field {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CiphertextKind, RatchetCiphertext, RatchetError};
    use async_trait::async_trait;

    struct StubCipher {
        plaintext: Vec<u8>,
    }

    #[async_trait]
    impl SessionCipher for StubCipher {
        async fn encrypt(
            &self,
            _address: &SessionAddress,
            _plaintext: &[u8],
            _options: CipherOptions,
        ) -> Result<RatchetCiphertext, RatchetError> {
            unimplemented!()
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
            Ok(crate::codec::pad(&self.plaintext))
        }
        async fn has_open_session(&self, _address: &SessionAddress) -> Result<bool, RatchetError> {
            unimplemented!()
        }
        async fn close_open_session_for_device(
            &self,
            _address: &SessionAddress,
        ) -> Result<(), RatchetError> {
            unimplemented!()
        }
        async fn delete_all_sessions_for_device(
            &self,
            _address: &SessionAddress,
        ) -> Result<(), RatchetError> {
            unimplemented!()
        }
    }

    fn address() -> SessionAddress {
        SessionAddress::new("+15550003333", 1)
    }

    #[tokio::test]
    async fn before_cutoff_always_decodes_as_legacy() {
        let message = DataMessage {
            body: Some("hi".to_string()),
            ..Default::default()
        };
        let plaintext = bincode::serialize(&message).unwrap();
        let negotiator = RetryNegotiator::new(Arc::new(StubCipher { plaintext }));

        let outcome = negotiator
            .try_message_again(&address(), b"ciphertext", 1_490_000_000_000)
            .await
            .unwrap();

        assert!(matches!(outcome, RetryOutcome::Legacy(m) if m.body.as_deref() == Some("hi")));
    }

    #[tokio::test]
    async fn after_cutoff_with_valid_content_dispatches_as_content() {
        let content = Content {
            data_message: Some(DataMessage {
                body: Some("hi".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let plaintext = bincode::serialize(&content).unwrap();
        let negotiator = RetryNegotiator::new(Arc::new(StubCipher { plaintext }));

        let outcome = negotiator
            .try_message_again(&address(), b"ciphertext", 1_600_000_000_000)
            .await
            .unwrap();

        assert!(matches!(outcome, RetryOutcome::Content(_)));
    }

    #[test]
    fn validation_rejects_sync_message_and_empty_data_message() {
        let with_sync = Content {
            sync_message: Some(crate::model::SyncMessage::default()),
            data_message: Some(DataMessage::default()),
            ..Default::default()
        };
        assert!(!validate_retry_content_message(&with_sync));

        let empty_data_message = Content {
            data_message: Some(DataMessage::default()),
            ..Default::default()
        };
        assert!(!validate_retry_content_message(&empty_data_message));

        let multiple_set = Content {
            data_message: Some(DataMessage {
                body: Some("hi".to_string()),
                ..Default::default()
            }),
            null_message: Some(crate::model::NullMessage { padding: vec![] }),
            ..Default::default()
        };
        assert!(!validate_retry_content_message(&multiple_set));

        let valid = Content {
            data_message: Some(DataMessage {
                body: Some("hi".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(validate_retry_content_message(&valid));
    }
}
