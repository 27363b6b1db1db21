// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! A client-side transport engine for a Double Ratchet messaging service:
//! a durable receive path (WebSocket lifecycle, envelope cache, decrypt
//! dispatch) and a send path (multi-device fan-out with 409/410 recovery),
//! both driven by external collaborators for the actual cryptography,
//! storage, and HTTP/WebSocket plumbing (§1, §6).

pub mod codec;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod model;
pub mod network;
pub mod queue;
pub mod receiver;
pub mod retry;
pub mod send;
pub mod sender;
pub mod storage;
pub mod store;
pub mod worker;

pub use dispatch::{GroupOutcome, InboundDispatcher};
pub use error::{EngineError, EngineResult};
pub use events::{CallbackHandler, Confirm, EngineEvent, EventDispatcher, EventHandler};
pub use model::{
    AttachmentPointer, BlockedList, CallMessage, ConfigurationSync, Content, DataMessage,
    DataMessageFlags, DeviceCiphertext, Envelope, EnvelopeId, EnvelopeType, GroupContext,
    GroupContextType, NullMessage, Quote, ReadMessage, ReceiptMessage, SentTranscript,
    SessionAddress, SocketState, SyncBlob, SyncMessage, SyncRequest, UnprocessedItem, Verified,
    VerifiedState,
};
pub use network::{
    CloseOutcome, MessageSocket, MockTransport, NetworkError, SocketSupervisor, TransportConfig,
    TransportResult, WebSocketRequest,
};
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use network::WebSocketTransport;
pub use queue::{IncomingSequencer, QueueSlot, TaskQueue, TaskQueueConfig, TaskQueueError};
pub use receiver::{Receiver, ReceiverConfig};
pub use retry::{RetryNegotiator, RetryOutcome};
pub use send::{OutgoingBatch, SendEngine, SendOutcome};
pub use sender::Sender;
pub use storage::{Storage, StorageError};
pub use store::{
    CipherOptions, CiphertextKind, GroupRecord, GroupStore, KeyFetchResult, PreKeyBundle,
    PreKeyEntry, PreferenceStore, RatchetCiphertext, RatchetError, Server, SendMessagesError,
    SessionBuilder, SessionCipher, SessionStore, SignalingKeyCipher, SignalingKeyError,
    SignedPreKeyEntry, SqliteUnprocessedCache, Store, StoreError, UnprocessedCacheStore,
};
pub use worker::{Base64Worker, WorkerError};
