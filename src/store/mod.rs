// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! External collaborator contracts (§6).
//!
//! The persistent identity/session/pre-key store, the ratchet's
//! `SessionCipher`/`SessionBuilder`, and the HTTP/WebSocket `Server` are
//! deliberately out of scope (§1) — the engine only depends on their
//! shapes, mirrored here as `async_trait` trait objects the same way
//! `other_examples`' `libsignal-client` session cipher depends on
//! `SessionStore`/`IdentityKeyStore`/`PreKeyStore`/`SignedPreKeyStore`.

#[cfg(feature = "testing")]
pub mod contracts;
#[cfg(not(feature = "testing"))]
mod contracts;

#[cfg(feature = "testing")]
pub mod sqlite_cache;
#[cfg(not(feature = "testing"))]
mod sqlite_cache;

pub use contracts::{
    CipherOptions, CiphertextKind, GroupRecord, GroupStore, KeyFetchResult, PreKeyBundle,
    PreKeyEntry, PreferenceStore, RatchetCiphertext, RatchetError, Server, SendMessagesError,
    SessionBuilder, SessionCipher, SessionStore, SignalingKeyCipher, SignalingKeyError,
    SignedPreKeyEntry, Store, StoreError, UnprocessedCacheStore,
};
pub use sqlite_cache::SqliteUnprocessedCache;

#[cfg(test)]
pub use contracts::tests::StubServer;
