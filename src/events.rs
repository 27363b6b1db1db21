// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event taxonomy and dispatch (§6 "Events emitted").
//!
//! Generalizes `api::events.rs`'s `VauchiEvent`/`EventHandler`/
//! `CallbackHandler`/`EventDispatcher` shape to the engine's own event set.
//! The one addition the source system doesn't need: most of these events
//! carry a [`Confirm`] capability, the unforgeable token described in §9
//! that removes one specific cache entry. A handler never sees the cache
//! id directly — only a callable handle bound to it.

use std::fmt;
use std::sync::Arc;

use crate::model::{BlockedList, ConfigurationSync, DataMessage, ReadMessage, SentTranscript,
    SyncBlob, Verified};
use crate::store::{StoreError, UnprocessedCacheStore};

/// Capability to remove a specific envelope from the durable cache.
///
/// Cloning shares the same underlying key and store handle; calling
/// `confirm()` from any clone removes the same entry. Calling it more than
/// once is harmless — a second `remove_unprocessed` on a missing id is a
/// no-op at the storage layer.
#[derive(Clone)]
pub struct Confirm {
    key: String,
    cache: Arc<dyn UnprocessedCacheStore>,
}

impl Confirm {
    pub fn new(key: impl Into<String>, cache: Arc<dyn UnprocessedCacheStore>) -> Self {
        Confirm {
            key: key.into(),
            cache,
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.key
    }

    /// Removes the bound envelope from the cache.
    pub async fn confirm(&self) -> Result<(), StoreError> {
        self.cache.remove_unprocessed(&self.key).await
    }
}

impl fmt::Debug for Confirm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Confirm").field("key", &self.key).finish()
    }
}

/// Events emitted by the receive path (§6). `error` and `reconnect` are the
/// only variants without a `confirm()` — neither one is bound to a cache
/// entry.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Message {
        source: String,
        source_device: u32,
        message: DataMessage,
        confirm: Confirm,
    },
    Sent {
        transcript: SentTranscript,
        confirm: Confirm,
    },
    Delivery {
        timestamp: u64,
        source: String,
        source_device: u32,
        confirm: Confirm,
    },
    Read {
        messages: Vec<ReadMessage>,
        confirm: Confirm,
    },
    ReadSync {
        messages: Vec<ReadMessage>,
        confirm: Confirm,
    },
    Contact {
        blob: SyncBlob,
        confirm: Confirm,
    },
    ContactSync {
        confirm: Confirm,
    },
    Group {
        blob: SyncBlob,
        confirm: Confirm,
    },
    GroupSync {
        confirm: Confirm,
    },
    Verified {
        verified: Verified,
        confirm: Confirm,
    },
    Configuration {
        configuration: ConfigurationSync,
        confirm: Confirm,
    },
    /// Server signaled the inbox is fully drained (close code 3001 or
    /// `PUT /api/v1/queue/empty`).
    Empty,
    /// Fires every 10 completed dispatch tasks (§4.3).
    Progress {
        completed: u64,
    },
    /// A reconnect attempt is starting.
    Reconnect,
    /// Envelope-level failure; the caller decides whether to `confirm()`
    /// (drop) or leave the item in cache for retry (§7).
    Error {
        message: String,
        confirm: Option<Confirm>,
    },
}

/// Implement this to receive engine events.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Wraps a closure as an [`EventHandler`].
pub struct CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(EngineEvent) + Send + Sync,
{
    fn on_event(&self, event: EngineEvent) {
        (self.callback)(event);
    }
}

/// Fans a single event out to every registered handler.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        EventDispatcher {
            handlers: Vec::new(),
        }
    }

    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn dispatch(&self, event: EngineEvent) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}
