// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Durable envelope cache (§4.2).
//!
//! `Storage` wraps a synchronous `rusqlite::Connection`: `INSERT OR
//! REPLACE`, typed row mappers, `rows_affected` booleans. The async
//! `UnprocessedCacheStore` adapter, [`crate::store::SqliteUnprocessedCache`],
//! bridges these blocking calls onto the engine's cooperative event loop
//! with `tokio::task::spawn_blocking`, since rusqlite itself has no async
//! story.

#[cfg(feature = "testing")]
pub mod envelope_cache;
#[cfg(not(feature = "testing"))]
mod envelope_cache;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

pub use error::StorageError;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed envelope cache.
///
/// One `Storage` per receiver, matching the spec's "Store is the single
/// source of truth" invariant (§5) for the unprocessed-cache slice of
/// that contract. `Connection` is wrapped in a `Mutex` so `Storage` can be
/// shared across the `spawn_blocking` calls the async adapter issues.
pub struct Storage {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS unprocessed (
    id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    envelope BLOB NOT NULL,
    decrypted BLOB,
    timestamp INTEGER NOT NULL,
    attempts INTEGER NOT NULL
);
";

impl Storage {
    /// Opens or creates the cache database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let storage = Storage {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates an in-memory cache (used by tests and short-lived CLIs).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage {
            conn: Mutex::new(conn),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn run_migrations(&self) -> Result<(), StorageError> {
        self.conn.lock().unwrap().execute_batch(SCHEMA)?;
        Ok(())
    }
}
