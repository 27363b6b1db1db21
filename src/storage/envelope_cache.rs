// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Unprocessed-envelope CRUD and the startup (`queueAllCached`) scan (§4.2).

use rusqlite::{params, OptionalExtension};

use super::{Storage, StorageError};
use crate::model::UnprocessedItem;

/// Above this many cached items at startup, the whole cache is distrusted
/// and purged rather than replayed.
pub const PURGE_THRESHOLD: usize = 250;

/// An item reaching this many attempts is dropped before its next
/// dispatch — "at most two dispatch retries" (spec design notes §9).
pub const MAX_ATTEMPTS: u32 = 3;

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<UnprocessedItem> {
    Ok(UnprocessedItem {
        id: row.get(0)?,
        version: row.get::<_, i64>(1)? as u32,
        envelope: row.get(2)?,
        decrypted: row.get(3)?,
        timestamp: row.get::<_, i64>(4)? as u64,
        attempts: row.get::<_, i64>(5)? as u32,
    })
}

impl Storage {
    /// `add(id, bytes)`: insert with `version=2`, `attempts=1`.
    pub fn add_unprocessed(&self, item: &UnprocessedItem) -> Result<(), StorageError> {
        self.conn.lock().unwrap().execute(
            "INSERT OR REPLACE INTO unprocessed
             (id, version, envelope, decrypted, timestamp, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                item.id,
                item.version as i64,
                item.envelope,
                item.decrypted,
                item.timestamp as i64,
                item.attempts as i64,
            ],
        )?;
        Ok(())
    }

    /// `update(id, item)`: replace, typically to attach the decrypted
    /// payload after a successful session decrypt.
    pub fn update_unprocessed(&self, item: &UnprocessedItem) -> Result<bool, StorageError> {
        let rows = self.conn.lock().unwrap().execute(
            "UPDATE unprocessed SET version = ?1, envelope = ?2, decrypted = ?3,
             timestamp = ?4, attempts = ?5 WHERE id = ?6",
            params![
                item.version as i64,
                item.envelope,
                item.decrypted,
                item.timestamp as i64,
                item.attempts as i64,
                item.id,
            ],
        )?;
        Ok(rows > 0)
    }

    pub fn get_unprocessed(&self, id: &str) -> Result<Option<UnprocessedItem>, StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, version, envelope, decrypted, timestamp, attempts
             FROM unprocessed WHERE id = ?1",
            params![id],
            row_to_item,
        )
        .optional()
        .map_err(StorageError::Database)
    }

    pub fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, version, envelope, decrypted, timestamp, attempts
             FROM unprocessed ORDER BY timestamp",
        )?;
        let rows = stmt.query_map([], row_to_item)?;
        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    pub fn count_unprocessed(&self) -> Result<usize, StorageError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM unprocessed", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// `remove(id)`: called via the per-event `confirm` closure.
    pub fn remove_unprocessed(&self, id: &str) -> Result<bool, StorageError> {
        let rows = self
            .conn
            .lock()
            .unwrap()
            .execute("DELETE FROM unprocessed WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    pub fn remove_all_unprocessed(&self) -> Result<usize, StorageError> {
        let rows = self.conn.lock().unwrap().execute("DELETE FROM unprocessed", [])?;
        Ok(rows)
    }

    /// Startup scan. If the cache has grown past [`PURGE_THRESHOLD`], the
    /// whole cache is distrusted and dropped. Otherwise each surviving
    /// item's `attempts` is incremented and persisted; items whose
    /// incremented count reaches [`MAX_ATTEMPTS`] are removed instead of
    /// being returned for dispatch — the third attempt is consumed by the
    /// increment itself, never actually run.
    pub fn queue_all_cached(&self) -> Result<Vec<UnprocessedItem>, StorageError> {
        let all = self.get_all_unprocessed()?;
        if all.len() > PURGE_THRESHOLD {
            tracing::warn!(count = all.len(), "unprocessed cache exceeded purge threshold, dropping all");
            self.remove_all_unprocessed()?;
            return Ok(Vec::new());
        }

        let mut surviving = Vec::with_capacity(all.len());
        for mut item in all {
            item.attempts += 1;
            if item.attempts >= MAX_ATTEMPTS {
                tracing::warn!(id = %item.id, attempts = item.attempts, "dropping unprocessed item after max attempts");
                self.remove_unprocessed(&item.id)?;
                continue;
            }
            self.update_unprocessed(&item)?;
            surviving.push(item);
        }
        Ok(surviving)
    }
}
