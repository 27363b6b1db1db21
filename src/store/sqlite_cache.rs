// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Async [`UnprocessedCacheStore`] adapter over the synchronous
//! [`crate::storage::Storage`].
//!
//! `rusqlite` is blocking; every call is moved onto a blocking thread with
//! `tokio::task::spawn_blocking`, the standard tokio idiom for wrapping a
//! synchronous database driver inside an async trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::UnprocessedItem;
use crate::storage::Storage;

use super::contracts::{StoreError, UnprocessedCacheStore};

/// Adapts [`Storage`] to [`UnprocessedCacheStore`].
pub struct SqliteUnprocessedCache {
    storage: Arc<Storage>,
}

impl SqliteUnprocessedCache {
    pub fn new(storage: Arc<Storage>) -> Self {
        SqliteUnprocessedCache { storage }
    }
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Backend(format!("blocking task panicked: {e}"))
}

#[async_trait]
impl UnprocessedCacheStore for SqliteUnprocessedCache {
    async fn add_unprocessed(&self, item: &UnprocessedItem) -> Result<(), StoreError> {
        let storage = self.storage.clone();
        let item = item.clone();
        tokio::task::spawn_blocking(move || storage.add_unprocessed(&item))
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn update_unprocessed(&self, item: &UnprocessedItem) -> Result<(), StoreError> {
        let storage = self.storage.clone();
        let item = item.clone();
        tokio::task::spawn_blocking(move || storage.update_unprocessed(&item))
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_unprocessed(&self, id: &str) -> Result<Option<UnprocessedItem>, StoreError> {
        let storage = self.storage.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || storage.get_unprocessed(&id))
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get_all_unprocessed(&self) -> Result<Vec<UnprocessedItem>, StoreError> {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.get_all_unprocessed())
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn count_unprocessed(&self) -> Result<usize, StoreError> {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.count_unprocessed())
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn remove_unprocessed(&self, id: &str) -> Result<(), StoreError> {
        let storage = self.storage.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || storage.remove_unprocessed(&id))
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn remove_all_unprocessed(&self) -> Result<(), StoreError> {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.remove_all_unprocessed())
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn queue_all_cached(&self) -> Result<Vec<UnprocessedItem>, StoreError> {
        let storage = self.storage.clone();
        tokio::task::spawn_blocking(move || storage.queue_all_cached())
            .await
            .map_err(join_error)?
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_get_remove_round_trip_through_the_async_adapter() {
        let cache = SqliteUnprocessedCache::new(Arc::new(Storage::in_memory().unwrap()));
        let item = UnprocessedItem::new("a.1 1000".to_string(), vec![1, 2, 3], 1_000);

        cache.add_unprocessed(&item).await.unwrap();
        let fetched = cache.get_unprocessed("a.1 1000").await.unwrap().unwrap();
        assert_eq!(fetched.envelope, vec![1, 2, 3]);

        cache.remove_unprocessed("a.1 1000").await.unwrap();
        assert!(cache.get_unprocessed("a.1 1000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn queue_all_cached_matches_the_sync_behavior() {
        let cache = SqliteUnprocessedCache::new(Arc::new(Storage::in_memory().unwrap()));
        cache
            .add_unprocessed(&UnprocessedItem::new(
                "a.1 1000".to_string(),
                vec![1],
                1_000,
            ))
            .await
            .unwrap();

        let surviving = cache.queue_all_cached().await.unwrap();
        assert_eq!(surviving.len(), 1);
        assert_eq!(surviving[0].attempts, 2);
    }
}
