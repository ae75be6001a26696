//! Session persistence trait and in-memory implementation

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{SessionId, SessionRecord, UserId};

/// Errors surfaced by session persistence backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// Record (de)serialization failure.
    #[error("serialization failure: {0}")]
    Serde(#[from] serde_json::Error),

    /// The backend refused service; the caller should retry.
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable record store for sessions.
///
/// Each record is written only by its owning orchestration loop; `put`
/// therefore replaces whole records rather than patching fields.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError>;

    /// Fetch one record by id.
    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// A user's records, newest first, at most `limit`.
    async fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError>;
}

/// Map-backed store for tests and single-process deployments.
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.records.read().await;
        let mut mine: Vec<SessionRecord> = records
            .values()
            .filter(|r| &r.user_id == user)
            .cloned()
            .collect();
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit);
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionKind;

    fn record_for(user: &str) -> SessionRecord {
        SessionRecord::new(
            UserId::from_string(user),
            SessionKind::VoiceClone,
            serde_json::json!({"text": "hi", "reference_audio_uri": "/media/r.wav"}),
        )
    }

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let store = MemorySessionStore::new();
        let rec = record_for("user-1");
        store.put(&rec).await.expect("put");

        let loaded = store.get(&rec.id).await.expect("get").expect("present");
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.user_id, rec.user_id);
    }

    #[tokio::test]
    async fn get_unknown_id_is_none() {
        let store = MemorySessionStore::new();
        let missing = store
            .get(&SessionId::from_string("nope"))
            .await
            .expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_user_and_bounded() {
        let store = MemorySessionStore::new();
        for _ in 0..3 {
            store.put(&record_for("user-a")).await.expect("put");
        }
        store.put(&record_for("user-b")).await.expect("put");

        let mine = store
            .list_for_user(&UserId::from_string("user-a"), 2)
            .await
            .expect("list");
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.user_id.as_str() == "user-a"));
    }
}
