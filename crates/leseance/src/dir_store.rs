//! JSON-file-per-session directory store
//!
//! One `<session-id>.json` file per record. Writes go through a temporary
//! sibling followed by an atomic rename so a crash never leaves a
//! half-written record behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::model::{SessionId, SessionRecord, UserId};
use crate::store::{SessionStore, StoreError};

/// Directory-backed session store.
pub struct DirSessionStore {
    root: PathBuf,
}

impl DirSessionStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn read_record(path: &Path) -> Result<SessionRecord, StoreError> {
        let bytes = tokio::fs::read(path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl SessionStore for DirSessionStore {
    async fn put(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.record_path(id);
        match Self::read_record(&path).await {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<SessionRecord>, StoreError> {
        let mut mine = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) if &record.user_id == user => mine.push(record),
                Ok(_) => {}
                Err(e) => {
                    // An unreadable record must not take down listing.
                    warn!(path = %path.display(), error = %e, "skipping unreadable session record");
                }
            }
        }
        mine.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        mine.truncate(limit);
        Ok(mine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionKind;
    use tempfile::tempdir;

    fn record_for(user: &str) -> SessionRecord {
        SessionRecord::new(
            UserId::from_string(user),
            SessionKind::Syllabus,
            serde_json::json!({
                "course_info": {"title": "Biology 101"},
                "learning_objectives": ["cells"],
            }),
        )
    }

    #[tokio::test]
    async fn put_persists_and_get_reloads() {
        let dir = tempdir().expect("tempdir");
        let store = DirSessionStore::open(dir.path()).expect("open");

        let rec = record_for("user-1");
        store.put(&rec).await.expect("put");

        let loaded = store.get(&rec.id).await.expect("get").expect("present");
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.kind, SessionKind::Syllabus);
    }

    #[tokio::test]
    async fn put_replaces_previous_version() {
        let dir = tempdir().expect("tempdir");
        let store = DirSessionStore::open(dir.path()).expect("open");

        let mut rec = record_for("user-1");
        store.put(&rec).await.expect("first put");
        rec.transition(crate::model::SessionStatus::Running)
            .expect("queued -> running");
        store.put(&rec).await.expect("second put");

        let loaded = store.get(&rec.id).await.expect("get").expect("present");
        assert_eq!(loaded.status, crate::model::SessionStatus::Running);
    }

    #[tokio::test]
    async fn listing_skips_corrupt_files() {
        let dir = tempdir().expect("tempdir");
        let store = DirSessionStore::open(dir.path()).expect("open");

        store.put(&record_for("user-1")).await.expect("put");
        std::fs::write(dir.path().join("garbage.json"), b"not json").expect("write garbage");

        let mine = store
            .list_for_user(&UserId::from_string("user-1"), 10)
            .await
            .expect("list");
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn missing_record_is_none() {
        let dir = tempdir().expect("tempdir");
        let store = DirSessionStore::open(dir.path()).expect("open");
        let missing = store
            .get(&SessionId::from_string("absent"))
            .await
            .expect("get");
        assert!(missing.is_none());
    }
}
