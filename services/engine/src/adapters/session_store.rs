//! services/engine/src/adapters/session_store.rs
//!
//! This module contains the file-backed session store, the concrete
//! implementation of the `SessionStore` port from the `core` crate. Sessions
//! live in an in-memory map that is mirrored to a single JSON file on every
//! mutation, which is the engine's stand-in for the browser-local storage the
//! hosting UI owns.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use studyhall_core::domain::ChatSession;
use studyhall_core::ports::{PortError, PortResult, SessionStore};
use tokio::sync::RwLock;
use tracing::warn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A session store that persists its whole map as one JSON document.
pub struct FileSessionStore {
    path: PathBuf,
    sessions: RwLock<HashMap<String, ChatSession>>,
}

impl FileSessionStore {
    /// Opens the store, loading any existing snapshot from `path`.
    ///
    /// A missing file is treated as an empty store; an unreadable snapshot is
    /// an error so the caller never silently loses history.
    pub async fn open(path: impl Into<PathBuf>) -> PortResult<Self> {
        let path = path.into();

        let sessions = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let list: Vec<ChatSession> = serde_json::from_str(&contents).map_err(|e| {
                    PortError::Unexpected(format!(
                        "Corrupt session snapshot at {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                list.into_iter().map(|s| (s.id.clone(), s)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(PortError::Unexpected(format!(
                    "Failed to read session snapshot at {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    async fn persist(&self, sessions: &HashMap<String, ChatSession>) -> PortResult<()> {
        let mut list: Vec<&ChatSession> = sessions.values().collect();
        // Stable on-disk order keeps snapshots diffable.
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let serialized = serde_json::to_string_pretty(&list)
            .map_err(|e| PortError::Unexpected(format!("Failed to serialize sessions: {}", e)))?;

        tokio::fs::write(&self.path, serialized).await.map_err(|e| {
            PortError::Unexpected(format!(
                "Failed to write session snapshot at {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

//=========================================================================================
// `SessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn list(&self) -> PortResult<Vec<ChatSession>> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<ChatSession> = sessions.values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn get(&self, session_id: &str) -> PortResult<ChatSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("chat session {}", session_id)))
    }

    async fn put(&self, session: &ChatSession) -> PortResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        self.persist(&sessions).await
    }

    async fn delete(&self, session_id: &str) -> PortResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.remove(session_id).is_none() {
            // Deleting an absent session is a no-op, matching the
            // remove-by-filter semantics callers expect from a KV store.
            warn!(session_id, "delete_session: no such session");
            return Ok(());
        }
        self.persist(&sessions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use studyhall_core::domain::{ChatMessage, ChatRole};

    fn sample_session(id: &str, title: &str) -> ChatSession {
        ChatSession {
            id: id.to_string(),
            title: title.to_string(),
            messages: vec![ChatMessage {
                id: format!("{id}-m1"),
                role: ChatRole::User,
                content: "hello".to_string(),
                timestamp: Utc::now(),
                attachments: None,
            }],
            documents: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            model: "llama-3.1-8b-instant".to_string(),
        }
    }

    #[tokio::test]
    async fn round_trips_sessions_through_the_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");

        let store = FileSessionStore::open(&path).await.unwrap();
        store.put(&sample_session("s1", "Biology")).await.unwrap();
        store.put(&sample_session("s2", "History")).await.unwrap();

        // A second store opened on the same file sees both sessions.
        let reopened = FileSessionStore::open(&path).await.unwrap();
        let list = reopened.list().await.unwrap();
        assert_eq!(list.len(), 2);

        let loaded = reopened.get("s1").await.unwrap();
        assert_eq!(loaded.title, "Biology");
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].content, "hello");
    }

    #[tokio::test]
    async fn get_reports_not_found_for_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions.json"))
            .await
            .unwrap();

        match store.get("missing").await {
            Err(PortError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other.map(|s| s.id)),
        }
    }

    #[tokio::test]
    async fn delete_removes_a_session_and_tolerates_absentees() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        let store = FileSessionStore::open(&path).await.unwrap();

        store.put(&sample_session("s1", "Chemistry")).await.unwrap();
        store.delete("s1").await.unwrap();
        store.delete("s1").await.unwrap(); // second delete is a no-op

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_snapshot_file_is_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("never_written.json"))
            .await
            .unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
