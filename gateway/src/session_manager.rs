//! Tracks every live session by its Discord-assigned session ID, the way
//! [`crate::client::Client`] hands out commands and lifecycle queries across
//! however many shards it runs.
//!
//! A session has no ID to store under until its first `READY`/`RESUMED`;
//! sessions earlier in their handshake simply aren't in this map yet.

use crate::session::Session;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;

/// The Discord-assigned opaque session ID a session is stored under, per
/// spec.md's data model (`SessionID`, not a shard index).
pub type SessionId = Box<str>;

/// A concurrent map of [`SessionId`] to its running [`Session`].
#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: impl Into<SessionId>, session: Arc<Session>) {
        self.sessions.write().await.insert(id.into(), session);
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot every running session, e.g. to fan a command out to all of
    /// them.
    pub async fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::SessionManager;
    use crate::{
        model::Intents,
        session::{Config, ConfigBuilder, Session},
    };
    use std::sync::Arc;

    fn session() -> Arc<Session> {
        let config: Config = ConfigBuilder::new("token", Intents::empty()).build();
        Arc::new(Session::new(Arc::new(config)))
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let manager = SessionManager::new();
        manager.insert("abc123", session()).await;

        assert!(manager.get("abc123").await.is_some());
        assert!(manager.get("nope").await.is_none());
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn remove_drops_the_session() {
        let manager = SessionManager::new();
        manager.insert("abc123", session()).await;
        manager.remove("abc123").await;

        assert!(manager.is_empty().await);
    }

    #[tokio::test]
    async fn ids_lists_every_session() {
        let manager = SessionManager::new();
        manager.insert("abc123", session()).await;
        manager.insert("def456", session()).await;

        let mut ids = manager.ids().await;
        ids.sort_unstable();
        assert_eq!(ids, vec![Box::from("abc123"), Box::from("def456")]);
    }
}
