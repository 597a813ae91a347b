//! Backend session provider.
//!
//! Holds the single process-wide session with the storage backend. The
//! session is loaded from the record store or created on first use, cached,
//! and replaced when the backend reports it invalid.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::backend::StorageBackend;
use crate::error::IngestError;
use crate::model::BackendSession;
use crate::sanitize::token_fingerprint;
use crate::store::JobRecordStore;

pub struct SessionProvider {
    backend: Arc<dyn StorageBackend>,
    store: Arc<dyn JobRecordStore>,
    current: Mutex<Option<Arc<BackendSession>>>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn StorageBackend>, store: Arc<dyn JobRecordStore>) -> Self {
        Self {
            backend,
            store,
            current: Mutex::new(None),
        }
    }

    /// Returns the cached session, loading or creating it on first call.
    ///
    /// Concurrent first calls are serialized; only one session is created.
    pub async fn acquire(&self) -> Result<Arc<BackendSession>, IngestError> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }

        let session = match self.store.get_session().await? {
            Some(stored) => {
                log::info!(
                    "Reusing stored backend session {} (token {})",
                    stored.id,
                    token_fingerprint(&stored.token)
                );
                Arc::new(stored)
            }
            None => self.create().await?,
        };

        self.backend.set_session_token(&session.token);
        *current = Some(session.clone());
        Ok(session)
    }

    /// Archives `stale` and replaces it with a freshly created session.
    ///
    /// If another caller already replaced `stale`, the current session is
    /// returned and nothing is archived again.
    pub async fn archive_and_recreate(
        &self,
        stale: &BackendSession,
    ) -> Result<Arc<BackendSession>, IngestError> {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            if session.id != stale.id {
                return Ok(session.clone());
            }
        }

        log::warn!("Archiving invalidated backend session {}", stale.id);
        self.store.save_session(&stale.to_archived()).await?;
        *current = None;

        let fresh = self.create().await?;
        self.backend.set_session_token(&fresh.token);
        *current = Some(fresh.clone());
        Ok(fresh)
    }

    /// The cached session, if one has been acquired.
    pub async fn current(&self) -> Option<Arc<BackendSession>> {
        self.current.lock().await.clone()
    }

    async fn create(&self) -> Result<Arc<BackendSession>, IngestError> {
        let credentials = self
            .backend
            .create_session()
            .await
            .map_err(|e| IngestError::backend("create_session", e))?;
        let session = BackendSession::new(&credentials.id, credentials.token);
        self.store.save_session(&session).await?;
        log::info!(
            "Created backend session {} (token {})",
            session.id,
            token_fingerprint(&session.token)
        );
        Ok(Arc::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteRecordStore;
    use crate::testing::FakeBackend;
    use secrecy::{ExposeSecret, SecretString};

    fn provider() -> (SessionProvider, Arc<FakeBackend>, Arc<SqliteRecordStore>) {
        let backend = Arc::new(FakeBackend::new());
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        (
            SessionProvider::new(backend.clone(), store.clone()),
            backend,
            store,
        )
    }

    #[tokio::test]
    async fn test_first_acquire_creates_and_persists() {
        let (sessions, backend, store) = provider();

        let session = sessions.acquire().await.unwrap();
        assert_eq!(backend.sessions_created(), 1);
        assert_eq!(
            backend.active_token().as_deref(),
            Some(session.token.expose_secret())
        );

        let stored = store.get_session().await.unwrap().unwrap();
        assert_eq!(stored.id, session.id);
    }

    #[tokio::test]
    async fn test_acquire_is_cached() {
        let (sessions, backend, _store) = provider();
        let a = sessions.acquire().await.unwrap();
        let b = sessions.acquire().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_stored_session_is_reused_across_restarts() {
        let backend = Arc::new(FakeBackend::new());
        let store = Arc::new(SqliteRecordStore::in_memory().unwrap());
        store
            .save_session(&BackendSession::new(
                "persisted",
                SecretString::from("old-token".to_string()),
            ))
            .await
            .unwrap();

        let sessions = SessionProvider::new(backend.clone(), store);
        let session = sessions.acquire().await.unwrap();
        assert_eq!(session.id, "persisted");
        assert_eq!(backend.sessions_created(), 0);
        assert_eq!(backend.active_token().as_deref(), Some("old-token"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_acquire_creates_one_session() {
        let (sessions, backend, _store) = provider();
        let sessions = Arc::new(sessions);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sessions = sessions.clone();
                tokio::spawn(async move { sessions.acquire().await.unwrap().id.clone() })
            })
            .collect();

        let ids = futures_util::future::join_all(handles).await;
        let first = ids[0].as_ref().unwrap().clone();
        assert!(ids.iter().all(|id| id.as_ref().unwrap() == &first));
        assert_eq!(backend.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_archive_and_recreate() {
        let (sessions, backend, store) = provider();
        let stale = sessions.acquire().await.unwrap();

        let fresh = sessions.archive_and_recreate(&stale).await.unwrap();
        assert_ne!(fresh.id, stale.id);
        assert_eq!(backend.sessions_created(), 2);

        let all = store.list_sessions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|s| s.id == stale.id && s.archived));
        assert_eq!(store.get_session().await.unwrap().unwrap().id, fresh.id);
    }

    #[tokio::test]
    async fn test_archive_of_already_replaced_session_is_a_no_op() {
        let (sessions, backend, _store) = provider();
        let stale = sessions.acquire().await.unwrap();

        let first = sessions.archive_and_recreate(&stale).await.unwrap();
        let second = sessions.archive_and_recreate(&stale).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(backend.sessions_created(), 2);
    }
}
