use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{file_store::FileStore, memory_store::MemoryStore};
use crate::config::SessionStoreConfig;
use crate::models::{Session, SessionKey};

/// The SessionStore trait abstracts client-local session storage (get, set, remove, clear).
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn get_name(&self) -> &str;
    async fn get(&self, key: SessionKey) -> Result<Option<String>, String>;
    async fn set(&self, key: SessionKey, value: &str) -> Result<(), String>;
    async fn remove(&self, key: SessionKey) -> Result<(), String>;
    /// Drop every key. Called on logout and on terminal refresh failure.
    async fn clear(&self) -> Result<(), String>;

    /// Read all session keys at once.
    async fn load(&self) -> Result<Session, String> {
        let mut session = Session::default();
        for key in SessionKey::ALL {
            session.set(key, self.get(key).await?);
        }
        Ok(session)
    }

    /// Persist `session`, removing keys it does not carry.
    async fn save(&self, session: &Session) -> Result<(), String> {
        for key in SessionKey::ALL {
            match session.get(key) {
                Some(value) => self.set(key, value).await?,
                None => self.remove(key).await?,
            }
        }
        Ok(())
    }
}

/// Creates a concrete store implementation based on the SessionStoreConfig.
pub fn create_store(config: &SessionStoreConfig) -> Arc<dyn SessionStore> {
    match config {
        SessionStoreConfig::Memory => {
            info!("Session store: in-memory (session ends with the process).");
            Arc::new(MemoryStore::new())
        }
        SessionStoreConfig::File { path } => {
            info!("Session store: file at {}", path.display());
            Arc::new(FileStore::new(path.clone()))
        }
    }
}

/// Read a single key, treating storage errors as "absent".
///
/// Used on paths where a missing value is already a handled case (e.g.
/// attaching a credential), so a broken store degrades to unauthenticated.
pub async fn get_or_none(store: &dyn SessionStore, key: SessionKey) -> Option<String> {
    match store.get(key).await {
        Ok(value) => value,
        Err(e) => {
            debug!(
                "Session store '{}' failed to read '{}': {}",
                store.get_name(),
                key,
                e
            );
            None
        }
    }
}
