use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::SessionStore;
use crate::models::SessionKey;

/// A process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<SessionKey, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    fn get_name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: SessionKey) -> Result<Option<String>, String> {
        Ok(self.values.read().await.get(&key).cloned())
    }

    async fn set(&self, key: SessionKey, value: &str) -> Result<(), String> {
        self.values.write().await.insert(key, value.to_string());
        Ok(())
    }

    async fn remove(&self, key: SessionKey) -> Result<(), String> {
        self.values.write().await.remove(&key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), String> {
        self.values.write().await.clear();
        Ok(())
    }
}
