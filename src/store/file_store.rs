use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::SessionStore;
use crate::models::SessionKey;

type Entries = BTreeMap<String, String>;

/// Keeps the session in a flat JSON object on disk, keyed like browser local storage.
///
/// Every write rewrites the whole file through a sibling temp file and a rename.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        FileStore {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read_entries(&self) -> Result<Entries, String> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Entries::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                format!("Session file {} is not valid JSON: {}", self.path.display(), e)
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Entries::new()),
            Err(e) => Err(format!(
                "Failed to read session file {}: {}",
                self.path.display(),
                e
            )),
        }
    }

    async fn write_entries(&self, entries: &Entries) -> Result<(), String> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
        }

        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| format!("Failed to serialize session: {}", e))?;
        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| format!("Failed to replace {}: {}", self.path.display(), e))?;

        debug!("Session file {} updated", self.path.display());
        Ok(())
    }

    async fn update<F>(&self, f: F) -> Result<(), String>
    where
        F: FnOnce(&mut Entries) + Send,
    {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        f(&mut entries);
        self.write_entries(&entries).await
    }
}

#[async_trait]
impl SessionStore for FileStore {
    fn get_name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: SessionKey) -> Result<Option<String>, String> {
        let _guard = self.lock.lock().await;
        Ok(self.read_entries().await?.remove(key.as_str()))
    }

    async fn set(&self, key: SessionKey, value: &str) -> Result<(), String> {
        let value = value.to_string();
        self.update(move |entries| {
            entries.insert(key.as_str().to_string(), value);
        })
        .await
    }

    async fn remove(&self, key: SessionKey) -> Result<(), String> {
        self.update(move |entries| {
            entries.remove(key.as_str());
        })
        .await
    }

    async fn clear(&self) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!(
                "Failed to remove session file {}: {}",
                self.path.display(),
                e
            )),
        }
    }
}

/// `<file name>.tmp` next to `path`, never `path` itself.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
