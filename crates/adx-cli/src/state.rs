//! JSON file standing in for the extension's local storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use adx_core::storage::{KeyValueStore, StorageError};

/// Every key lives in one JSON object on disk. Writes replace the file
/// through a temporary sibling.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StorageError> {
        read_object(&self.path).await
    }

    async fn write_all(&self, values: &Map<String, Value>) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(values)?;
        write_atomic(&self.path, text.as_bytes())
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to write '{}': {}", self.path.display(), e)))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value);
        self.write_all(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut values = self.read_all().await?;
        if values.remove(key).is_some() {
            self.write_all(&values).await?;
        }
        Ok(())
    }
}

/// Read a JSON object file. A missing or empty file is an empty object.
async fn read_object(path: &Path) -> Result<Map<String, Value>, StorageError> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => {
            return Err(StorageError::Backend(format!(
                "Failed to read '{}': {}",
                path.display(),
                e
            )))
        }
    };
    if text.trim().is_empty() {
        return Ok(Map::new());
    }
    Ok(serde_json::from_str(&text)?)
}

pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

#[cfg(test)]
pub(crate) fn scratch_path(name: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("adx-cli-{}-{}-{}.json", std::process::id(), n, name))
}
