//! JSON-file durable store
//!
//! Each key is one document under the store directory. Writes go to a
//! temporary file which is fsynced and then renamed over the previous
//! document, so a crash leaves either the old or the new contents. A SHA-256
//! sidecar is written after the rename and checked on load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_core::DurableStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

/// On-disk format version
const PERSISTENCE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntries {
    version: u32,
    saved_at: i64,
    item_count: usize,
    items: Vec<Value>,
}

/// Durable store writing one JSON document per key under `dir`
#[derive(Debug, Clone)]
pub struct FileDurableStore {
    dir: PathBuf,
}

impl FileDurableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the document holding `key`
    pub fn document_path(&self, key: &str) -> CommonResult<PathBuf> {
        let valid = !key.is_empty()
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(CommonError::validation_with_value(
                "storage_key",
                "only ASCII letters, digits, '_', '-' and '.' are allowed",
                key,
            ));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    fn checksum(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    async fn load(&self, key: &str) -> CommonResult<Vec<Value>> {
        let path = self.document_path(key)?;
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No saved entries");
                return Ok(Vec::new());
            }
            Err(err) => return Err(CommonError::persistence_op("read", err.to_string())),
        };

        let checksum_path = path.with_extension("sha256");
        if let Ok(expected) = fs::read_to_string(&checksum_path).await {
            if expected.trim() != Self::checksum(&data) {
                warn!(path = %path.display(), "Checksum mismatch, file may be corrupted");
            }
        }

        let persisted: PersistedEntries = serde_json::from_slice(&data)
            .map_err(|err| CommonError::serialization_format("json", err.to_string()))?;

        if persisted.version != PERSISTENCE_VERSION {
            warn!(
                expected = PERSISTENCE_VERSION,
                found = persisted.version,
                "Persistence version mismatch"
            );
        }

        debug!(count = persisted.items.len(), "Loaded saved entries");
        Ok(persisted.items)
    }

    #[instrument(skip(self, entries), fields(dir = %self.dir.display(), count = entries.len()))]
    async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()> {
        let path = self.document_path(key)?;
        let persisted = PersistedEntries {
            version: PERSISTENCE_VERSION,
            saved_at: Utc::now().timestamp_millis(),
            item_count: entries.len(),
            items: entries.to_vec(),
        };
        let data = serde_json::to_vec(&persisted)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|err| CommonError::persistence_op("create_dir", err.to_string()))?;

        // Write to a temporary file first for atomicity
        let temp_path = path.with_extension("json.tmp");
        let write = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &path).await
        };
        if let Err(err) = write.await {
            fs::remove_file(&temp_path).await.ok();
            return Err(CommonError::persistence_op("write", err.to_string()));
        }

        let checksum_path = path.with_extension("sha256");
        if let Err(err) = fs::write(&checksum_path, Self::checksum(&data)).await {
            warn!(error = %err, "Failed to write checksum sidecar");
        }

        debug!(bytes = data.len(), "Saved entries");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_missing_document_loads_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(dir.path());

        assert!(store.load("offline_queue").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(dir.path().join("nested"));

        store.save("offline_queue", &[json!({ "id": "a" }), json!({ "id": "b" })]).await.unwrap();
        store.save("offline_queue", &[json!({ "id": "c" })]).await.unwrap();

        let loaded = store.load("offline_queue").await.unwrap();
        assert_eq!(loaded, vec![json!({ "id": "c" })]);
        assert!(!dir.path().join("nested/offline_queue.json.tmp").exists());
        assert!(dir.path().join("nested/offline_queue.sha256").exists());
    }

    #[tokio::test]
    async fn test_checksum_sidecar_matches_document() {
        let dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(dir.path());
        store.save("q", &[json!(1)]).await.unwrap();

        let data = std::fs::read(dir.path().join("q.json")).unwrap();
        let sidecar = std::fs::read_to_string(dir.path().join("q.sha256")).unwrap();
        assert_eq!(sidecar, FileDurableStore::checksum(&data));
    }

    #[tokio::test]
    async fn test_unreadable_document_is_an_error_and_left_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("offline_queue.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = FileDurableStore::new(dir.path());

        let err = store.load("offline_queue").await.unwrap_err();

        assert_eq!(err.error_type_name(), "serialization");
        assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
    }

    #[test]
    fn test_keys_cannot_escape_the_directory() {
        let store = FileDurableStore::new("/tmp/queue");

        assert!(store.document_path("../etc/passwd").is_err());
        assert!(store.document_path(".hidden").is_err());
        assert!(store.document_path("").is_err());
        assert_eq!(
            store.document_path("offline_queue").unwrap(),
            PathBuf::from("/tmp/queue/offline_queue.json")
        );
    }
}
