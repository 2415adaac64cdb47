// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps resource state across runs of the driver so that refresh, update
// and destroy act on what an earlier apply created.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
// - Refusal: A corrupted file with no usable backup fails to open rather
//   than opening empty
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "resources": {
//     "web_ip": {
//       "id": "192.0.2.10",
//       "kind": "reserved",
//       "address": "192.0.2.10",
//       "region": "us-east",
//       ...
//     }
//   }
// }
// ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::IpResourceState;
use crate::traits::state_store::StateStore;

/// State file format version
const STATE_FILE_VERSION: &str = "1";

/// File-based state store with crash recovery
///
/// Every mutation is written through immediately: the new content goes to a
/// `.tmp` sibling, the current file is copied to `.backup`, then the temp
/// file is renamed over the state file.
///
/// # Example
///
/// ```rust,no_run
/// use linode_ip_core::state::FileStateStore;
/// use linode_ip_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/linode-ip/state.json").await?;
///
///     for name in store.list().await? {
///         println!("managing {name}");
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    resources: BTreeMap<String, IpResourceState>,
    dirty: bool,
}

/// Serializable state file format
#[derive(Debug, Serialize, Deserialize)]
struct StateFileFormat {
    version: String,
    resources: BTreeMap<String, IpResourceState>,
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing state file, if any
    /// 3. Fall back to the backup when the main file is corrupted
    ///
    /// # Errors
    ///
    /// `Error::StateStore` when the main file cannot be parsed and no usable
    /// backup exists. The file is left untouched for manual repair.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let resources = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                resources,
                dirty: false,
            })),
        })
    }

    /// Path of the main state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, IpResourceState>, Error> {
        let err = match Self::load(path).await {
            Ok(resources) => {
                tracing::debug!(path = %path.display(), count = resources.len(), "loaded state");
                return Ok(resources);
            }
            Err(err @ Error::Json(_)) => err,
            Err(err) => return Err(err),
        };

        tracing::warn!(
            "State file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            err
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            return Err(Error::state_store(format!(
                "State file {} is unreadable ({}) and no backup exists at {}",
                path.display(),
                err,
                backup_path.display()
            )));
        }

        match Self::load(&backup_path).await {
            Ok(resources) => {
                tracing::info!("Recovered state from backup: {} resources", resources.len());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore state file from backup: {}", e);
                }
                Ok(resources)
            }
            Err(backup_err) => Err(Error::state_store(format!(
                "State file {} is unreadable ({}) and its backup {} is unusable ({})",
                path.display(),
                err,
                backup_path.display(),
                backup_err
            ))),
        }
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, IpResourceState>, Error> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!("Failed to read state file {}: {}", path.display(), e))
        })?;

        let file: StateFileFormat = serde_json::from_str(&content)?;

        if file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.resources)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let json = serde_json::to_string_pretty(&StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            resources: guard.resources.clone(),
        })?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.sync_all().await?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        self.path.with_extension("tmp")
    }

    fn backup_path(path: &Path) -> PathBuf {
        path.with_extension("backup")
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, name: &str) -> Result<Option<IpResourceState>, Error> {
        let guard = self.state.read().await;
        Ok(guard.resources.get(name).cloned())
    }

    async fn put(&self, name: &str, state: &IpResourceState) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.resources.insert(name.to_string(), state.clone());
            guard.dirty = true;
        }
        self.write().await
    }

    async fn remove(&self, name: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if guard.resources.remove(name).is_none() {
                return Ok(());
            }
            guard.dirty = true;
        }
        self.write().await
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        let guard = self.state.read().await;
        Ok(guard.resources.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use crate::traits::linode_api::IpAddressRecord;
    use tempfile::tempdir;

    fn state(address: &str) -> IpResourceState {
        IpResourceState::from_record(
            ResourceKind::InstanceBound,
            &IpAddressRecord {
                address: address.to_string(),
                gateway: Some("192.0.2.1".to_string()),
                subnet_mask: Some("255.255.255.0".to_string()),
                prefix: Some(24),
                ip_type: "ipv4".to_string(),
                public: true,
                rdns: None,
                linode_id: Some(123),
                region: Some("us-east".to_string()),
                reserved: false,
            },
        )
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        assert_eq!(store.path(), path);
        assert!(store.list().await.unwrap().is_empty());

        store.put("web", &state("192.0.2.10")).await.unwrap();
        assert!(path.exists());

        let reopened = FileStateStore::new(&path).await.unwrap();
        let loaded = reopened.get("web").await.unwrap().unwrap();
        assert_eq!(loaded, state_with_time(&loaded, "192.0.2.10"));
        assert_eq!(loaded.kind, ResourceKind::InstanceBound);
        assert_eq!(loaded.linode_id, Some(123));
    }

    fn state_with_time(template: &IpResourceState, address: &str) -> IpResourceState {
        IpResourceState {
            last_reconciled: template.last_reconciled,
            ..state(address)
        }
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put("web", &state("192.0.2.10")).await.unwrap();
        // second write leaves the first content in the backup
        store.put("db", &state("192.0.2.11")).await.unwrap();
        assert!(FileStateStore::backup_path(&path).exists());

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileStateStore::new(&path).await.unwrap();
        assert_eq!(recovered.list().await.unwrap(), vec!["web"]);
    }

    #[tokio::test]
    async fn test_unparseable_state_without_backup_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        // valid JSON, unknown resource kind
        let mut resource = serde_json::to_value(state("192.0.2.10")).unwrap();
        resource["kind"] = serde_json::json!("floating");
        let content = serde_json::json!({
            "version": STATE_FILE_VERSION,
            "resources": { "web": resource },
        });
        fs::write(&path, content.to_string()).await.unwrap();

        let err = FileStateStore::new(&path).await.unwrap_err();
        assert!(matches!(err, Error::StateStore(_)), "{err}");
        assert!(err.to_string().contains("state.json"), "{err}");

        // nothing was overwritten
        let on_disk = fs::read_to_string(&path).await.unwrap();
        assert!(on_disk.contains("floating"));
        assert!(!FileStateStore::backup_path(&path).exists());
    }

    #[tokio::test]
    async fn test_unusable_backup_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");

        fs::write(&path, b"corrupted json data").await.unwrap();
        fs::write(FileStateStore::backup_path(&path), b"also corrupted")
            .await
            .unwrap();

        let err = FileStateStore::new(&path).await.unwrap_err();
        assert!(matches!(err, Error::StateStore(_)), "{err}");
        assert!(err.to_string().contains("state.backup"), "{err}");
    }

    #[tokio::test]
    async fn test_file_store_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = FileStateStore::new(&path).await.unwrap();
        store.put("web", &state("192.0.2.10")).await.unwrap();
        store.remove("web").await.unwrap();
        store.remove("missing").await.unwrap();
        store.flush().await.unwrap();

        let reopened = FileStateStore::new(&path).await.unwrap();
        assert!(reopened.get("web").await.unwrap().is_none());
    }
}
