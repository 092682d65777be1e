// # File Parameter Store
//
// File-based implementation of ParameterStore with crash recovery.
//
// ## Purpose
//
// Keeps dedup markers across process restarts when no remote parameter
// service is available (local runs, single-host deployments).
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of the previous state
// - Recovery: Falls back to the backup if the main file does not parse
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "parameters": {
//     "/certflow/DnsCertificateSnsMessageId/app/uuid/Cert": {
//       "value": "3f1c...",
//       "description": "certflow: delivery dedup marker for DnsCertificate",
//       "last_updated": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::traits::parameter_store::{MarkerRecord, ParameterStore};
use crate::{Error, Removal};

/// Parameter file format version
const PARAMETER_FILE_VERSION: &str = "1.0";

/// File-based parameter store with crash recovery
///
/// Every mutation is written through to disk before it returns.
///
/// # Example
///
/// ```rust,no_run
/// use certflow_core::state::FileParameterStore;
/// use certflow_core::traits::ParameterStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileParameterStore::new("/var/lib/certflow/parameters.json").await?;
///     store.put_parameter("/certflow/x", "m1", "marker").await?;
///     assert_eq!(store.get_parameter("/certflow/x").await?, Some("m1".to_string()));
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileParameterStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    parameters: HashMap<String, MarkerRecord>,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ParameterFileFormat {
    version: String,
    parameters: HashMap<String, MarkerRecord>,
}

impl FileParameterStore {
    /// Create or load a file parameter store
    ///
    /// Creates parent directories as needed. A main file that does not
    /// parse is replaced by its backup; when the backup is unusable too the
    /// store starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create parameter directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let parameters = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                parameters,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, MarkerRecord>, Error> {
        match Self::load(path).await {
            Ok(parameters) => {
                tracing::debug!(count = parameters.len(), "Loaded parameters from file");
                Ok(parameters)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(error = %e, "Parameter file corrupted, attempting recovery from backup");

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty parameters.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(parameters) => {
                        tracing::info!(count = parameters.len(), "Recovered parameters from backup");
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(error = %restore_err, "Failed to restore parameter file from backup");
                        }
                        Ok(parameters)
                    }
                    Err(backup_err) => {
                        tracing::error!(error = %backup_err, "Backup also corrupted. Starting with empty parameters.");
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, MarkerRecord>, Error> {
        if !path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to read parameter file {}: {}",
                path.display(),
                e
            ))
        })?;
        let file: ParameterFileFormat = serde_json::from_str(&content)?;

        if file.version != PARAMETER_FILE_VERSION {
            tracing::warn!(
                expected = PARAMETER_FILE_VERSION,
                found = %file.version,
                "Parameter file version mismatch, loading anyway"
            );
        }
        Ok(file.parameters)
    }

    /// Write all parameters atomically
    async fn write(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let json = serde_json::to_string_pretty(&ParameterFileFormat {
            version: PARAMETER_FILE_VERSION.to_string(),
            parameters: guard.parameters.clone(),
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
            file.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!(error = %e, "Failed to create backup");
            }
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
        tracing::trace!(path = %self.path.display(), "Parameters written to file");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Full record of a parameter, including its write timestamp
    pub async fn get_record(&self, name: &str) -> Option<MarkerRecord> {
        self.state.read().await.parameters.get(name).cloned()
    }
}

#[async_trait]
impl ParameterStore for FileParameterStore {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>, Error> {
        let guard = self.state.read().await;
        Ok(guard.parameters.get(name).map(|record| record.value.clone()))
    }

    async fn put_parameter(&self, name: &str, value: &str, description: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard
                .parameters
                .insert(name.to_string(), MarkerRecord::new(value, description));
            guard.dirty = true;
        }
        self.write().await
    }

    async fn delete_parameter(&self, name: &str) -> Result<Removal, Error> {
        let removed = {
            let mut guard = self.state.write().await;
            let removed = guard.parameters.remove(name).is_some();
            guard.dirty |= removed;
            removed
        };
        if !removed {
            return Ok(Removal::AlreadyAbsent);
        }
        self.write().await?;
        Ok(Removal::Removed)
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}
