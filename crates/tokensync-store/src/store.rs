//! Registration info storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::StoreError;

/// Persistence of the serialized registration info of one installation.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// The last stored value, or `None` when nothing was ever stored.
    async fn get_last_registration_info(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored value.
    async fn set_last_registration_info(&self, info: &str) -> Result<(), StoreError>;
}

/// In-memory registration store for testing.
///
/// Besides the current value it keeps every write in order, so tests can
/// inspect what a workflow persisted and when.
pub struct MemoryRegistrationStore {
    value: RwLock<Option<String>>,
    writes: RwLock<Vec<String>>,
}

impl MemoryRegistrationStore {
    /// Create an empty memory store.
    pub fn new() -> Self {
        Self {
            value: RwLock::new(None),
            writes: RwLock::new(Vec::new()),
        }
    }

    /// Create a memory store holding `info`. The seed is not counted as a write.
    pub fn with_value(info: impl Into<String>) -> Self {
        Self {
            value: RwLock::new(Some(info.into())),
            writes: RwLock::new(Vec::new()),
        }
    }

    /// Every value written so far, oldest first.
    pub async fn writes(&self) -> Vec<String> {
        self.writes.read().await.clone()
    }

    pub async fn last_write(&self) -> Option<String> {
        self.writes.read().await.last().cloned()
    }
}

impl Default for MemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn get_last_registration_info(&self) -> Result<Option<String>, StoreError> {
        Ok(self.value.read().await.clone())
    }

    async fn set_last_registration_info(&self, info: &str) -> Result<(), StoreError> {
        *self.value.write().await = Some(info.to_string());
        self.writes.write().await.push(info.to_string());
        Ok(())
    }
}

/// File system based registration store.
///
/// One JSON file per installation:
/// ```text
/// {storage_path}/
/// └── {installation_id}.json
/// ```
/// Writes go to a sibling temporary file first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
pub struct FileRegistrationStore {
    storage_path: PathBuf,
    installation_id: String,
}

impl FileRegistrationStore {
    /// Create a file-based registration store.
    ///
    /// # Arguments
    /// * `storage_path` - Directory holding the registration files
    /// * `installation_id` - Key of the installation this store serves
    pub async fn new(
        storage_path: impl Into<PathBuf>,
        installation_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let storage_path = storage_path.into();
        let installation_id = installation_id.into();

        if installation_id.trim().is_empty() {
            return Err(StoreError::InvalidKey(installation_id));
        }

        fs::create_dir_all(&storage_path).await?;

        debug!(
            "FileRegistrationStore initialized at {:?} for installation '{}'",
            storage_path, installation_id
        );

        Ok(Self {
            storage_path,
            installation_id,
        })
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn installation_id(&self) -> &str {
        &self.installation_id
    }

    /// Path of the registration file.
    pub fn info_path(&self) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", Self::sanitize_installation_id(&self.installation_id)))
    }

    fn temp_path(&self) -> PathBuf {
        self.storage_path.join(format!(
            ".{}.json.tmp",
            Self::sanitize_installation_id(&self.installation_id)
        ))
    }

    /// Sanitize installation ID for use as a file name.
    fn sanitize_installation_id(installation_id: &str) -> String {
        installation_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }
}

#[async_trait]
impl RegistrationStore for FileRegistrationStore {
    async fn get_last_registration_info(&self) -> Result<Option<String>, StoreError> {
        let path = self.info_path();
        match fs::read_to_string(&path).await {
            Ok(content) => {
                trace!("Read registration info from {:?}", path);
                Ok(Some(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set_last_registration_info(&self, info: &str) -> Result<(), StoreError> {
        let path = self.info_path();
        let temp = self.temp_path();

        fs::write(&temp, info).await?;
        fs::rename(&temp, &path).await?;

        debug!(
            "Saved registration info for installation '{}' to {:?}",
            self.installation_id, path
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
