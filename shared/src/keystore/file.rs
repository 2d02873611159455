//! One JSON file per party. Writes go to a temp file in the same directory
//! followed by a rename, so readers never observe a half-written record.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{check_id, KeyRecord, KeyStore, KeyStoreError};

pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (and create if needed) the key directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, KeyStoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, KeyStoreError> {
        check_id(id)?;
        Ok(self.dir.join(format!("{}.json", id)))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn get(&self, id: &str) -> Result<Option<KeyRecord>, KeyStoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, id: &str, record: &KeyRecord) -> Result<(), KeyStoreError> {
        let path = self.path_for(id)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        let bytes = serde_json::to_vec_pretty(record)?;

        tokio::fs::write(&tmp, &bytes).await?;
        #[cfg(unix)]
        if record.private_key.is_some() {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(location_id = %id, path = %path.display(), "Key record written");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, KeyStoreError> {
        let path = self.path_for(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, KeyStoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(".json") {
                if check_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
