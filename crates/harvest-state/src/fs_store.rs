use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::record::BackupDescriptor;
use crate::storage_traits::{object_key, ObjectStore, StorageResult};

/// Filesystem-backed object store.
///
/// Layout: `<root>/<agency>/<file name>`. Writes go through a temp file in
/// the target directory and are renamed into place.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_atomic(&self, target: &Path, data: &[u8]) -> StorageResult<()> {
        let dir = target.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StorageError::io(dir, e))?;
        tmp.write_all(data).map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(target)
            .map_err(|e| StorageError::io(target, e.error))?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn upload_file(&self, path: &Path, agency_id: &str) -> StorageResult<BackupDescriptor> {
        let key = object_key(path, agency_id)?;
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::io(path, e))?;

        let target = self.root.join(&key);
        self.write_atomic(&target, &data)?;
        debug!(key = %key, "Stored object on filesystem");

        Ok(BackupDescriptor::for_bytes(
            format!("file://{}", target.display()),
            &data,
        ))
    }
}
