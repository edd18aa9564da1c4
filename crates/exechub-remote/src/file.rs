use crate::{CatalogEntry, CatalogIndex, CatalogQuery, RegistryBackend, RemoteError, WriteCondition};
use exechub_schema::ImageIdentity;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const CATALOG_FILE: &str = "catalog.json";
const LOCK_FILE: &str = ".catalog.lock";

/// Directory-backed registry.
///
/// Layout:
/// - `images/<namespace>/<name>/<version>.img` — saved image archives
/// - `catalog.json` — the [`CatalogIndex`]
///
/// Every write lands in a temp file in the same directory and is renamed
/// into place, so readers see either the old or the new content.
pub struct FileRegistry {
    root: PathBuf,
}

struct CatalogLock {
    file: File,
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl FileRegistry {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let root = root.into();
        fs::create_dir_all(root.join("images"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn image_path(&self, identity: &ImageIdentity) -> PathBuf {
        self.root
            .join("images")
            .join(&identity.namespace)
            .join(&identity.name)
            .join(format!("{}.img", identity.version))
    }

    fn lock(&self) -> Result<CatalogLock, RemoteError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.root.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(CatalogLock { file })
    }

    fn read_index(&self) -> Result<CatalogIndex, RemoteError> {
        match fs::read(self.root.join(CATALOG_FILE)) {
            Ok(data) => CatalogIndex::from_bytes(&data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CatalogIndex::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(dest: &Path, data: &[u8]) -> Result<(), RemoteError> {
        let dir = dest
            .parent()
            .ok_or_else(|| RemoteError::Config(format!("no parent for {}", dest.display())))?;
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| RemoteError::Io(e.error))?;
        Ok(())
    }
}

impl RegistryBackend for FileRegistry {
    fn location(&self) -> String {
        format!("file://{}", self.root.display())
    }

    fn requires_auth(&self) -> bool {
        false
    }

    fn push_image(&self, identity: &ImageIdentity, data: &[u8]) -> Result<(), RemoteError> {
        let path = self.image_path(identity);
        debug!("write {} ({} bytes)", path.display(), data.len());
        Self::write_atomic(&path, data)
    }

    fn pull_image(&self, identity: &ImageIdentity) -> Result<Vec<u8>, RemoteError> {
        let path = self.image_path(identity);
        debug!("read {}", path.display());
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RemoteError::NotFound(identity.to_string())
            } else {
                RemoteError::Io(e)
            }
        })
    }

    fn lookup(&self, identity: &ImageIdentity) -> Result<Option<CatalogEntry>, RemoteError> {
        Ok(self.read_index()?.get(identity).cloned())
    }

    fn upsert(&self, entry: &CatalogEntry, condition: WriteCondition) -> Result<(), RemoteError> {
        let _lock = self.lock()?;
        let mut index = self.read_index()?;
        if condition == WriteCondition::MustNotExist && index.get(&entry.identity).is_some() {
            return Err(RemoteError::Conflict(entry.identity.to_string()));
        }
        index.upsert(entry.clone());
        Self::write_atomic(&self.root.join(CATALOG_FILE), &index.to_bytes()?)
    }

    fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, RemoteError> {
        Ok(self.read_index()?.search(query))
    }
}
