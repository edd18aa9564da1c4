use crate::HubError;
use exechub_schema::ImageIdentity;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

/// Exclusive lock serializing publishes of one image identity on this host.
pub struct IdentityLock {
    lock_file: File,
    path: PathBuf,
}

impl IdentityLock {
    pub fn path_for(lock_dir: &Path, identity: &ImageIdentity) -> PathBuf {
        lock_dir.join(format!("{}.lock", identity.key()))
    }

    fn open(path: &Path) -> Result<File, HubError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?)
    }

    /// Block until the lock for `identity` is held.
    pub fn acquire(lock_dir: &Path, identity: &ImageIdentity) -> Result<Self, HubError> {
        let path = Self::path_for(lock_dir, identity);
        let file = Self::open(&path)?;
        file.lock_exclusive()
            .map_err(|e| HubError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;
        Ok(Self {
            lock_file: file,
            path,
        })
    }

    pub fn try_acquire(lock_dir: &Path, identity: &ImageIdentity) -> Result<Option<Self>, HubError> {
        let path = Self::path_for(lock_dir, identity);
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                lock_file: file,
                path,
            })),
            Err(_) => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IdentityLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn install_signal_handler() {
    let _ = ctrlc::set_handler(move || {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            std::process::exit(130);
        }
        SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
        eprintln!("\nshutdown requested, cleaning up test containers...");
    });
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
