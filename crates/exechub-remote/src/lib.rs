//! Catalog and registry access for exechub.
//!
//! This crate provides the catalog data model (entries, filtered search,
//! deterministic ordering), the `RegistryBackend` trait with HTTP and
//! directory-backed implementations, bounded retry for transient transport
//! faults, and credential providers for registry authentication.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod file;
pub mod http;
pub mod retry;

pub use catalog::{highest_version, sort_entries, CatalogEntry, CatalogIndex, CatalogQuery, HostInfo};
pub use config::{RegistryLocation, RemoteConfig};
pub use credentials::{
    default_chain, ChainProvider, CredentialProvider, EnvToken, FileToken, StaticToken,
};
pub use file::FileRegistry;
pub use http::HttpRegistry;
pub use retry::RetryPolicy;

use exechub_schema::ImageIdentity;
use thiserror::Error;

/// Protocol version sent as `X-Hub-Protocol` header on all HTTP requests.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("authentication failed: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("catalog entry already exists: {0}")]
    Conflict(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("integrity failure for '{key}': expected {expected}, got {actual}")]
    IntegrityFailure {
        key: String,
        expected: String,
        actual: String,
    },
}

impl RemoteError {
    /// Whether repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }
}

/// Precondition for a catalog write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCondition {
    /// Insert or replace.
    Any,
    /// Fail with `Conflict` if an entry already exists at the identity.
    MustNotExist,
}

/// Narrow interface over an image registry and its catalog.
pub trait RegistryBackend: Send + Sync {
    /// Human-readable location, for logs and summaries.
    fn location(&self) -> String;

    /// Whether pushes to this registry need an access token.
    fn requires_auth(&self) -> bool;

    fn push_image(&self, identity: &ImageIdentity, data: &[u8]) -> Result<(), RemoteError>;

    fn pull_image(&self, identity: &ImageIdentity) -> Result<Vec<u8>, RemoteError>;

    fn lookup(&self, identity: &ImageIdentity) -> Result<Option<CatalogEntry>, RemoteError>;

    /// Write `entry`, replacing any prior entry for the same identity in one step.
    fn upsert(&self, entry: &CatalogEntry, condition: WriteCondition) -> Result<(), RemoteError>;

    /// Entries matching `query`, in catalog order.
    fn search(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, RemoteError>;
}

/// Open the registry named by `config.url`.
pub fn open_registry(config: &RemoteConfig) -> Result<Box<dyn RegistryBackend>, RemoteError> {
    match config.location()? {
        RegistryLocation::Http(_) => Ok(Box::new(HttpRegistry::new(config.clone()))),
        RegistryLocation::File(path) => Ok(Box::new(FileRegistry::open(path)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(RemoteError::Network("reset".to_owned()).is_transient());
        assert!(!RemoteError::Conflict("x".to_owned()).is_transient());
        assert!(!RemoteError::Unauthorized("x".to_owned()).is_transient());
        assert!(!RemoteError::NotFound("x".to_owned()).is_transient());
        assert!(!RemoteError::IntegrityFailure {
            key: "k".to_owned(),
            expected: "a".to_owned(),
            actual: "b".to_owned(),
        }
        .is_transient());
    }

    #[test]
    fn open_registry_by_url_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let file_url = format!("file://{}", dir.path().display());
        let reg = open_registry(&RemoteConfig::new(&file_url)).unwrap();
        assert!(!reg.requires_auth());

        let http = open_registry(&RemoteConfig::new("https://hub.example.com/api")).unwrap();
        assert!(http.requires_auth());
        assert_eq!(http.location(), "https://hub.example.com/api");
    }
}
