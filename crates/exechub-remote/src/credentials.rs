use crate::RemoteError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable read by [`EnvToken::default`].
pub const TOKEN_ENV: &str = "EXECHUB_TOKEN";

/// Source of an opaque registry access token.
pub trait CredentialProvider: Send + Sync {
    /// `Ok(None)` when this provider has no token to offer.
    fn access_token(&self) -> Result<Option<String>, RemoteError>;
}

pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> Result<Option<String>, RemoteError> {
        Ok(self.0.clone())
    }
}

pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: &str) -> Self {
        Self {
            var: var.to_owned(),
        }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV)
    }
}

impl CredentialProvider for EnvToken {
    fn access_token(&self) -> Result<Option<String>, RemoteError> {
        Ok(std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty()))
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    access_token: Option<String>,
}

/// Reads `{ "access_token": "..." }` from a JSON file.
pub struct FileToken {
    path: PathBuf,
}

impl FileToken {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/exechub/credentials.json`, or `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config/exechub/credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileToken {
    fn access_token(&self) -> Result<Option<String>, RemoteError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            RemoteError::Config(format!(
                "invalid credentials file {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(parsed.access_token.filter(|t| !t.trim().is_empty()))
    }
}

/// Tries each provider in order; the first token wins.
#[derive(Default)]
pub struct ChainProvider {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl ChainProvider {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }
}

impl CredentialProvider for ChainProvider {
    fn access_token(&self) -> Result<Option<String>, RemoteError> {
        for provider in &self.providers {
            if let Some(token) = provider.access_token()? {
                return Ok(Some(token));
            }
        }
        Ok(None)
    }
}

/// Explicit token, then `EXECHUB_TOKEN`, then the credentials file.
pub fn default_chain(explicit: Option<String>) -> ChainProvider {
    let chain = ChainProvider::new()
        .with(StaticToken::new(explicit))
        .with(EnvToken::default());
    match FileToken::default_path() {
        Some(path) => chain.with(FileToken::new(path)),
        None => chain,
    }
}
