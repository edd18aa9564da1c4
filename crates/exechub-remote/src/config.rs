use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 1800;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_transfer_timeout_secs() -> u64 {
    DEFAULT_TRANSFER_TIMEOUT_SECS
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
    /// Connecting, sending a request head and waiting for the response head.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Moving a request or response body. `0` means no limit.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

/// Where a registry URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryLocation {
    Http(String),
    File(PathBuf),
}

impl RemoteConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_owned(),
            auth_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            transfer_timeout_secs: DEFAULT_TRANSFER_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_token(mut self, token: &str) -> Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_transfer_timeout_secs(mut self, secs: u64) -> Self {
        self.transfer_timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Body transfers scale with image size, so they get their own bound.
    pub fn transfer_timeout(&self) -> Option<Duration> {
        (self.transfer_timeout_secs > 0).then(|| Duration::from_secs(self.transfer_timeout_secs))
    }

    /// `http(s)://` URLs are remote hubs; `file://` URLs and plain paths are
    /// directory-backed registries.
    pub fn location(&self) -> Result<RegistryLocation, RemoteError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(RemoteError::Config("registry URL is empty".to_owned()));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(RegistryLocation::Http(url.to_owned()));
        }
        if let Some(path) = url.strip_prefix("file://") {
            if path.is_empty() {
                return Err(RemoteError::Config(format!("invalid registry URL '{url}'")));
            }
            return Ok(RegistryLocation::File(PathBuf::from(path)));
        }
        if url.contains("://") {
            return Err(RemoteError::Config(format!(
                "unsupported registry scheme in '{url}'"
            )));
        }
        Ok(RegistryLocation::File(PathBuf::from(url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_strips_trailing_slash() {
        let config = RemoteConfig::new("https://example.com/");
        assert_eq!(config.url, "https://example.com");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.transfer_timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn zero_transfer_timeout_is_unbounded() {
        let config = RemoteConfig::new("https://example.com").with_transfer_timeout_secs(0);
        assert_eq!(config.transfer_timeout(), None);
        let legacy: RemoteConfig =
            serde_json::from_str(r#"{"url": "https://example.com", "timeout_secs": 5}"#).unwrap();
        assert_eq!(legacy.timeout(), Duration::from_secs(5));
        assert_eq!(legacy.transfer_timeout(), Some(Duration::from_secs(1800)));
    }

    #[test]
    fn token_is_never_serialized() {
        let config = RemoteConfig::new("https://hub.example.com").with_token("secret123");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret123"));
        let loaded: RemoteConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.url, "https://hub.example.com");
        assert_eq!(loaded.auth_token, None);
    }

    #[test]
    fn location_from_url() {
        assert_eq!(
            RemoteConfig::new("http://localhost:8080").location().unwrap(),
            RegistryLocation::Http("http://localhost:8080".to_owned())
        );
        assert_eq!(
            RemoteConfig::new("file:///srv/hub").location().unwrap(),
            RegistryLocation::File(PathBuf::from("/srv/hub"))
        );
        assert_eq!(
            RemoteConfig::new("./local-hub").location().unwrap(),
            RegistryLocation::File(PathBuf::from("./local-hub"))
        );
        assert!(RemoteConfig::new("s3://bucket").location().is_err());
        assert!(RemoteConfig::new("").location().is_err());
    }
}
