use crate::HubError;
use exechub_remote::{RemoteConfig, RetryPolicy};
use exechub_schema::{validate_name, DEFAULT_NAMESPACE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_REGISTRY: &str = "EXECHUB_REGISTRY";
pub const ENV_NAMESPACE: &str = "EXECHUB_NAMESPACE";
pub const ENV_ENGINE: &str = "EXECHUB_ENGINE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// `http(s)://` hub, `file://` URL, or plain directory path.
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Bound on pushing or pulling one image body; `0` disables it.
    pub transfer_timeout_secs: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 30,
            transfer_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageSection {
    pub timeout_secs: u64,
    pub daemon_grace_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for UsageSection {
    fn default() -> Self {
        Self {
            timeout_secs: 360,
            daemon_grace_secs: 5,
            poll_interval_ms: 500,
        }
    }
}

impl UsageSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn daemon_grace(&self) -> Duration {
        Duration::from_secs(self.daemon_grace_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Settings from `~/.config/exechub/config.toml`, environment, and flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub namespace: String,
    pub engine: String,
    pub lock_dir: Option<PathBuf>,
    pub registry: RegistrySection,
    pub usage: UsageSection,
    pub retry: RetryPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_owned(),
            engine: "docker".to_owned(),
            lock_dir: None,
            registry: RegistrySection::default(),
            usage: UsageSection::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
}

fn data_home() -> Option<PathBuf> {
    std::env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
}

impl HubConfig {
    pub fn default_path() -> Option<PathBuf> {
        config_home().map(|d| d.join("exechub/config.toml"))
    }

    /// Parse `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, HubError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content)
            .map_err(|e| HubError::Config(format!("invalid config {}: {e}", path.display())))
    }

    pub fn load_default() -> Result<Self, HubError> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_REGISTRY) {
            self.registry.url = Some(url);
        }
        if let Some(ns) = get(ENV_NAMESPACE) {
            self.namespace = ns;
        }
        if let Some(engine) = get(ENV_ENGINE) {
            self.engine = engine;
        }
    }

    pub fn validate(&self) -> Result<(), HubError> {
        validate_name(&self.namespace)
            .map_err(|e| HubError::Config(format!("namespace '{}': {e}", self.namespace)))?;
        if self.retry.max_attempts == 0 {
            return Err(HubError::Config("retry.max_attempts must be at least 1".to_owned()));
        }
        if self.usage.timeout_secs == 0 {
            return Err(HubError::Config("usage.timeout_secs must be positive".to_owned()));
        }
        Ok(())
    }

    /// Registry URL, defaulting to a local directory registry.
    pub fn registry_url(&self) -> Result<String, HubError> {
        if let Some(ref url) = self.registry.url {
            return Ok(url.clone());
        }
        data_home()
            .map(|d| d.join("exechub/registry").to_string_lossy().into_owned())
            .ok_or_else(|| {
                HubError::Config("no registry configured and HOME is not set".to_owned())
            })
    }

    pub fn remote_config(&self, token: Option<&str>) -> Result<RemoteConfig, HubError> {
        let config = RemoteConfig::new(&self.registry_url()?)
            .with_timeout_secs(self.registry.timeout_secs)
            .with_transfer_timeout_secs(self.registry.transfer_timeout_secs);
        Ok(match token {
            Some(t) => config.with_token(t),
            None => config,
        })
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.lock_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("exechub-locks"))
    }
}
