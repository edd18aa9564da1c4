use crate::manifest::{validate_name, Manifest};
use crate::types::ImageTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Namespace used when neither configuration nor the reference names one.
pub const DEFAULT_NAMESPACE: &str = "hub";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("image reference must not be empty")]
    Empty,
    #[error("invalid image reference '{0}': expected [namespace/]name[:version]")]
    Malformed(String),
    #[error("invalid version '{0}' in image reference")]
    Version(String),
}

/// The `(namespace, name, version)` key uniquely addressing one built artifact.
///
/// Derived purely from configuration and manifest content, so rebuilding an
/// unchanged directory always lands on the same identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageIdentity {
    pub namespace: String,
    pub name: String,
    pub version: String,
}

impl ImageIdentity {
    pub fn new(namespace: &str, name: &str, version: &str) -> Self {
        Self {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
        }
    }

    pub fn from_manifest(namespace: &str, manifest: &Manifest) -> Self {
        Self::new(namespace, &manifest.name, manifest.version.trim())
    }

    /// Engine-facing tag, `namespace/name:version`.
    pub fn tag(&self) -> ImageTag {
        ImageTag::new(self.to_string())
    }

    /// Filesystem-safe key, used for lock files and blob paths.
    pub fn key(&self) -> String {
        format!("{}__{}__{}", self.namespace, self.name, self.version)
    }
}

impl fmt::Display for ImageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.name, self.version)
    }
}

/// A user-supplied pull reference: `[namespace/]name[:version]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (path, version) = match reference.rsplit_once(':') {
            Some((path, version)) => (path, Some(version)),
            None => (reference, None),
        };
        let (namespace, name) = match path.split_once('/') {
            Some((ns, name)) => (Some(ns), name),
            None => (None, path),
        };

        let malformed = || ReferenceError::Malformed(reference.to_owned());
        if validate_name(name).is_err() {
            return Err(malformed());
        }
        if let Some(ns) = namespace {
            if validate_name(ns).is_err() {
                return Err(malformed());
            }
        }
        if let Some(v) = version {
            if semver::Version::parse(v).is_err() {
                return Err(ReferenceError::Version(v.to_owned()));
            }
        }

        Ok(Self {
            namespace: namespace.map(str::to_owned),
            name: name.to_owned(),
            version: version.map(str::to_owned),
        })
    }

    /// Namespace to search, falling back to `default_namespace`.
    pub fn namespace_or<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(default_namespace)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref ns) = self.namespace {
            write!(f, "{ns}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(ref v) = self.version {
            write!(f, ":{v}")?;
        }
        Ok(())
    }
}
