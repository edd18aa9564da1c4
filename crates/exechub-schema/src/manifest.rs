use crate::substitute::{substitute, substitute_env};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Fixed location of the manifest inside an artifact directory.
pub const MANIFEST_FILE: &str = "manifest.yml";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("undefined variable '{0}' referenced in manifest")]
    UndefinedVariable(String),
    #[error("manifest field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("invalid name '{0}': expected 1-64 characters of [A-Za-z0-9_.-] starting with a letter or digit")]
    InvalidName(String),
    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
    #[error("keywords must be a non-empty list of non-empty strings")]
    InvalidKeywords,
    #[error("invalid entrypoint '{0}': must be a relative path inside the artifact directory")]
    InvalidEntrypoint(String),
    #[error("invalid required input '{0}': names must be non-empty and unique")]
    InvalidRequiredInput(String),
}

impl ManifestError {
    /// True when the manifest file itself is absent, as opposed to malformed.
    pub fn is_missing(&self) -> bool {
        matches!(self, ManifestError::Missing(_))
    }
}

/// Metadata attached to one executor artifact version.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub author: String,
    pub vendor: String,
    pub kind: String,
    #[serde(rename = "type")]
    pub executor_type: String,
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platform: Vec<String>,
    /// Entry module, relative to the artifact directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Input fields the executor requires, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_inputs: Vec<String>,
}

impl Manifest {
    pub fn validate(&self) -> Result<(), ManifestError> {
        validate_name(&self.name)?;
        self.semver()?;

        for (field, value) in [
            ("author", &self.author),
            ("vendor", &self.vendor),
            ("kind", &self.kind),
            ("type", &self.executor_type),
        ] {
            if value.trim().is_empty() {
                return Err(ManifestError::EmptyField(field));
            }
        }

        if self.keywords.is_empty() || self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(ManifestError::InvalidKeywords);
        }

        if let Some(ref entry) = self.entrypoint {
            let path = Path::new(entry);
            let escapes = path
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if entry.trim().is_empty() || escapes {
                return Err(ManifestError::InvalidEntrypoint(entry.clone()));
            }
        }

        let mut seen = BTreeSet::new();
        for input in &self.required_inputs {
            if input.trim().is_empty() || !seen.insert(input.as_str()) {
                return Err(ManifestError::InvalidRequiredInput(input.clone()));
            }
        }

        Ok(())
    }

    /// Parsed semantic version of this manifest.
    pub fn semver(&self) -> Result<semver::Version, ManifestError> {
        semver::Version::parse(self.version.trim()).map_err(|e| ManifestError::InvalidVersion {
            version: self.version.clone(),
            reason: e.to_string(),
        })
    }
}

pub fn validate_name(name: &str) -> Result<(), ManifestError> {
    let valid_len = !name.is_empty() && name.len() <= 64;
    let valid_start = name.bytes().next().is_some_and(|b| b.is_ascii_alphanumeric());
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if valid_len && valid_start && valid_chars {
        Ok(())
    } else {
        Err(ManifestError::InvalidName(name.to_owned()))
    }
}

/// Substitute from the process environment, parse and validate.
pub fn parse_manifest_str(input: &str) -> Result<Manifest, ManifestError> {
    parse_expanded(&substitute_env(input)?)
}

/// Like [`parse_manifest_str`] but resolving variables through `lookup`.
pub fn parse_manifest_str_with<F>(input: &str, lookup: F) -> Result<Manifest, ManifestError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_expanded(&substitute(input, lookup)?)
}

fn parse_expanded(expanded: &str) -> Result<Manifest, ManifestError> {
    let manifest: Manifest = serde_yaml_ng::from_str(expanded)?;
    manifest.validate()?;
    Ok(manifest)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(ManifestError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
