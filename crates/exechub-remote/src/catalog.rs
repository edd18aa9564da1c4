use crate::RemoteError;
use chrono::{DateTime, Utc};
use exechub_schema::{ImageDigest, ImageIdentity, Manifest};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Where and by whom an image was built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HostInfo {
    pub hostname: String,
    pub os: String,
    pub arch: String,
    pub user: String,
    pub engine: String,
}

/// A published manifest plus the identity and digest of its image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogEntry {
    pub identity: ImageIdentity,
    pub manifest: Manifest,
    pub digest: ImageDigest,
    pub size: u64,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_info: Option<HostInfo>,
}

/// Search filters. Conjunctive across fields; `keywords` matches any-of.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogQuery {
    pub name: Option<String>,
    pub keywords: Vec<String>,
    pub executor_type: Option<String>,
}

impl CatalogQuery {
    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.keywords.is_empty() && self.executor_type.is_none()
    }

    pub fn matches(&self, entry: &CatalogEntry) -> bool {
        if let Some(ref name) = self.name {
            if entry.identity.name != *name {
                return false;
            }
        }
        if !self.keywords.is_empty()
            && !self
                .keywords
                .iter()
                .any(|k| entry.manifest.keywords.contains(k))
        {
            return false;
        }
        if let Some(ref t) = self.executor_type {
            if entry.manifest.executor_type != *t {
                return false;
            }
        }
        true
    }
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

/// Most recently published first, then name, then version.
pub fn sort_entries(entries: &mut [CatalogEntry]) {
    entries.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.identity.name.cmp(&b.identity.name))
            .then_with(|| compare_versions(&a.identity.version, &b.identity.version))
            .then_with(|| a.identity.namespace.cmp(&b.identity.namespace))
    });
}

/// The entry with the highest semantic version.
pub fn highest_version<'a, I>(entries: I) -> Option<&'a CatalogEntry>
where
    I: IntoIterator<Item = &'a CatalogEntry>,
{
    entries
        .into_iter()
        .max_by(|a, b| compare_versions(&a.identity.version, &b.identity.version))
}

/// The serialized catalog: one entry per image identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogIndex {
    pub entries: BTreeMap<String, CatalogEntry>,
}

impl CatalogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, RemoteError> {
        serde_json::from_slice(data)
            .map_err(|e| RemoteError::Serialization(format!("invalid catalog: {e}")))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RemoteError> {
        serde_json::to_vec_pretty(self).map_err(|e| RemoteError::Serialization(e.to_string()))
    }

    pub fn get(&self, identity: &ImageIdentity) -> Option<&CatalogEntry> {
        self.entries.get(&identity.to_string())
    }

    /// Insert or replace the entry for its identity. Returns the prior entry.
    pub fn upsert(&mut self, entry: CatalogEntry) -> Option<CatalogEntry> {
        self.entries.insert(entry.identity.to_string(), entry)
    }

    pub fn search(&self, query: &CatalogQuery) -> Vec<CatalogEntry> {
        let mut found: Vec<CatalogEntry> = self
            .entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        sort_entries(&mut found);
        found
    }
}
