use crate::HubError;
use exechub_remote::{highest_version, CatalogEntry, CatalogQuery, RegistryBackend, RemoteError, RetryPolicy};
use exechub_runtime::{ContainerEngine, RuntimeError};
use exechub_schema::{ImageDigest, ImageReference, ImageTag};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct PullOutcome {
    pub entry: CatalogEntry,
    pub tag: ImageTag,
}

/// Resolves a reference against the catalog and loads the image locally.
pub struct Puller<'a> {
    pub engine: &'a dyn ContainerEngine,
    pub registry: &'a dyn RegistryBackend,
    pub retry: &'a RetryPolicy,
    pub namespace: &'a str,
}

fn same_version(published: &str, requested: &str) -> bool {
    match (
        semver::Version::parse(published),
        semver::Version::parse(requested),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => published == requested,
    }
}

impl Puller<'_> {
    /// Without a version, the highest semantic version published under the name.
    pub fn resolve(&self, reference: &ImageReference) -> Result<CatalogEntry, HubError> {
        let namespace = reference.namespace_or(self.namespace);
        let query = CatalogQuery::by_name(&reference.name);
        let candidates: Vec<CatalogEntry> = self
            .retry
            .run("catalog search", || self.registry.search(&query))?
            .into_iter()
            .filter(|e| e.identity.namespace == namespace)
            .collect();

        let chosen = match reference.version {
            Some(ref v) => candidates
                .iter()
                .find(|e| same_version(&e.identity.version, v)),
            None => highest_version(&candidates),
        };
        chosen
            .cloned()
            .ok_or_else(|| HubError::ImageNotFound(reference.to_string()))
    }

    pub fn pull(&self, reference: &str) -> Result<PullOutcome, HubError> {
        let reference = ImageReference::parse(reference)?;
        let entry = self.resolve(&reference)?;
        if !self.engine.available() {
            return Err(RuntimeError::EngineUnavailable(self.engine.name().to_owned()).into());
        }
        info!("pulling {} from {}", entry.identity, self.registry.location());

        let data = self
            .retry
            .run("image pull", || self.registry.pull_image(&entry.identity))?;
        let actual = ImageDigest::of(&data);
        if actual != entry.digest {
            return Err(RemoteError::IntegrityFailure {
                key: entry.identity.to_string(),
                expected: entry.digest.to_string(),
                actual: actual.into_inner(),
            }
            .into());
        }

        let tag = entry.identity.tag();
        self.engine.load(&data, &tag)?;
        info!("pulled {tag}");
        Ok(PullOutcome { entry, tag })
    }
}
