use crate::concurrency::IdentityLock;
use crate::HubError;
use chrono::Utc;
use exechub_remote::{
    CatalogEntry, CredentialProvider, HostInfo, RegistryBackend, RemoteError, RetryPolicy,
    WriteCondition,
};
use exechub_runtime::ContainerEngine;
use exechub_schema::{ImageDigest, ImageIdentity, Manifest};
use std::path::Path;
use tracing::{info, warn};

/// Pushes a built image and records it in the catalog.
pub struct Publisher<'a> {
    pub engine: &'a dyn ContainerEngine,
    pub registry: &'a dyn RegistryBackend,
    pub credentials: &'a dyn CredentialProvider,
    pub retry: &'a RetryPolicy,
    pub lock_dir: &'a Path,
}

impl Publisher<'_> {
    fn check_credentials(&self) -> Result<(), HubError> {
        if !self.registry.requires_auth() {
            return Ok(());
        }
        match self.credentials.access_token() {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(HubError::Authentication(format!(
                "no access token for {}; set EXECHUB_TOKEN or ~/.config/exechub/credentials.json",
                self.registry.location()
            ))),
            Err(e) => Err(HubError::Authentication(e.to_string())),
        }
    }

    /// Lookup, overwrite check, push and catalog write run under the identity
    /// lock. With `no_overwrite` the catalog write is also conditional, so a
    /// publisher on another host cannot slip in between.
    pub fn publish(
        &self,
        identity: &ImageIdentity,
        manifest: &Manifest,
        host_info: Option<HostInfo>,
        no_overwrite: bool,
    ) -> Result<CatalogEntry, HubError> {
        self.check_credentials()?;
        let _lock = IdentityLock::acquire(self.lock_dir, identity)?;

        let existing = self
            .retry
            .run("catalog lookup", || self.registry.lookup(identity))?;
        if let Some(ref prior) = existing {
            if no_overwrite {
                return Err(HubError::ImageAlreadyExists(identity.to_string()));
            }
            warn!(
                "{identity} already published at {}; overwriting",
                prior.published_at.to_rfc3339()
            );
        }

        let data = self.engine.save(&identity.tag())?;
        let digest = ImageDigest::of(&data);
        info!(
            "pushing {identity} ({} bytes, digest {}) to {}",
            data.len(),
            &digest[..12],
            self.registry.location()
        );
        self.retry
            .run("image push", || self.registry.push_image(identity, &data))?;

        let entry = CatalogEntry {
            identity: identity.clone(),
            manifest: manifest.clone(),
            digest,
            size: data.len() as u64,
            published_at: Utc::now(),
            host_info,
        };
        let condition = if no_overwrite {
            WriteCondition::MustNotExist
        } else {
            WriteCondition::Any
        };
        let mut attempts = 0u32;
        self.retry.run("catalog update", || {
            attempts += 1;
            match self.registry.upsert(&entry, condition) {
                Err(RemoteError::Conflict(_)) if attempts > 1 => self.confirm_own_write(&entry),
                other => other,
            }
        })?;
        info!("published {identity}");
        Ok(entry)
    }

    /// A conditional write that conflicts on a retry may have been committed by
    /// the attempt whose response was lost. The entry is ours if it carries our
    /// digest and timestamp.
    fn confirm_own_write(&self, entry: &CatalogEntry) -> Result<(), RemoteError> {
        match self.registry.lookup(&entry.identity)? {
            Some(found)
                if found.digest == entry.digest && found.published_at == entry.published_at =>
            {
                info!("catalog write for {} had already landed", entry.identity);
                Ok(())
            }
            _ => Err(RemoteError::Conflict(entry.identity.to_string())),
        }
    }
}
