use crate::builder::ImageBuilder;
use crate::config::HubConfig;
use crate::publisher::Publisher;
use crate::puller::{PullOutcome, Puller};
use crate::summary::{collect_host_info, BuildSummary};
use crate::usage::UsageTester;
use crate::HubError;
use exechub_remote::{
    default_chain, open_registry, CatalogEntry, CatalogQuery, CredentialProvider, RegistryBackend,
};
use exechub_runtime::{select_engine, ContainerEngine, RunMode};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Steps and policies of a single `build` invocation.
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct BuildOptions {
    pub push: bool,
    pub test_uses: bool,
    pub daemon: bool,
    /// Return the first failure as `Err` instead of embedding it in the summary.
    pub raise_error: bool,
    pub host_info: bool,
    pub no_overwrite: bool,
    /// Overrides `[usage] timeout_secs`.
    pub timeout_ready: Option<Duration>,
}

/// Entry point for building, listing and pulling executor images.
pub struct HubIO {
    config: HubConfig,
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<dyn RegistryBackend>,
    credentials: Arc<dyn CredentialProvider>,
}

impl HubIO {
    pub fn new(
        config: HubConfig,
        engine: Arc<dyn ContainerEngine>,
        registry: Arc<dyn RegistryBackend>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            config,
            engine,
            registry,
            credentials,
        }
    }

    /// Wire engine, registry and credential chain from configuration.
    /// `token` takes precedence over `EXECHUB_TOKEN` and the credentials file.
    pub fn from_config(config: HubConfig, token: Option<String>) -> Result<Self, HubError> {
        config.validate()?;
        let credentials = default_chain(token);
        let resolved = match credentials.access_token() {
            Ok(t) => t,
            Err(e) => {
                warn!("ignoring unreadable credentials: {e}");
                None
            }
        };
        let registry = open_registry(&config.remote_config(resolved.as_deref())?)?;
        let engine = select_engine(&config.engine)?;
        Ok(Self::new(
            config,
            Arc::from(engine),
            Arc::from(registry),
            Arc::new(credentials),
        ))
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn engine(&self) -> &dyn ContainerEngine {
        self.engine.as_ref()
    }

    pub fn registry(&self) -> &dyn RegistryBackend {
        self.registry.as_ref()
    }

    /// Validate, build, and optionally usage-test and publish the artifact at `path`.
    ///
    /// Failures are recorded in the returned summary unless
    /// `opts.raise_error` is set.
    pub fn build(&self, path: &Path, opts: &BuildOptions) -> Result<BuildSummary, HubError> {
        let started = Instant::now();
        let mut summary = BuildSummary::start(path);

        if let Err(err) = self.run_build(path, opts, &mut summary) {
            if opts.raise_error {
                return Err(err);
            }
            warn!("build of {} failed: {err}", path.display());
            summary.fail(&err);
        }

        if opts.host_info {
            summary.host_info = Some(collect_host_info(self.engine.name()));
        }
        summary.build_duration_secs = started.elapsed().as_secs_f64();
        Ok(summary)
    }

    fn run_build(
        &self,
        path: &Path,
        opts: &BuildOptions,
        summary: &mut BuildSummary,
    ) -> Result<(), HubError> {
        let builder = ImageBuilder::new(self.engine.as_ref(), &self.config.namespace);

        builder.require_recipe(path)?;
        let manifest = builder.load_manifest(path)?;
        summary.name.clone_from(&manifest.name);
        summary.version.clone_from(&manifest.version);
        summary.manifest_info = Some(manifest.clone());

        builder.check_recipe(path)?;
        builder.check_entry_modules(path, &manifest)?;

        let identity = builder.identity(&manifest);
        summary.image = Some(identity.to_string());
        builder.build_image(path, &identity)?;
        summary.is_build_success = true;

        if opts.test_uses {
            let mode = if opts.daemon {
                RunMode::Daemon
            } else {
                RunMode::Foreground
            };
            let mut tester = UsageTester::new(self.engine.as_ref(), &self.config.usage);
            if let Some(timeout) = opts.timeout_ready {
                tester = tester.with_timeout(timeout);
            }
            let tested = tester.test(&identity.tag(), mode);
            summary.is_test_success = Some(tested.is_ok());
            tested?;
        }

        if opts.push {
            let lock_dir = self.config.lock_dir();
            let publisher = Publisher {
                engine: self.engine.as_ref(),
                registry: self.registry.as_ref(),
                credentials: self.credentials.as_ref(),
                retry: &self.config.retry,
                lock_dir: &lock_dir,
            };
            let host_info = opts
                .host_info
                .then(|| collect_host_info(self.engine.name()));
            let pushed = publisher.publish(&identity, &manifest, host_info, opts.no_overwrite);
            summary.is_push_success = Some(pushed.is_ok());
            pushed?;
        }

        info!("{identity}: done");
        Ok(())
    }

    /// Catalog entries matching every supplied filter, newest first.
    pub fn list(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, HubError> {
        let entries = self
            .config
            .retry
            .run("catalog search", || self.registry.search(query))?;
        info!("{} catalog entries match", entries.len());
        Ok(entries)
    }

    pub fn pull(&self, reference: &str) -> Result<PullOutcome, HubError> {
        Puller {
            engine: self.engine.as_ref(),
            registry: self.registry.as_ref(),
            retry: &self.config.retry,
            namespace: &self.config.namespace,
        }
        .pull(reference)
    }
}
