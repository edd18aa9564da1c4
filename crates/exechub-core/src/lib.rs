//! Core pipeline for exechub executor images.
//!
//! This crate ties together manifest validation, container engines, and
//! registry backends into `HubIO`, the façade behind `build`, `list`, and
//! `pull`. It also provides the usage tester, the publisher with its
//! identity-scoped locking, the puller, build summaries, and configuration.

pub mod builder;
pub mod concurrency;
pub mod config;
pub mod hubio;
pub mod publisher;
pub mod puller;
pub mod summary;
pub mod usage;

pub use builder::{find_entry_modules, ImageBuilder};
pub use concurrency::{install_signal_handler, shutdown_requested, IdentityLock};
pub use config::{HubConfig, RegistrySection, UsageSection};
pub use hubio::{BuildOptions, HubIO};
pub use publisher::Publisher;
pub use puller::{PullOutcome, Puller};
pub use summary::{collect_host_info, BuildSummary};
pub use usage::UsageTester;

use exechub_remote::RemoteError;
use exechub_runtime::RuntimeError;
use exechub_schema::{ManifestError, ReferenceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// User-visible failure categories of a pipeline operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    ManifestMissing,
    ManifestInvalid,
    DockerfileMissing,
    DockerfileInvalid,
    ModuleInvalid,
    ContainerStartFailure,
    ImageAlreadyExists,
    ImageNotFound,
    AuthenticationFailure,
    NetworkError,
    /// The container toolchain is unusable, or local I/O failed.
    EngineFailure,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),
    #[error("Dockerfile not found: {}", .0.display())]
    RecipeMissing(PathBuf),
    #[error("invalid Dockerfile: {0}")]
    RecipeInvalid(String),
    #[error("invalid entry module: {0}")]
    ModuleInvalid(String),
    #[error("container failed to start: {0}")]
    ContainerStart(String),
    #[error("image already exists: {0}")]
    ImageAlreadyExists(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("invalid image reference: {0}")]
    Reference(#[from] ReferenceError),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("container engine error: {0}")]
    Engine(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    pub fn reason(&self) -> FailureReason {
        match self {
            HubError::Manifest(e) if e.is_missing() => FailureReason::ManifestMissing,
            HubError::Manifest(_) => FailureReason::ManifestInvalid,
            HubError::RecipeMissing(_) => FailureReason::DockerfileMissing,
            HubError::RecipeInvalid(_) => FailureReason::DockerfileInvalid,
            HubError::ModuleInvalid(_) => FailureReason::ModuleInvalid,
            HubError::ContainerStart(_) => FailureReason::ContainerStartFailure,
            HubError::ImageAlreadyExists(_) => FailureReason::ImageAlreadyExists,
            HubError::ImageNotFound(_) | HubError::Reference(_) => FailureReason::ImageNotFound,
            HubError::Authentication(_) => FailureReason::AuthenticationFailure,
            HubError::Network(_) => FailureReason::NetworkError,
            HubError::Engine(_) | HubError::Config(_) | HubError::Io(_) => {
                FailureReason::EngineFailure
            }
        }
    }
}

impl From<RuntimeError> for HubError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Io(e) => HubError::Io(e),
            RuntimeError::RecipeMissing(path) => HubError::RecipeMissing(path),
            RuntimeError::RecipeInvalid(msg) => HubError::RecipeInvalid(msg),
            RuntimeError::BuildStepFailed(msg) => HubError::ModuleInvalid(msg),
            RuntimeError::ImageNotFound(msg) => HubError::ImageNotFound(msg),
            other @ (RuntimeError::EngineUnavailable(_)
            | RuntimeError::ContainerNotFound(_)
            | RuntimeError::ExecFailed(_)) => HubError::Engine(other.to_string()),
        }
    }
}

impl From<RemoteError> for HubError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(msg) => HubError::Authentication(msg),
            RemoteError::Conflict(id) => HubError::ImageAlreadyExists(id),
            RemoteError::NotFound(what) => HubError::ImageNotFound(what),
            RemoteError::Config(msg) => HubError::Config(msg),
            other => HubError::Network(other.to_string()),
        }
    }
}
