use crate::RuntimeError;
use exechub_schema::{ContainerId, ImageTag};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// How a usage-test container is expected to behave once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Wait until the container reports ready.
    Foreground,
    /// Detached; must stay alive past a grace period.
    Daemon,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Foreground => write!(f, "foreground"),
            RunMode::Daemon => write!(f, "daemon"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: ContainerId,
    pub image: ImageTag,
    pub mode: RunMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerState {
    Starting,
    Ready,
    Unhealthy,
    Exited(i32),
}

/// Narrow interface over an image build/run toolchain.
pub trait ContainerEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can be reached right now.
    fn available(&self) -> bool;

    /// Build the directory's recipe into an image tagged `tag`.
    fn build(&self, context: &Path, tag: &ImageTag) -> Result<(), RuntimeError>;

    fn image_exists(&self, tag: &ImageTag) -> Result<bool, RuntimeError>;

    /// Start a container from `tag`. The caller owns the handle and must `stop` it.
    fn run(&self, tag: &ImageTag, mode: RunMode) -> Result<ContainerHandle, RuntimeError>;

    fn state(&self, handle: &ContainerHandle) -> Result<ContainerState, RuntimeError>;

    /// Force-stop and remove the container, including anonymous volumes.
    fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Export an image as a portable archive.
    fn save(&self, tag: &ImageTag) -> Result<Vec<u8>, RuntimeError>;

    /// Import an archive produced by `save` and make it available as `tag`.
    fn load(&self, data: &[u8], tag: &ImageTag) -> Result<(), RuntimeError>;
}

pub fn select_engine(name: &str) -> Result<Box<dyn ContainerEngine>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerEngine::new())),
        "mock" => Ok(Box::new(crate::mock::MockEngine::new())),
        other => Err(RuntimeError::EngineUnavailable(other.to_owned())),
    }
}
