//! Container engine backends for exechub.
//!
//! This crate implements the execution layer: the pluggable `ContainerEngine`
//! trait (build, run, inspect, stop, save, load), a Docker CLI backend, an
//! in-memory mock backend for tests, the build recipe (`Dockerfile`) pre-check,
//! and prerequisite detection.

pub mod docker;
pub mod engine;
pub mod mock;
pub mod prereq;
pub mod recipe;

pub use engine::{select_engine, ContainerEngine, ContainerHandle, ContainerState, RunMode};
pub use mock::{MockEngine, MockFailure, StartBehavior};
pub use prereq::{check_docker_prereqs, format_missing, MissingPrereq};
pub use recipe::{load_recipe, parse_recipe, Instruction, Recipe, RECIPE_FILE};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container engine '{0}' is not available on this system")]
    EngineUnavailable(String),
    #[error("build recipe not found: {}", .0.display())]
    RecipeMissing(PathBuf),
    #[error("invalid build recipe: {0}")]
    RecipeInvalid(String),
    #[error("build step failed: {0}")]
    BuildStepFailed(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("engine execution failed: {0}")]
    ExecFailed(String),
}
