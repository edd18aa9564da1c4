use crate::engine::{ContainerEngine, ContainerHandle, ContainerState, RunMode};
use crate::recipe::{load_recipe, Recipe};
use crate::RuntimeError;
use exechub_schema::{ContainerId, ImageTag};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// What a container started from a mock image does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartBehavior {
    Ready,
    /// Reports starting once, then exits with the code.
    Crash(i32),
    /// Never becomes ready.
    Hang,
    /// Reports ready once, then exits with the code.
    CrashAfterReady(i32),
}

/// Failures that can be injected into the next matching call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Unavailable,
    RecipeInvalid,
    BuildStep,
    Save,
    Load,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockImage {
    tag: String,
    behavior: StartBehavior,
}

struct MockContainer {
    behavior: StartBehavior,
    polls: u32,
}

#[derive(Default)]
struct MockState {
    images: HashMap<String, MockImage>,
    containers: HashMap<String, MockContainer>,
    next_container: u64,
    builds: usize,
    fail_next: Vec<MockFailure>,
    start_override: Option<StartBehavior>,
    offline: bool,
}

/// In-memory engine whose behaviour is derived from the artifact directory.
///
/// - unknown recipe instructions or missing `COPY` sources are recipe errors
/// - `RUN false` / `RUN exit N` (N != 0) fail the build step
/// - a start command referencing a file or `-m` module absent from the
///   directory produces an image that crashes on start
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::ExecFailed(format!("mutex poisoned: {e}")))
    }

    /// Queue a failure for the next call it applies to.
    pub fn fail_next(&self, failure: MockFailure) {
        if let Ok(mut state) = self.lock() {
            state.fail_next.push(failure);
        }
    }

    /// Force every started container to behave this way, regardless of image.
    pub fn set_start_behavior(&self, behavior: Option<StartBehavior>) {
        if let Ok(mut state) = self.lock() {
            state.start_override = behavior;
        }
    }

    /// Make `available` report the engine as unreachable.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut state) = self.lock() {
            state.offline = offline;
        }
    }

    pub fn build_count(&self) -> usize {
        self.lock().map(|s| s.builds).unwrap_or(0)
    }

    /// Containers started and not yet stopped.
    pub fn live_containers(&self) -> usize {
        self.lock().map(|s| s.containers.len()).unwrap_or(0)
    }

    fn take_failure(state: &mut MockState, wanted: &[MockFailure]) -> Option<MockFailure> {
        let pos = state.fail_next.iter().position(|f| wanted.contains(f))?;
        Some(state.fail_next.remove(pos))
    }
}

fn check_context_sources(context: &Path, recipe: &Recipe) -> Result<(), RuntimeError> {
    for src in recipe.context_sources() {
        if src.contains('*') || src == "." {
            continue;
        }
        if !context.join(src).exists() {
            return Err(RuntimeError::RecipeInvalid(format!(
                "COPY failed: file not found in build context: {src}"
            )));
        }
    }
    Ok(())
}

fn check_run_steps(recipe: &Recipe) -> Result<(), RuntimeError> {
    for step in recipe.of_kind("RUN") {
        let args = step.args.trim();
        let failing = args == "false"
            || args
                .strip_prefix("exit ")
                .and_then(|c| c.trim().parse::<i32>().ok())
                .is_some_and(|c| c != 0);
        if failing {
            return Err(RuntimeError::BuildStepFailed(format!(
                "line {}: RUN {args} returned a non-zero code: 1",
                step.line
            )));
        }
    }
    Ok(())
}

fn start_behavior(context: &Path, recipe: &Recipe) -> StartBehavior {
    let Some(start) = recipe.start_command() else {
        return StartBehavior::Ready;
    };
    let tokens: Vec<String> = start
        .args
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|t| t.trim_matches(|c| matches!(c, '[' | ']' | '"' | '\'')).to_owned())
        .filter(|t| !t.is_empty())
        .collect();

    let mut referenced = Vec::new();
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        if token == "-m" {
            if let Some(module) = iter.next() {
                let base = module.replace('.', "/");
                referenced.push(vec![format!("{base}.py"), format!("{base}/__init__.py")]);
            }
        } else if !token.starts_with('/')
            && [".py", ".sh", ".yml", ".yaml"]
                .iter()
                .any(|ext| token.ends_with(ext))
        {
            referenced.push(vec![token.clone()]);
        }
    }

    let all_present = referenced
        .iter()
        .all(|candidates| candidates.iter().any(|c| context.join(c).is_file()));
    if all_present {
        StartBehavior::Ready
    } else {
        StartBehavior::Crash(1)
    }
}

impl ContainerEngine for MockEngine {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        self.lock().is_ok_and(|s| !s.offline)
    }

    fn build(&self, context: &Path, tag: &ImageTag) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        state.builds += 1;
        match Self::take_failure(
            &mut state,
            &[
                MockFailure::Unavailable,
                MockFailure::RecipeInvalid,
                MockFailure::BuildStep,
            ],
        ) {
            Some(MockFailure::Unavailable) => {
                return Err(RuntimeError::EngineUnavailable("mock".to_owned()))
            }
            Some(MockFailure::RecipeInvalid) => {
                return Err(RuntimeError::RecipeInvalid("injected".to_owned()))
            }
            Some(_) => return Err(RuntimeError::BuildStepFailed("injected".to_owned())),
            None => {}
        }

        let recipe = load_recipe(context)?;
        check_context_sources(context, &recipe)?;
        check_run_steps(&recipe)?;

        let image = MockImage {
            tag: tag.to_string(),
            behavior: start_behavior(context, &recipe),
        };
        state.images.insert(tag.to_string(), image);
        Ok(())
    }

    fn image_exists(&self, tag: &ImageTag) -> Result<bool, RuntimeError> {
        Ok(self.lock()?.images.contains_key(tag.as_str()))
    }

    fn run(&self, tag: &ImageTag, mode: RunMode) -> Result<ContainerHandle, RuntimeError> {
        let mut state = self.lock()?;
        let behavior = match state.images.get(tag.as_str()) {
            Some(image) => state.start_override.unwrap_or(image.behavior),
            None => return Err(RuntimeError::ImageNotFound(tag.to_string())),
        };
        state.next_container += 1;
        let id = format!("mock-{}", state.next_container);
        state.containers.insert(
            id.clone(),
            MockContainer {
                behavior,
                polls: 0,
            },
        );
        Ok(ContainerHandle {
            id: ContainerId::new(id),
            image: tag.clone(),
            mode,
        })
    }

    fn state(&self, handle: &ContainerHandle) -> Result<ContainerState, RuntimeError> {
        let mut state = self.lock()?;
        let container = state
            .containers
            .get_mut(handle.id.as_str())
            .ok_or_else(|| RuntimeError::ContainerNotFound(handle.id.to_string()))?;
        container.polls += 1;
        Ok(match container.behavior {
            StartBehavior::Ready => ContainerState::Ready,
            StartBehavior::Hang => ContainerState::Starting,
            StartBehavior::Crash(_) if container.polls == 1 => ContainerState::Starting,
            StartBehavior::Crash(code) => ContainerState::Exited(code),
            StartBehavior::CrashAfterReady(_) if container.polls == 1 => ContainerState::Ready,
            StartBehavior::CrashAfterReady(code) => ContainerState::Exited(code),
        })
    }

    fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.lock()?
            .containers
            .remove(handle.id.as_str())
            .map(|_| ())
            .ok_or_else(|| RuntimeError::ContainerNotFound(handle.id.to_string()))
    }

    fn save(&self, tag: &ImageTag) -> Result<Vec<u8>, RuntimeError> {
        let mut state = self.lock()?;
        if Self::take_failure(&mut state, &[MockFailure::Save]).is_some() {
            return Err(RuntimeError::ExecFailed("injected save failure".to_owned()));
        }
        let image = state
            .images
            .get(tag.as_str())
            .ok_or_else(|| RuntimeError::ImageNotFound(tag.to_string()))?;
        serde_json::to_vec(image).map_err(|e| RuntimeError::ExecFailed(e.to_string()))
    }

    fn load(&self, data: &[u8], tag: &ImageTag) -> Result<(), RuntimeError> {
        let mut state = self.lock()?;
        if Self::take_failure(&mut state, &[MockFailure::Load]).is_some() {
            return Err(RuntimeError::ExecFailed("injected load failure".to_owned()));
        }
        let mut image: MockImage = serde_json::from_slice(data)
            .map_err(|e| RuntimeError::ExecFailed(format!("not a mock image archive: {e}")))?;
        image.tag = tag.to_string();
        state.images.insert(tag.to_string(), image);
        Ok(())
    }
}
