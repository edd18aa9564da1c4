use crate::engine::{ContainerEngine, ContainerHandle, ContainerState, RunMode};
use crate::RuntimeError;
use exechub_schema::{ContainerId, ImageTag};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static CONTAINER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Engine backed by the `docker` command-line client.
pub struct DockerEngine {
    binary: String,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self {
            binary: "docker".to_owned(),
        }
    }
}

impl DockerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RuntimeError::EngineUnavailable(self.binary.clone())
                } else {
                    RuntimeError::Io(e)
                }
            })
    }

    fn checked(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let output = self.command(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(classify_engine_failure(&stderr))
        }
    }
}

impl DockerEngine {
    /// `docker run` can create the container and still fail to start it.
    fn remove_by_name(&self, name: &str) {
        match self.command(&["rm", "--force", "--volumes", name]) {
            Ok(o) if o.status.success() => debug!("removed failed test container {name}"),
            Ok(_) => debug!("no test container {name} left to remove"),
            Err(e) => warn!("failed to remove test container {name}: {e}"),
        }
    }
}

/// Map `docker` stderr to a runtime error category.
pub fn classify_build_failure(stderr: &str) -> RuntimeError {
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_owned();
    if lower.contains("dockerfile parse error")
        || lower.contains("unknown instruction")
        || lower.contains("failed to parse dockerfile")
        || lower.contains("failed to read dockerfile")
        || lower.contains("not found in build context")
        || lower.contains("copy failed")
    {
        RuntimeError::RecipeInvalid(message)
    } else if lower.contains("did not complete successfully")
        || lower.contains("returned a non-zero code")
    {
        RuntimeError::BuildStepFailed(message)
    } else {
        classify_engine_failure(stderr)
    }
}

fn classify_engine_failure(stderr: &str) -> RuntimeError {
    let lower = stderr.to_lowercase();
    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
    {
        RuntimeError::EngineUnavailable(stderr.trim().to_owned())
    } else if lower.contains("no such image") || lower.contains("reference does not exist") {
        RuntimeError::ImageNotFound(stderr.trim().to_owned())
    } else if lower.contains("no such container") {
        RuntimeError::ContainerNotFound(stderr.trim().to_owned())
    } else {
        RuntimeError::ExecFailed(stderr.trim().to_owned())
    }
}

/// Parse `docker inspect --format '{{.State.Status}} {{.State.ExitCode}} {{.State.Health.Status}}'`.
pub fn parse_inspect_state(line: &str) -> ContainerState {
    let mut parts = line.split_whitespace();
    let status = parts.next().unwrap_or_default();
    let exit_code = parts.next().and_then(|c| c.parse().ok()).unwrap_or(-1);
    let health = parts.next().unwrap_or_default();

    match status {
        "created" => ContainerState::Starting,
        "running" => match health {
            "starting" => ContainerState::Starting,
            "unhealthy" => ContainerState::Unhealthy,
            _ => ContainerState::Ready,
        },
        "restarting" | "paused" => ContainerState::Unhealthy,
        _ => ContainerState::Exited(exit_code),
    }
}

impl ContainerEngine for DockerEngine {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn available(&self) -> bool {
        self.command(&["version", "--format", "{{.Server.Version}}"])
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn build(&self, context: &Path, tag: &ImageTag) -> Result<(), RuntimeError> {
        let context_str = context.to_string_lossy();
        let output = self.command(&["build", "--tag", tag.as_str(), context_str.as_ref()])?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_build_failure(&stderr))
    }

    fn image_exists(&self, tag: &ImageTag) -> Result<bool, RuntimeError> {
        let output = self.command(&["image", "inspect", "--format", "{{.Id}}", tag.as_str()])?;
        Ok(output.status.success())
    }

    fn run(&self, tag: &ImageTag, mode: RunMode) -> Result<ContainerHandle, RuntimeError> {
        let name = format!(
            "exechub-test-{}-{}",
            std::process::id(),
            CONTAINER_SEQ.fetch_add(1, Ordering::SeqCst)
        );
        let mode_label = format!("exechub.mode={mode}");
        let output = self
            .checked(&[
                "run",
                "--detach",
                "--name",
                name.as_str(),
                "--label",
                "exechub.usage-test=1",
                "--label",
                mode_label.as_str(),
                tag.as_str(),
            ])
            .inspect_err(|_| self.remove_by_name(&name))?;
        let id = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(ContainerHandle {
            id: ContainerId::new(if id.is_empty() { name } else { id }),
            image: tag.clone(),
            mode,
        })
    }

    fn state(&self, handle: &ContainerHandle) -> Result<ContainerState, RuntimeError> {
        let output = self.checked(&[
            "inspect",
            "--format",
            "{{.State.Status}} {{.State.ExitCode}} {{if .State.Health}}{{.State.Health.Status}}{{end}}",
            handle.id.as_str(),
        ])?;
        Ok(parse_inspect_state(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.checked(&["rm", "--force", "--volumes", handle.id.as_str()])?;
        Ok(())
    }

    fn save(&self, tag: &ImageTag) -> Result<Vec<u8>, RuntimeError> {
        Ok(self.checked(&["save", tag.as_str()])?.stdout)
    }

    fn load(&self, data: &[u8], tag: &ImageTag) -> Result<(), RuntimeError> {
        debug!("{} load ({} bytes)", self.binary, data.len());
        let mut child = Command::new(&self.binary)
            .args(["load", "--quiet"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(data)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(classify_engine_failure(&String::from_utf8_lossy(
                &output.stderr,
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let loaded = stdout
            .lines()
            .find_map(|l| l.strip_prefix("Loaded image: "))
            .map(str::trim);
        match loaded {
            Some(name) if name == tag.as_str() => Ok(()),
            Some(name) => {
                self.checked(&["tag", name, tag.as_str()])?;
                Ok(())
            }
            None if self.image_exists(tag)? => Ok(()),
            None => Err(RuntimeError::ImageNotFound(tag.to_string())),
        }
    }
}
