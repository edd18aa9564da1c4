use crate::concurrency::shutdown_requested;
use crate::config::UsageSection;
use crate::HubError;
use exechub_runtime::{ContainerEngine, ContainerHandle, ContainerState, RunMode};
use exechub_schema::ImageTag;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stops and removes the test container when dropped, on every exit path.
struct ContainerGuard<'a> {
    engine: &'a dyn ContainerEngine,
    handle: ContainerHandle,
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        match self.engine.stop(&self.handle) {
            Ok(()) => debug!("removed test container {}", self.handle.id),
            Err(e) => warn!("failed to remove test container {}: {e}", self.handle.id),
        }
    }
}

/// Starts a freshly built image and checks that it comes up.
pub struct UsageTester<'a> {
    engine: &'a dyn ContainerEngine,
    timeout: Duration,
    daemon_grace: Duration,
    poll_interval: Duration,
}

impl<'a> UsageTester<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, settings: &UsageSection) -> Self {
        Self {
            engine,
            timeout: settings.timeout(),
            daemon_grace: settings.daemon_grace(),
            poll_interval: settings.poll_interval(),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Foreground: wait until ready, then stay up through the grace period.
    /// Daemon: stay up through the grace period.
    pub fn test(&self, tag: &ImageTag, mode: RunMode) -> Result<(), HubError> {
        info!("usage test of {tag} ({mode}, timeout {}s)", self.timeout.as_secs());
        let handle = self
            .engine
            .run(tag, mode)
            .map_err(|e| HubError::ContainerStart(e.to_string()))?;
        let guard = ContainerGuard {
            engine: self.engine,
            handle,
        };

        let result = match mode {
            RunMode::Foreground => self.wait_ready(&guard.handle),
            RunMode::Daemon => self.watch_alive(&guard.handle),
        };
        drop(guard);

        if result.is_ok() {
            info!("usage test of {tag} passed");
        }
        result
    }

    fn poll(&self, handle: &ContainerHandle) -> Result<ContainerState, HubError> {
        if shutdown_requested() {
            return Err(HubError::ContainerStart("interrupted".to_owned()));
        }
        let state = self
            .engine
            .state(handle)
            .map_err(|e| HubError::ContainerStart(e.to_string()))?;
        debug!("container {} is {state:?}", handle.id);
        match state {
            ContainerState::Exited(code) => Err(HubError::ContainerStart(format!(
                "container exited with code {code}"
            ))),
            ContainerState::Unhealthy => Err(HubError::ContainerStart(
                "container reported unhealthy".to_owned(),
            )),
            other => Ok(other),
        }
    }

    fn wait_ready(&self, handle: &ContainerHandle) -> Result<(), HubError> {
        let deadline = Instant::now() + self.timeout;
        while self.poll(handle)? != ContainerState::Ready {
            if Instant::now() >= deadline {
                return Err(HubError::ContainerStart(format!(
                    "not ready after {}s",
                    self.timeout.as_secs_f64()
                )));
            }
            std::thread::sleep(self.poll_interval);
        }
        // A ready report alone is not enough; the container has to stay up.
        self.stay_alive(handle, self.daemon_grace.min(self.timeout))
    }

    fn watch_alive(&self, handle: &ContainerHandle) -> Result<(), HubError> {
        self.stay_alive(handle, self.daemon_grace.min(self.timeout))
    }

    /// Poll at least once more, and until `window` has elapsed.
    fn stay_alive(&self, handle: &ContainerHandle, window: Duration) -> Result<(), HubError> {
        let until = Instant::now() + window;
        loop {
            std::thread::sleep(self.poll_interval);
            self.poll(handle)?;
            if Instant::now() >= until {
                return Ok(());
            }
        }
    }
}
