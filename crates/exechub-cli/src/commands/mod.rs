pub mod build;
pub mod completions;
pub mod list;
pub mod pull;

use exechub_core::{FailureReason, HubError};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_IMAGE_EXISTS: u8 = 3;
pub const EXIT_IMAGE_NOT_FOUND: u8 = 4;
pub const EXIT_AUTH_FAILURE: u8 = 5;

pub fn exit_code(reason: FailureReason) -> u8 {
    match reason {
        FailureReason::ManifestMissing | FailureReason::ManifestInvalid => EXIT_MANIFEST_ERROR,
        FailureReason::ImageAlreadyExists => EXIT_IMAGE_EXISTS,
        FailureReason::ImageNotFound => EXIT_IMAGE_NOT_FOUND,
        FailureReason::AuthenticationFailure => EXIT_AUTH_FAILURE,
        _ => EXIT_FAILURE,
    }
}

/// A command failure with the process exit code it maps to.
#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<HubError> for CliError {
    fn from(err: HubError) -> Self {
        Self {
            code: exit_code(err.reason()),
            message: err.to_string(),
        }
    }
}

impl From<String> for CliError {
    fn from(message: String) -> Self {
        Self {
            code: EXIT_FAILURE,
            message,
        }
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::from(format!("JSON serialization failed: {e}")))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// A spinner, or nothing when output is machine-readable.
pub fn maybe_spinner(json: bool, msg: &str) -> Option<ProgressBar> {
    (!json).then(|| spinner(msg))
}

pub fn spin_ok(pb: Option<&ProgressBar>, msg: &str) {
    if let Some(pb) = pb {
        pb.set_style(plain_style());
        pb.finish_with_message(format!("✓ {msg}"));
    }
}

pub fn spin_fail(pb: Option<&ProgressBar>, msg: &str) {
    if let Some(pb) = pb {
        pb.set_style(plain_style());
        pb.finish_with_message(format!("✗ {msg}"));
    }
}

pub fn colorize_outcome(outcome: Option<bool>) -> String {
    use console::Style;
    match outcome {
        Some(true) => Style::new().green().apply_to("passed").to_string(),
        Some(false) => Style::new().red().bold().apply_to("failed").to_string(),
        None => Style::new().dim().apply_to("skipped").to_string(),
    }
}
