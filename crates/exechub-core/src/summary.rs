use crate::{FailureReason, HubError};
use chrono::{DateTime, Utc};
use exechub_remote::HostInfo;
use exechub_schema::Manifest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Outcome of one `build` invocation. Produced once, never mutated after return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub name: String,
    pub path: PathBuf,
    /// `namespace/name:version`, once the manifest resolved.
    pub image: Option<String>,
    /// Manifest version, empty when the manifest could not be read.
    pub version: String,
    pub manifest_info: Option<Manifest>,
    /// False if any enabled step failed.
    pub is_build_success: bool,
    /// `None` when the usage test was not requested.
    pub is_test_success: Option<bool>,
    /// `None` when push was not requested.
    pub is_push_success: Option<bool>,
    pub failure_reason: Option<FailureReason>,
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_info: Option<HostInfo>,
    pub last_build_time: DateTime<Utc>,
    pub build_duration_secs: f64,
}

impl BuildSummary {
    pub(crate) fn start(path: &Path) -> Self {
        Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path.to_path_buf(),
            image: None,
            version: String::new(),
            manifest_info: None,
            is_build_success: false,
            is_test_success: None,
            is_push_success: None,
            failure_reason: None,
            details: None,
            host_info: None,
            last_build_time: Utc::now(),
            build_duration_secs: 0.0,
        }
    }

    pub(crate) fn fail(&mut self, err: &HubError) {
        self.is_build_success = false;
        self.failure_reason = Some(err.reason());
        self.details = Some(err.to_string());
    }
}

fn read_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_owned())
        .filter(|h| !h.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Describe the machine running the build.
pub fn collect_host_info(engine: &str) -> HostInfo {
    HostInfo {
        hostname: read_hostname(),
        os: std::env::consts::OS.to_owned(),
        arch: std::env::consts::ARCH.to_owned(),
        user: std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_owned()),
        engine: engine.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_uses_directory_name() {
        let summary = BuildSummary::start(Path::new("/tmp/artifacts/hub-mwu"));
        assert_eq!(summary.name, "hub-mwu");
        assert!(!summary.is_build_success);
        assert!(summary.failure_reason.is_none());
    }

    #[test]
    fn fail_records_reason_and_details() {
        let mut summary = BuildSummary::start(Path::new("x"));
        summary.is_build_success = true;
        summary.fail(&HubError::ContainerStart("exited with code 1".to_owned()));
        assert!(!summary.is_build_success);
        assert_eq!(
            summary.failure_reason,
            Some(FailureReason::ContainerStartFailure)
        );
        assert!(summary.details.unwrap().contains("exited with code 1"));
    }

    #[test]
    fn host_info_has_platform() {
        let info = collect_host_info("mock");
        assert_eq!(info.engine, "mock");
        assert_eq!(info.os, std::env::consts::OS);
        assert!(!info.hostname.is_empty());
    }

    #[test]
    fn summary_serializes_to_json() {
        let summary = BuildSummary::start(Path::new("a"));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["is_build_success"], false);
        assert!(json.get("host_info").is_none());
    }
}
