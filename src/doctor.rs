use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::{Config, ConfigService};
use crate::engine::budget;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub version: String,
    pub git: ToolStatus,
    pub config_path: PathBuf,
    pub config_exists: bool,
    pub log_path: PathBuf,
    /// Timeout override from the environment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_override_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ToolStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Check that the git backend can be invoked and report where configuration lives.
pub fn run_doctor(config: &Config, config_path: Option<&Path>) -> DoctorReport {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(ConfigService::default_path);

    DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git: check_git(),
        config_exists: config_path.exists(),
        config_path,
        log_path: config.log_path.clone(),
        timeout_override_secs: budget::env_override(),
    }
}

fn check_git() -> ToolStatus {
    match Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => ToolStatus {
            available: true,
            version: parse_git_version(&String::from_utf8_lossy(&output.stdout)),
        },
        _ => ToolStatus {
            available: false,
            version: None,
        },
    }
}

/// `git version 2.43.0` -> `2.43.0`
fn parse_git_version(stdout: &str) -> Option<String> {
    stdout
        .trim()
        .strip_prefix("git version ")
        .map(|v| v.split_whitespace().next().unwrap_or(v).to_string())
}
