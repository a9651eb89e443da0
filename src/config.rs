//! Configuration loading and generation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::ownership::OwnershipPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    /// Analysis defaults used when a request leaves a parameter out
    pub analysis: AnalysisSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            analysis: AnalysisSettings::default(),
        }
    }
}

/// `[analysis]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Minimum shared files for two commits to be related
    pub threshold: usize,
    pub depth: usize,
    pub max_results: usize,
    /// Minimum shared commits for a file pair
    pub cochange_threshold: usize,
    pub decay_days: i64,
    pub primary_pct: f64,
    pub secondary_pct: f64,
    pub stale_days: i64,
    /// Overrides the size-tier timeout; 0 disables it
    pub timeout_secs: Option<u64>,
    pub follow_renames: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        let policy = OwnershipPolicy::default();
        Self {
            threshold: 2,
            depth: 1,
            max_results: 20,
            cochange_threshold: 1,
            decay_days: 180,
            primary_pct: policy.primary_pct,
            secondary_pct: policy.secondary_pct,
            stale_days: policy.stale_days,
            timeout_secs: None,
            follow_renames: true,
        }
    }
}

impl AnalysisSettings {
    pub fn ownership_policy(&self) -> OwnershipPolicy {
        OwnershipPolicy {
            primary_pct: self.primary_pct,
            secondary_pct: self.secondary_pct,
            stale_days: self.stale_days,
        }
    }
}

/// Default log path: ~/.config/hug-analyze/logs
fn default_log_path() -> PathBuf {
    config_root().join("logs")
}

fn config_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("hug-analyze")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        config_root().join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Logs live next to the config file unless log_path was set explicitly
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<PathBuf> {
        let path = Self::default_path();
        Self::generate_at(&path)?;
        Ok(path)
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, Self::default_config_content())
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Default configuration content with comments.
    fn default_config_content() -> String {
        r#"# hug-analyze configuration file

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/hug-analyze/logs)
# log_path = "~/.config/hug-analyze/logs"

[analysis]
# Minimum number of shared files for two commits to count as related
threshold = 2
# Breadth-first levels explored from the root commit
depth = 1
# Maximum entries per result list
max_results = 20
# Minimum number of shared commits for a co-changing file pair
cochange_threshold = 1
# Days for a contribution's ownership weight to fall to 1/e
decay_days = 180
# Ownership share (percent) for the primary / secondary labels
primary_pct = 40.0
secondary_pct = 20.0
# Authors idle longer than this many days are flagged stale
stale_days = 180
# Fixed timeout in seconds, replacing the repository-size default (0 disables)
# timeout_secs = 60
# Include commits made under a file's earlier names
follow_renames = true
"#
        .to_string()
    }
}
