//! File logging with daily rotation in the local timezone.

use anyhow::{Result, anyhow};
use logroller::{LogRollerBuilder, Rotation, RotationAge, TimeZone};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;

use crate::config::Config;

/// Log files are named `hug-analyze.YYYY-MM-DD`.
pub const LOG_PREFIX: &str = "hug-analyze";

/// Environment variable holding an `EnvFilter` directive (default `debug`).
pub const LOG_FILTER_ENV: &str = "HUG_ANALYZE_LOG";

const RETENTION: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Install the global subscriber writing to `config.log_path`.
///
/// The returned guard flushes buffered lines on drop; keep it alive until exit.
pub fn init(config: &Config) -> Result<WorkerGuard> {
    if !config.log_path.exists() {
        fs::create_dir_all(&config.log_path)?;
    }
    cleanup_old_logs(&config.log_path)?;

    let appender = LogRollerBuilder::new(config.log_path.as_path(), Path::new(LOG_PREFIX))
        .rotation(Rotation::AgeBased(RotationAge::Daily))
        .time_zone(TimeZone::Local)
        .max_keep_files(3)
        .build()
        .map_err(|e| anyhow!("Failed to create log roller: {e}"))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let time_format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let local_offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(local_offset, time_format);

    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::DEBUG.as_str()));

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(timer),
    );
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set global subscriber: {e}"))?;

    tracing::debug!(log_path = %config.log_path.display(), "logging initialized");
    Ok(guard)
}

/// Remove our log files last modified more than three days ago.
pub fn cleanup_old_logs(log_path: &Path) -> Result<()> {
    if !log_path.exists() {
        return Ok(());
    }
    let cutoff = SystemTime::now() - RETENTION;

    for entry in fs::read_dir(log_path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_ours = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_PREFIX));
        if !is_ours {
            continue;
        }

        if let Ok(metadata) = entry.metadata()
            && let Ok(modified) = metadata.modified()
            && modified < cutoff
        {
            let _ = fs::remove_file(&path);
        }
    }

    Ok(())
}
