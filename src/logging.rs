//! Subscriber setup for the binary: a console layer on stderr and an optional
//! per-run log file that always captures debug output.

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::debug;
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Environment variable that overrides the console filter.
pub const LOG_ENV_VAR: &str = "COLRUN_LOG";

fn console_filter(verbose: bool) -> EnvFilter {
    let directives = std::env::var(LOG_ENV_VAR)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok();
    filter_from(directives.as_deref(), verbose)
}

/// Explicit directives win; invalid ones fall back to `info`.
fn filter_from(directives: Option<&str>, verbose: bool) -> EnvFilter {
    match directives {
        Some(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::new(if verbose { "debug" } else { "info" }),
    }
}

/// `run_<timestamp>.log` inside `log_dir`.
pub fn log_file_path(log_dir: &Path) -> PathBuf {
    log_dir.join(format!("run_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

/// Installs the global subscriber. Returns the log file path when a log
/// directory was given.
pub fn init_logging(log_dir: Option<&Path>, verbose: bool) -> Result<Option<PathBuf>> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_filter(console_filter(verbose));

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = log_file_path(dir);
            let file = File::create(&path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .context("installing log subscriber")?;

    if let Some(path) = &log_path {
        debug!(path = %path.display(), "logging to file");
    }
    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_is_timestamped_inside_dir() {
        let temp = tempdir().unwrap();
        let path = log_file_path(temp.path());
        assert_eq!(path.parent(), Some(temp.path()));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("run_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "run_20240101_120000.log".len());
    }

    #[test]
    fn console_level_follows_verbosity_unless_overridden() {
        assert_eq!(filter_from(None, false).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(filter_from(None, true).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            filter_from(Some("warn"), true).max_level_hint(),
            Some(LevelFilter::WARN)
        );
        assert_eq!(
            filter_from(Some("colrun=loud"), true).max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
