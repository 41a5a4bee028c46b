use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use super::loader::LoadedConfig;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LOG_DIR: &str = "logs";

fn resolve_relative(base: &Path, value: &str) -> PathBuf {
    let candidate = Path::new(value);
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base.join(candidate)
    }
}

/// Everything a run needs besides the environment itself.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub root: PathBuf,
    pub timeout: Duration,
    pub default_headers: Vec<(String, String)>,
    /// Defaults beneath the persisted environment; never written back.
    pub variables: BTreeMap<String, String>,
    pub log_dir: PathBuf,
}

impl RunSettings {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            log_dir: root.join(DEFAULT_LOG_DIR),
            root,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_headers: Vec::new(),
            variables: BTreeMap::new(),
        }
    }
}

/// Layers CLI flags over `colrun.json` over built-in defaults.
#[derive(Debug, Clone)]
pub struct SettingsBuilder {
    root: PathBuf,
    config: Option<LoadedConfig>,
    explicit_timeout: Option<u64>,
    explicit_log_dir: Option<PathBuf>,
}

impl SettingsBuilder {
    pub fn new(root: PathBuf, config: Option<LoadedConfig>) -> Self {
        Self {
            root,
            config,
            explicit_timeout: None,
            explicit_log_dir: None,
        }
    }

    pub fn timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.explicit_timeout = secs;
        self
    }

    pub fn log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.explicit_log_dir = dir;
        self
    }

    pub fn build(&self) -> RunSettings {
        let mut settings = RunSettings::new(self.root.clone());

        if let Some(cfg) = &self.config {
            if let Some(secs) = cfg.config.timeout_secs {
                settings.timeout = Duration::from_secs(secs);
            }
            settings.default_headers = cfg
                .config
                .default_headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            settings.variables = cfg.config.variables.clone();
            if let Some(dir) = &cfg.config.log_dir {
                settings.log_dir = resolve_relative(&cfg.dir, dir);
            }
        }

        if let Some(secs) = self.explicit_timeout {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = &self.explicit_log_dir {
            settings.log_dir = if dir.is_absolute() {
                dir.clone()
            } else {
                self.root.join(dir)
            };
        }

        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_config() {
        let settings = SettingsBuilder::new(PathBuf::from("/collection"), None).build();
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.log_dir, PathBuf::from("/collection/logs"));
        assert!(settings.default_headers.is_empty());
    }

    #[test]
    fn explicit_flags_win_over_config() -> Result<()> {
        let temp = tempdir()?;
        std::fs::write(
            temp.path().join("colrun.json"),
            r#"{"timeoutSecs": 10, "logDir": "cfg-logs", "defaultHeaders": {"X-Client": "colrun"}}"#,
        )?;
        let loaded = load_config(temp.path())?;

        let from_config = SettingsBuilder::new(temp.path().to_path_buf(), loaded.clone()).build();
        assert_eq!(from_config.timeout, Duration::from_secs(10));
        assert_eq!(from_config.log_dir, temp.path().join("cfg-logs"));
        assert_eq!(
            from_config.default_headers,
            vec![("X-Client".to_string(), "colrun".to_string())]
        );

        let overridden = SettingsBuilder::new(temp.path().to_path_buf(), loaded)
            .timeout_secs(Some(2))
            .log_dir(Some(PathBuf::from("cli-logs")))
            .build();
        assert_eq!(overridden.timeout, Duration::from_secs(2));
        assert_eq!(overridden.log_dir, temp.path().join("cli-logs"));
        Ok(())
    }
}
