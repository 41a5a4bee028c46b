use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CONFIG_FILE_NAME: &str = "colrun.json";

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ColrunConfig {
    #[serde(rename = "timeoutSecs", skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(rename = "defaultHeaders", skip_serializing_if = "BTreeMap::is_empty")]
    pub default_headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    #[serde(rename = "logDir", skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    #[serde(flatten)]
    pub extras: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ColrunConfig,
    pub path: PathBuf,
    pub dir: PathBuf,
}

/// Loads `colrun.json` from a collection directory, or the given file.
pub fn load_config(target: &Path) -> Result<Option<LoadedConfig>> {
    let resolved = if target.is_absolute() {
        target.to_path_buf()
    } else {
        std::env::current_dir()?.join(target)
    };

    let (file_path, dir) = if resolved.is_dir() {
        (resolved.join(CONFIG_FILE_NAME), resolved)
    } else {
        let dir = match resolved.parent() {
            Some(parent) => parent.to_path_buf(),
            None => std::env::current_dir()?,
        };
        (resolved, dir)
    };

    if !file_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&file_path)
        .with_context(|| format!("reading config {}", file_path.display()))?;

    let config: ColrunConfig = serde_json::from_str(&contents)
        .with_context(|| format!("parsing config {}", file_path.display()))?;

    for key in config.extras.keys() {
        tracing::debug!(key = %key, path = %file_path.display(), "ignoring unknown config key");
    }

    Ok(Some(LoadedConfig {
        config,
        path: file_path,
        dir,
    }))
}
