use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde_yaml::Value as YamlValue;

use crate::parser::scalar_to_string;

pub const FOLDER_CONFIG_FILES: [&str; 2] = ["config.yaml", "config.yml"];

/// Variables from a directory's `config.yaml`, layered over the environment
/// for requests in that directory. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderOverrides {
    pub vars: BTreeMap<String, String>,
    pub source: Option<PathBuf>,
}

impl FolderOverrides {
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

pub fn is_folder_config(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| FOLDER_CONFIG_FILES.contains(&name))
}

/// Reads the first of `config.yaml` / `config.yml` present in `dir`.
pub fn load_folder_overrides(dir: &Path) -> Result<FolderOverrides> {
    let Some(path) = FOLDER_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| candidate.is_file())
    else {
        return Ok(FolderOverrides::default());
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("reading folder config {}", path.display()))?;
    let document: YamlValue = serde_yaml::from_str(&contents)
        .with_context(|| format!("parsing folder config {}", path.display()))?;

    let vars = match document {
        YamlValue::Null => BTreeMap::new(),
        YamlValue::Mapping(map) => map
            .iter()
            .map(|(key, value)| (scalar_to_string(key), scalar_to_string(value)))
            .collect(),
        _ => bail!("folder config {} must be a mapping", path.display()),
    };

    Ok(FolderOverrides {
        vars,
        source: Some(path),
    })
}
