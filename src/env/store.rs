use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{is_valid_key, EnvStore, Environment};
use crate::error::PersistenceError;

pub const ENV_FILE_NAME: &str = ".environment-variables";

/// `.environment-variables` in the collection root.
#[derive(Debug, Clone)]
pub struct FileEnvStore {
    path: PathBuf,
}

impl FileEnvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_collection(root: &Path) -> Self {
        Self::new(root.join(ENV_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EnvStore for FileEnvStore {
    fn load(&self) -> Result<Environment, PersistenceError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no environment file, starting empty");
            return Ok(Environment::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|source| PersistenceError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(parse_env_content(&content, &self.path))
    }

    fn save(&self, env: &Environment) -> Result<(), PersistenceError> {
        let write_err = |source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(serialize_env(env).as_bytes())
            .map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path)
            .map_err(|persist| write_err(persist.error))?;

        debug!(path = %self.path.display(), keys = env.persistable().count(), "environment saved");
        Ok(())
    }
}

/// Parses dotenv-style content; malformed lines are skipped so one bad entry
/// does not hide the rest of the file.
pub(crate) fn parse_env_content(content: &str, origin: &Path) -> Environment {
    let mut env = Environment::new();
    for item in dotenvy::from_read_iter(Cursor::new(content)) {
        match item {
            Ok((key, value)) => env.set(key, value),
            Err(err) => warn!(path = %origin.display(), error = %err, "skipping malformed environment line"),
        }
    }
    env
}

pub(crate) fn serialize_env(env: &Environment) -> String {
    let mut out = String::new();
    for (key, value) in env.persistable() {
        if !is_valid_key(key) {
            warn!(key = %key, "environment key cannot be persisted, skipping");
            continue;
        }
        out.push_str(key);
        out.push('=');
        out.push_str(&format_value(value));
        out.push('\n');
    }
    out
}

fn format_value(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        match ch {
            '\\' | '"' | '$' => {
                quoted.push('\\');
                quoted.push(ch);
            }
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

fn needs_quotes(value: &str) -> bool {
    value
        .chars()
        .any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '\\' | '$' | '#'))
}
