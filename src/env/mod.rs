use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::error::PersistenceError;

mod store;

pub use store::{FileEnvStore, ENV_FILE_NAME};

/// Keys starting with this prefix are run-internal and never persisted.
pub const RESERVED_PREFIX: &str = "__";
pub const COLLECTION_ROOT_KEY: &str = "__COLLECTION_ROOT";
pub const REQUEST_PATH_KEY: &str = "__REQUEST_PATH";

pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// Keys the environment file format can represent.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.'))
}

/// The collection's variable store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.vars.remove(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.vars.iter()
    }

    /// Entries that belong in the persisted file.
    pub fn persistable(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter().filter(|(key, _)| !is_reserved(key))
    }

    /// A copy of `self` with `layer` written on top.
    pub fn layered<'a, I>(&self, layer: I) -> Environment
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut merged = self.clone();
        for (key, value) in layer {
            merged.set(key.clone(), value.clone());
        }
        merged
    }

    /// What changed going from `before` to `self`.
    pub fn changes_since(&self, before: &Environment) -> EnvChanges {
        let mut changes = EnvChanges::default();
        for (key, value) in &self.vars {
            if before.get(key) != Some(value.as_str()) {
                changes.set.insert(key.clone(), value.clone());
            }
        }
        for key in before.vars.keys() {
            if !self.vars.contains_key(key) {
                changes.removed.insert(key.clone());
            }
        }
        changes
    }

    pub fn apply(&mut self, changes: &EnvChanges) {
        for key in &changes.removed {
            self.vars.remove(key);
        }
        for (key, value) in &changes.set {
            self.vars.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Environment {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.vars.iter()
    }
}

/// Keys a hook set or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct EnvChanges {
    pub set: BTreeMap<String, String>,
    pub removed: BTreeSet<String>,
}

impl EnvChanges {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

/// Durable storage for the environment.
pub trait EnvStore {
    /// # Errors
    /// Fails when the backing storage exists but cannot be read.
    fn load(&self) -> Result<Environment, PersistenceError>;

    /// # Errors
    /// Fails when the environment cannot be written.
    fn save(&self, env: &Environment) -> Result<(), PersistenceError>;
}
