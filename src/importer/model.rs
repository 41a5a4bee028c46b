use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Postman v2.1 collection export.
    pub collection: PathBuf,
    /// Directory the colrun collection is written to.
    pub output: PathBuf,
    /// Optional Postman environment export.
    pub environment: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportResult {
    pub folders: Vec<PathBuf>,
    pub requests: Vec<PathBuf>,
    pub hooks: Vec<PathBuf>,
    pub variables: usize,
    pub warnings: Vec<String>,
}

// Postman v2.1 collection format. Only the parts colrun can express are
// modelled; everything else is ignored on deserialization.

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanCollection {
    pub info: CollectionInfo,
    pub item: Vec<PostmanItem>,
    pub event: Vec<PostmanEvent>,
    pub variable: Vec<KeyValue>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CollectionInfo {
    pub name: String,
    pub schema: String,
}

/// A folder when `item` is present, otherwise a request.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanItem {
    pub name: String,
    pub item: Option<Vec<PostmanItem>>,
    pub request: Option<PostmanRequest>,
    pub event: Vec<PostmanEvent>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanRequest {
    pub method: Option<String>,
    pub url: PostmanUrl,
    pub auth: Option<PostmanAuth>,
    pub header: Vec<KeyValue>,
    pub body: Option<PostmanBody>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PostmanUrl {
    Raw(String),
    Detailed {
        #[serde(default)]
        raw: String,
        #[serde(default)]
        query: Vec<KeyValue>,
    },
}

impl Default for PostmanUrl {
    fn default() -> Self {
        Self::Raw(String::new())
    }
}

impl PostmanUrl {
    pub fn raw(&self) -> &str {
        match self {
            Self::Raw(raw) | Self::Detailed { raw, .. } => raw,
        }
    }

    /// The raw URL without its query string when the query is also given
    /// as structured params.
    pub fn base(&self) -> &str {
        let raw = self.raw();
        if self.query().is_empty() {
            raw
        } else {
            raw.split_once('?').map_or(raw, |(base, _)| base)
        }
    }

    pub fn query(&self) -> &[KeyValue] {
        match self {
            Self::Raw(_) => &[],
            Self::Detailed { query, .. } => query,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanAuth {
    #[serde(rename = "type")]
    pub kind: String,
    pub bearer: Vec<KeyValue>,
    pub basic: Vec<KeyValue>,
}

impl PostmanAuth {
    pub fn bearer_token(&self) -> Option<String> {
        lookup(&self.bearer, "token")
    }

    pub fn basic_credentials(&self) -> (String, String) {
        (
            lookup(&self.basic, "username").unwrap_or_default(),
            lookup(&self.basic, "password").unwrap_or_default(),
        )
    }
}

fn lookup(entries: &[KeyValue], key: &str) -> Option<String> {
    entries
        .iter()
        .find(|entry| entry.key == key)
        .map(KeyValue::value_string)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanBody {
    pub mode: String,
    pub raw: String,
    pub urlencoded: Vec<KeyValue>,
    pub formdata: Vec<KeyValue>,
    pub file: Option<FileRef>,
    pub options: Option<Value>,
}

impl PostmanBody {
    /// `options.raw.language`, e.g. `json`.
    pub fn raw_language(&self) -> Option<&str> {
        self.options.as_ref()?.pointer("/raw/language")?.as_str()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FileRef {
    pub src: Option<Value>,
}

/// The key/value shape Postman uses for headers, query params, form fields,
/// auth attributes and variables.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct KeyValue {
    pub key: String,
    pub value: Option<Value>,
    pub disabled: bool,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub src: Option<Value>,
}

impl KeyValue {
    pub fn value_string(&self) -> String {
        self.value.as_ref().map(value_to_string).unwrap_or_default()
    }

    pub fn is_file(&self) -> bool {
        self.kind.as_deref() == Some("file")
    }

    /// First file path of a form field; Postman stores either a string or
    /// a list.
    pub fn file_src(&self) -> Option<String> {
        src_string(self.src.as_ref()?)
    }
}

pub fn src_string(src: &Value) -> Option<String> {
    match src {
        Value::String(path) if !path.is_empty() => Some(path.clone()),
        Value::Array(paths) => paths.iter().find_map(src_string),
        _ => None,
    }
}

pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanEvent {
    pub listen: String,
    pub script: PostmanScript,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanScript {
    pub exec: ScriptLines,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptLines {
    Many(Vec<String>),
    One(String),
}

impl Default for ScriptLines {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl ScriptLines {
    pub fn lines(&self) -> Vec<&str> {
        match self {
            Self::Many(lines) => lines.iter().map(String::as_str).collect(),
            Self::One(text) => text.lines().collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PostmanEnvironment {
    pub name: String,
    pub values: Vec<EnvironmentValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentValue {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}
