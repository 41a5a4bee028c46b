use std::path::PathBuf;

use serde_json::Value;

/// One request file, as written. Every string is still a template.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub path: PathBuf,
    pub method: String,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub auth: Auth,
    pub body: Option<BodyTemplate>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    #[default]
    None,
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyTemplate {
    Raw(String),
    Fields(Vec<(String, BodyField)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyField {
    Value(Value),
    File { src: String },
}

impl RequestDescriptor {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
