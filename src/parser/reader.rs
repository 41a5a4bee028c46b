use std::path::Path;

use serde_json::Value;
use serde_yaml::{Mapping, Value as YamlValue};
use tokio::fs;

use crate::error::ParseError;

use super::model::{Auth, BodyField, BodyTemplate, RequestDescriptor};

pub async fn parse_request_file(path: &Path) -> Result<RequestDescriptor, ParseError> {
    let raw = fs::read_to_string(path)
        .await
        .map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    parse_request_contents(&raw, path)
}

pub fn parse_request_contents(contents: &str, path: &Path) -> Result<RequestDescriptor, ParseError> {
    let document: YamlValue = serde_yaml::from_str(contents).map_err(|source| ParseError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    let root = match document {
        YamlValue::Mapping(map) if !map.is_empty() => map,
        _ => {
            return Err(ParseError::NotAMapping {
                path: path.to_path_buf(),
            })
        }
    };

    let invalid = |field: &str, reason: &str| ParseError::InvalidField {
        path: path.to_path_buf(),
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let request = match root.get("request") {
        None | Some(YamlValue::Null) => Mapping::new(),
        Some(YamlValue::Mapping(map)) => map.clone(),
        Some(_) => return Err(invalid("request", "expected a mapping with method and url")),
    };
    let method = request
        .get("method")
        .map(scalar_to_string)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "GET".to_string())
        .trim()
        .to_ascii_uppercase();
    let url = request.get("url").map(scalar_to_string).unwrap_or_default();

    let params = string_pairs(root.get("params")).ok_or_else(|| invalid("params", "expected a mapping"))?;
    let headers =
        string_pairs(root.get("headers")).ok_or_else(|| invalid("headers", "expected a mapping"))?;
    let auth = parse_auth(root.get("authentication")).map_err(|reason| invalid("authentication", &reason))?;
    let body = parse_body(root.get("body")).map_err(|reason| invalid("body", &reason))?;
    let dependencies = parse_dependencies(root.get("pre-requests"))
        .ok_or_else(|| invalid("pre-requests", "expected a list of request paths"))?;

    Ok(RequestDescriptor {
        path: path.to_path_buf(),
        method,
        url,
        params,
        headers,
        auth,
        body,
        dependencies,
    })
}

fn string_pairs(value: Option<&YamlValue>) -> Option<Vec<(String, String)>> {
    match value {
        None | Some(YamlValue::Null) => Some(Vec::new()),
        Some(YamlValue::Mapping(map)) => Some(
            map.iter()
                .map(|(key, value)| (scalar_to_string(key), scalar_to_string(value)))
                .collect(),
        ),
        Some(_) => None,
    }
}

fn parse_auth(value: Option<&YamlValue>) -> Result<Auth, String> {
    let map = match value {
        None | Some(YamlValue::Null) => return Ok(Auth::None),
        Some(YamlValue::Mapping(map)) => map,
        Some(_) => return Err("expected a mapping".to_string()),
    };

    if let Some(token) = map.get("bearer_token") {
        return Ok(Auth::Bearer {
            token: scalar_to_string(token),
        });
    }

    match map.get("basic_auth") {
        None => Ok(Auth::None),
        Some(YamlValue::Mapping(basic)) => Ok(Auth::Basic {
            username: basic.get("username").map(scalar_to_string).unwrap_or_default(),
            password: basic.get("password").map(scalar_to_string).unwrap_or_default(),
        }),
        Some(_) => Err("basic_auth needs username and password".to_string()),
    }
}

fn parse_body(value: Option<&YamlValue>) -> Result<Option<BodyTemplate>, String> {
    match value {
        None | Some(YamlValue::Null) => Ok(None),
        Some(YamlValue::String(text)) if text.is_empty() => Ok(None),
        Some(YamlValue::Mapping(map)) => {
            let mut fields = Vec::with_capacity(map.len());
            for (key, item) in map {
                let name = scalar_to_string(key);
                let field = match file_marker(item) {
                    Some(src) => BodyField::File { src },
                    None => BodyField::Value(yaml_to_json(item)),
                };
                fields.push((name, field));
            }
            Ok(Some(BodyTemplate::Fields(fields)))
        }
        Some(YamlValue::Sequence(_)) => Err("expected text or a mapping".to_string()),
        Some(other) => Ok(Some(BodyTemplate::Raw(scalar_to_string(other)))),
    }
}

/// `{type: file, src: ...}`; a missing `src` is left empty for the builder
/// to skip.
fn file_marker(value: &YamlValue) -> Option<String> {
    let map = value.as_mapping()?;
    if map.get("type").and_then(YamlValue::as_str) != Some("file") {
        return None;
    }
    Some(map.get("src").map(scalar_to_string).unwrap_or_default())
}

fn parse_dependencies(value: Option<&YamlValue>) -> Option<Vec<String>> {
    match value {
        None | Some(YamlValue::Null) => Some(Vec::new()),
        Some(YamlValue::String(single)) => Some(vec![single.clone()]),
        Some(YamlValue::Sequence(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(_) => None,
    }
}

/// Stringifies a YAML value the way it would be typed in a template.
pub fn scalar_to_string(value: &YamlValue) -> String {
    match value {
        YamlValue::Null => String::new(),
        YamlValue::Bool(flag) => flag.to_string(),
        YamlValue::Number(number) => number.to_string(),
        YamlValue::String(text) => text.clone(),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => yaml_to_json(value).to_string(),
        YamlValue::Tagged(tagged) => scalar_to_string(&tagged.value),
    }
}

pub fn yaml_to_json(value: &YamlValue) -> Value {
    match value {
        YamlValue::Null => Value::Null,
        YamlValue::Bool(flag) => Value::Bool(*flag),
        YamlValue::Number(number) => {
            if let Some(int) = number.as_i64() {
                Value::from(int)
            } else if let Some(uint) = number.as_u64() {
                Value::from(uint)
            } else {
                number
                    .as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        YamlValue::String(text) => Value::String(text.clone()),
        YamlValue::Sequence(items) => Value::Array(items.iter().map(yaml_to_json).collect()),
        YamlValue::Mapping(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (scalar_to_string(key), yaml_to_json(item)))
                .collect(),
        ),
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
