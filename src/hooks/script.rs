use serde_yaml::{Mapping, Value as YamlValue};

use crate::parser::scalar_to_string;

/// A parsed `.hook` file: steps run top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookScript {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Print(String),
    Set(Vec<(String, String)>),
    Unset(Vec<String>),
    Extract(Vec<(String, String)>),
    Share(Vec<(String, String)>),
    Test { name: String, that: String },
    Assert { name: String, that: String },
    Fail(String),
}

pub fn parse_script(contents: &str) -> Result<HookScript, String> {
    let document: YamlValue =
        serde_yaml::from_str(contents).map_err(|err| format!("invalid hook script: {err}"))?;

    let items = match document {
        YamlValue::Null => return Ok(HookScript::default()),
        YamlValue::Sequence(items) => items,
        _ => return Err("hook script must be a list of steps".to_string()),
    };

    let steps = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_step(item).map_err(|err| format!("step {}: {err}", index + 1)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(HookScript { steps })
}

fn parse_step(item: &YamlValue) -> Result<Step, String> {
    let map = item
        .as_mapping()
        .filter(|map| map.len() == 1)
        .ok_or_else(|| "each step must be a single-key mapping".to_string())?;
    let Some((key, value)) = map.iter().next() else {
        return Err("empty step".to_string());
    };

    let kind = scalar_to_string(key);
    match kind.as_str() {
        "print" => Ok(Step::Print(scalar_to_string(value))),
        "set" => Ok(Step::Set(pairs(value, "set")?)),
        "unset" => Ok(Step::Unset(keys(value)?)),
        "extract" => Ok(Step::Extract(pairs(value, "extract")?)),
        "share" => Ok(Step::Share(pairs(value, "share")?)),
        "test" => {
            let (name, that) = named_condition(value, "test")?;
            Ok(Step::Test { name, that })
        }
        "assert" => {
            let (name, that) = named_condition(value, "assert")?;
            Ok(Step::Assert { name, that })
        }
        "fail" => Ok(Step::Fail(scalar_to_string(value))),
        other => Err(format!("unknown step `{other}`")),
    }
}

fn pairs(value: &YamlValue, step: &str) -> Result<Vec<(String, String)>, String> {
    value
        .as_mapping()
        .map(|map| {
            map.iter()
                .map(|(key, item)| (scalar_to_string(key), scalar_to_string(item)))
                .collect()
        })
        .ok_or_else(|| format!("`{step}` expects a mapping"))
}

fn keys(value: &YamlValue) -> Result<Vec<String>, String> {
    match value {
        YamlValue::String(single) => Ok(vec![single.clone()]),
        YamlValue::Sequence(items) => Ok(items.iter().map(scalar_to_string).collect()),
        _ => Err("`unset` expects a key or a list of keys".to_string()),
    }
}

/// `assert: <condition>` or `{name, that}`.
fn named_condition(value: &YamlValue, step: &str) -> Result<(String, String), String> {
    match value {
        YamlValue::String(that) => Ok((that.clone(), that.clone())),
        YamlValue::Mapping(map) => {
            let that = field(map, "that").ok_or_else(|| format!("`{step}` needs `that`"))?;
            let name = field(map, "name").unwrap_or_else(|| that.clone());
            Ok((name, that))
        }
        _ => Err(format!("`{step}` expects a condition or {{name, that}}")),
    }
}

fn field(map: &Mapping, name: &str) -> Option<String> {
    map.get(name)
        .map(scalar_to_string)
        .filter(|value| !value.trim().is_empty())
}
