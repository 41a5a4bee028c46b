use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

use crate::env::Environment;

pub mod helpers;

pub use helpers::{HelperError, Helpers, PmHelpers};

static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*(?:(pm\.[A-Za-z0-9_]+\(.*?\))|([A-Za-z0-9_]+))\s*\}\}")
        .expect("valid regex")
});

/// Substitutes `{{VAR}}` and `{{pm.helper(...)}}` in a single scan.
///
/// Unknown variables and failing helper calls are left exactly as written.
/// Replacement text is never rescanned.
pub fn resolve(text: &str, env: &Environment, helpers: &dyn Helpers) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }

    PLACEHOLDER_PATTERN
        .replace_all(text, |caps: &Captures<'_>| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            if let Some(call) = caps.get(1) {
                return match evaluate_helper(call.as_str(), helpers) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(expression = %call.as_str(), error = %err, "helper call failed, keeping it verbatim");
                        whole.to_string()
                    }
                };
            }
            caps.get(2)
                .and_then(|name| env.get(name.as_str()))
                .map_or_else(|| whole.to_string(), str::to_string)
        })
        .into_owned()
}

/// Applies [`resolve`] to every string leaf of a JSON value.
pub fn resolve_value(value: &Value, env: &Environment, helpers: &dyn Helpers) -> Value {
    match value {
        Value::String(text) => Value::String(resolve(text, env, helpers)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| resolve_value(item, env, helpers))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), resolve_value(item, env, helpers)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn evaluate_helper(expr: &str, helpers: &dyn Helpers) -> Result<String, HelperError> {
    let (name, args) = helpers::parse_call(expr)?;
    helpers.call(&name, &args)
}
