use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::{env::Environment, executor::HttpResponse};

use super::SharedScope;

const OPERATORS: [&str; 7] = ["==", "!=", "<=", ">=", "<", ">", "=~"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeExpr {
    StatusCode,
    Duration,
    ResponseBody { pointer: Option<String> },
    ResponseHeader(String),
    Env(String),
    Shared(String),
}

/// What an expression can read.
pub struct ExprScope<'a> {
    pub env: &'a Environment,
    pub response: Option<&'a HttpResponse>,
    pub shared: &'a SharedScope,
}

pub fn parse_runtime_expr(expr: &str) -> Result<RuntimeExpr, String> {
    let expr = expr.trim();
    let named = |prefix: &str| {
        expr.strip_prefix(prefix)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    };

    match expr {
        "$statusCode" => return Ok(RuntimeExpr::StatusCode),
        "$duration" => return Ok(RuntimeExpr::Duration),
        "$response.body" => return Ok(RuntimeExpr::ResponseBody { pointer: None }),
        _ => {}
    }

    if let Some(pointer) = expr.strip_prefix("$response.body#") {
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(format!("invalid JSON pointer in {expr}"));
        }
        return Ok(RuntimeExpr::ResponseBody {
            pointer: Some(pointer.to_string()),
        });
    }
    if let Some(name) = named("$response.header.") {
        return Ok(RuntimeExpr::ResponseHeader(name));
    }
    if let Some(key) = named("$env.") {
        return Ok(RuntimeExpr::Env(key));
    }
    if let Some(name) = named("$shared.") {
        return Ok(RuntimeExpr::Shared(name));
    }

    Err(format!("unknown runtime expression: {expr}"))
}

pub fn eval_runtime_expr(expr: &str, scope: &ExprScope<'_>) -> Result<JsonValue, String> {
    let response = || {
        scope
            .response
            .ok_or_else(|| format!("{expr} needs a response, but none was received"))
    };

    match parse_runtime_expr(expr)? {
        RuntimeExpr::StatusCode => Ok(JsonValue::from(scope.response.map_or(0, |r| r.status))),
        RuntimeExpr::Duration => Ok(scope
            .response
            .and_then(|r| serde_json::Number::from_f64(r.duration_ms))
            .map_or(JsonValue::Null, JsonValue::Number)),
        RuntimeExpr::ResponseBody { pointer: None } => {
            let resp = response()?;
            Ok(resp.json().unwrap_or_else(|_| JsonValue::String(resp.text())))
        }
        RuntimeExpr::ResponseBody {
            pointer: Some(pointer),
        } => {
            let json = response()?
                .json()
                .map_err(|err| format!("response body is not JSON: {err}"))?;
            Ok(json.pointer(&pointer).cloned().unwrap_or(JsonValue::Null))
        }
        RuntimeExpr::ResponseHeader(name) => Ok(response()?
            .header(&name)
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_string()))),
        RuntimeExpr::Env(key) => Ok(scope
            .env
            .get(&key)
            .map_or(JsonValue::Null, |value| JsonValue::String(value.to_string()))),
        RuntimeExpr::Shared(name) => Ok(scope.shared.get(&name).cloned().unwrap_or(JsonValue::Null)),
    }
}

/// Result of a condition, with the left-hand value for messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionResult {
    pub passed: bool,
    pub actual: JsonValue,
}

/// `<expr> <op> <literal>`, or a bare `<expr>` tested for truthiness.
pub fn evaluate_condition(condition: &str, scope: &ExprScope<'_>) -> Result<ConditionResult, String> {
    let condition = condition.trim();
    let (lhs, rest) = match condition.split_once(char::is_whitespace) {
        Some((lhs, rest)) => (lhs, rest.trim_start()),
        None => (condition, ""),
    };
    let actual = eval_runtime_expr(lhs, scope)?;

    if rest.is_empty() {
        return Ok(ConditionResult {
            passed: is_truthy(&actual),
            actual,
        });
    }

    let (op, literal) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if !OPERATORS.contains(&op) {
        return Err(format!("unknown operator `{op}` in condition: {condition}"));
    }
    let literal = literal.trim();

    let passed = if op == "=~" {
        let pattern = match parse_literal(literal) {
            JsonValue::String(text) => text,
            other => other.to_string(),
        };
        let regex = Regex::new(&pattern).map_err(|err| format!("invalid regex {pattern:?}: {err}"))?;
        regex.is_match(&display_value(&actual))
    } else {
        compare_values(&actual, &parse_literal(literal), op)
    };

    Ok(ConditionResult { passed, actual })
}

pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// Strings without JSON quotes; everything else as compact JSON.
pub fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn parse_literal(s: &str) -> JsonValue {
    let s = s.trim();

    if let Ok(value) = serde_json::from_str::<JsonValue>(s) {
        return value;
    }

    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return JsonValue::String(s[1..s.len() - 1].to_string());
    }

    JsonValue::String(s.to_string())
}

fn compare_values(actual: &JsonValue, expected: &JsonValue, op: &str) -> bool {
    match op {
        "==" => loose_eq(actual, expected),
        "!=" => !loose_eq(actual, expected),
        "<" => loose_cmp(actual, expected).is_some_and(Ordering::is_lt),
        ">" => loose_cmp(actual, expected).is_some_and(Ordering::is_gt),
        "<=" => loose_cmp(actual, expected).is_some_and(Ordering::is_le),
        ">=" => loose_cmp(actual, expected).is_some_and(Ordering::is_ge),
        _ => false,
    }
}

fn as_number(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Equality that lets `"200"` match `200`; headers are always strings.
fn loose_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(_), JsonValue::String(_)) | (JsonValue::String(_), JsonValue::Number(_)) => {
            matches!((as_number(a), as_number(b)), (Some(x), Some(y)) if x == y)
        }
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| loose_eq(l, r))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x
                    .iter()
                    .all(|(key, l)| y.get(key).is_some_and(|r| loose_eq(l, r)))
        }
        _ => a == b,
    }
}

fn loose_cmp(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a, b) {
            (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
            _ => None,
        },
    }
}
