use std::collections::HashSet;

use super::model::KeyValue;

/// Enabled headers in order, first occurrence wins on case-insensitive
/// duplicates.
pub fn enabled_headers(headers: &[KeyValue]) -> Vec<(String, String)> {
    let mut present: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(headers.len());

    for header in headers {
        if header.disabled || header.key.trim().is_empty() {
            continue;
        }
        if present.insert(header.key.to_ascii_lowercase()) {
            result.push((header.key.clone(), header.value_string()));
        }
    }
    result
}

/// Adds `name: value` unless a header with that name already exists.
pub fn ensure_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    if !headers.iter().any(|(existing, _)| existing.eq_ignore_ascii_case(name)) {
        headers.push((name.to_string(), value.to_string()));
    }
}
