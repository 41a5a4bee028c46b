//! Best-effort translation of Postman JavaScript into hook steps.
//!
//! Only single-line statements with an obvious step equivalent are
//! translated. Every other line is carried over as a comment so nothing from
//! the original script is lost.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value as YamlValue};

const VARIABLE_SCOPES: &str = r"pm\.(?:environment|globals|collectionVariables|variables)";

static SET_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"^{VARIABLE_SCOPES}\.set\(\s*["']([^"']+)["']\s*,\s*["'](.*)["']\s*\);?$"#
    ))
    .expect("valid regex")
});

static SET_SCALAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"^{VARIABLE_SCOPES}\.set\(\s*["']([^"']+)["']\s*,\s*(-?\d+(?:\.\d+)?|true|false)\s*\);?$"#
    ))
    .expect("valid regex")
});

static SET_FROM_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r#"^{VARIABLE_SCOPES}\.set\(\s*["']([^"']+)["']\s*,\s*pm\.response\.json\(\)((?:\.[A-Za-z_][A-Za-z0-9_]*|\[\d+\])*)\s*\);?$"#
    ))
    .expect("valid regex")
});

static UNSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r#"^{VARIABLE_SCOPES}\.unset\(\s*["']([^"']+)["']\s*\);?$"#))
        .expect("valid regex")
});

static EXPECT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"pm\.response\.to\.have\.status\(\s*(\d{3})\s*\)").expect("valid regex"));

static CONSOLE_LOG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^console\.log\(\s*["']([^"']*)["']\s*\);?$"#).expect("valid regex")
});

static ACCESSOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.([A-Za-z_][A-Za-z0-9_]*)|\[(\d+)\]").expect("valid regex"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertedScript {
    /// Hook file contents.
    pub contents: String,
    pub converted: usize,
    pub unconverted: usize,
}

/// Converts the lines of one Postman script. `listen` is the Postman event
/// name and only used in the header comment.
pub fn convert_script(lines: &[&str], listen: &str) -> ConvertedScript {
    let mut steps = Vec::new();
    let mut leftovers = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match convert_line(trimmed) {
            Some(step) => steps.push(step),
            None => leftovers.push(*line),
        }
    }

    let mut contents = format!("# Imported from a Postman `{listen}` script.\n");
    if !leftovers.is_empty() {
        contents.push_str("# The JavaScript below has no step equivalent; convert it by hand.\n");
        for line in &leftovers {
            contents.push_str("#   ");
            contents.push_str(line.trim_end());
            contents.push('\n');
        }
    }
    let converted = steps.len();
    if !steps.is_empty() {
        // a sequence of plain mappings always serializes
        if let Ok(yaml) = serde_yaml::to_string(&YamlValue::Sequence(steps)) {
            contents.push_str(&yaml);
        }
    }

    ConvertedScript {
        contents,
        converted,
        unconverted: leftovers.len(),
    }
}

fn convert_line(line: &str) -> Option<YamlValue> {
    if let Some(caps) = SET_FROM_JSON.captures(line) {
        let pointer = json_pointer(&caps[2]);
        return Some(step(
            "extract",
            pairs(&caps[1], &format!("$response.body#{pointer}")),
        ));
    }
    if let Some(caps) = SET_STRING.captures(line).or_else(|| SET_SCALAR.captures(line)) {
        return Some(step("set", pairs(&caps[1], &caps[2])));
    }
    if let Some(caps) = UNSET.captures(line) {
        return Some(step(
            "unset",
            YamlValue::Sequence(vec![YamlValue::String(caps[1].to_string())]),
        ));
    }
    if let Some(caps) = EXPECT_STATUS.captures(line) {
        let code = &caps[1];
        let mut test = Mapping::new();
        test.insert("name".into(), format!("status is {code}").into());
        test.insert("that".into(), format!("$statusCode == {code}").into());
        return Some(step("test", YamlValue::Mapping(test)));
    }
    if let Some(caps) = CONSOLE_LOG.captures(line) {
        return Some(step("print", YamlValue::String(caps[1].to_string())));
    }
    None
}

fn step(kind: &str, value: YamlValue) -> YamlValue {
    let mut map = Mapping::new();
    map.insert(kind.into(), value);
    YamlValue::Mapping(map)
}

fn pairs(key: &str, value: &str) -> YamlValue {
    let mut map = Mapping::new();
    map.insert(key.into(), value.into());
    YamlValue::Mapping(map)
}

/// `.data.items[0].id` -> `/data/items/0/id`
fn json_pointer(accessors: &str) -> String {
    ACCESSOR
        .captures_iter(accessors)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|segment| format!("/{}", segment.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{parse_script, Step};
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_statements_become_steps() {
        let converted = convert_script(
            &[
                "pm.environment.set(\"TOKEN\", pm.response.json().data.items[0].token);",
                "pm.environment.set('MODE', 'fast');",
                "pm.collectionVariables.set(\"RETRIES\", 3);",
                "pm.environment.unset(\"OLD\");",
                "console.log(\"done\");",
                "",
            ],
            "test",
        );
        assert_eq!(converted.converted, 5);
        assert_eq!(converted.unconverted, 0);

        let script = parse_script(&converted.contents).unwrap();
        assert_eq!(
            script.steps,
            vec![
                Step::Extract(vec![(
                    "TOKEN".to_string(),
                    "$response.body#/data/items/0/token".to_string()
                )]),
                Step::Set(vec![("MODE".to_string(), "fast".to_string())]),
                Step::Set(vec![("RETRIES".to_string(), "3".to_string())]),
                Step::Unset(vec!["OLD".to_string()]),
                Step::Print("done".to_string()),
            ]
        );
    }

    #[test]
    fn status_expectation_becomes_a_test_and_wrapper_is_commented() {
        let converted = convert_script(
            &[
                "pm.test(\"Status code is 200\", function () {",
                "    pm.response.to.have.status(200);",
                "});",
            ],
            "test",
        );
        assert_eq!(converted.converted, 1);
        assert_eq!(converted.unconverted, 2);
        assert!(converted.contents.contains("#   pm.test(\"Status code is 200\", function () {"));

        let script = parse_script(&converted.contents).unwrap();
        assert_eq!(
            script.steps,
            vec![Step::Test {
                name: "status is 200".to_string(),
                that: "$statusCode == 200".to_string()
            }]
        );
    }

    #[test]
    fn unconvertible_script_is_all_comments_and_still_parses() {
        let converted = convert_script(&["const x = pm.response.headers.get('X');"], "prerequest");
        assert_eq!(converted.converted, 0);
        assert!(parse_script(&converted.contents).unwrap().steps.is_empty());
    }
}
