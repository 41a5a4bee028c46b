//! Postman v2.1 collection import.
//!
//! Folders become directories carrying a `config.yaml` with `FOLDER_NAME`,
//! requests become YAML descriptors, scripts become `.hook` files and the
//! optional Postman environment becomes `.environment-variables`.

mod headers;
mod model;
mod scripts;

pub use model::{ImportOptions, ImportResult, PostmanCollection, PostmanEnvironment};
pub use scripts::{convert_script, ConvertedScript};

use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use serde_yaml::{Mapping, Value as YamlValue};
use tracing::{info, warn};

use crate::{
    config::{ColrunConfig, CONFIG_FILE_NAME, FOLDER_CONFIG_FILES},
    env::{EnvStore, Environment, FileEnvStore},
    hooks::HookStage,
};

use headers::{enabled_headers, ensure_header};
use model::{value_to_string, PostmanBody, PostmanEvent, PostmanItem, PostmanRequest};

const SUPPORTED_SCHEMA: &str = "v2.1";

/// Converts a Postman export into a colrun collection under
/// `options.output`. Existing files with the same names are overwritten.
pub fn import_postman(options: &ImportOptions) -> Result<ImportResult> {
    let raw = fs::read_to_string(&options.collection)
        .with_context(|| format!("reading {}", options.collection.display()))?;
    let collection: PostmanCollection = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a Postman collection", options.collection.display()))?;

    let environment = options
        .environment
        .as_deref()
        .map(read_environment)
        .transpose()?;

    let mut result = ImportResult::default();
    if !collection.info.schema.contains(SUPPORTED_SCHEMA) {
        warning(
            &mut result,
            format!(
                "schema `{}` is not Postman {SUPPORTED_SCHEMA}; the import may be incomplete",
                collection.info.schema
            ),
        );
    }

    let output = &options.output;
    fs::create_dir_all(output).with_context(|| format!("creating {}", output.display()))?;
    info!(collection = %collection.info.name, output = %output.display(), "importing Postman collection");

    write_environment(output, environment.as_ref(), &mut result)?;
    write_collection_variables(output, &collection)?;
    write_hooks(output, None, &collection.event, &mut result)?;

    let mut taken = HashSet::new();
    for item in &collection.item {
        import_item(item, output, output, &mut taken, &mut result)?;
    }

    info!(
        folders = result.folders.len(),
        requests = result.requests.len(),
        hooks = result.hooks.len(),
        variables = result.variables,
        "import finished"
    );
    Ok(result)
}

fn read_environment(path: &Path) -> Result<PostmanEnvironment> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a Postman environment", path.display()))
}

fn warning(result: &mut ImportResult, message: String) {
    warn!("{message}");
    result.warnings.push(message);
}

/// "Get All Users" -> "get-all-users"
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            slug.push(ch);
        } else if (ch.is_whitespace() || ch == '-') && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "request".to_string()
    } else {
        slug.to_string()
    }
}

/// First free name in `dir`: `slug`, `slug-2`, `slug-3`, ...
fn unique_name(dir: &Path, slug: &str, taken: &mut HashSet<PathBuf>) -> String {
    let mut candidate = slug.to_string();
    let mut counter = 2;
    while !taken.insert(dir.join(&candidate)) {
        candidate = format!("{slug}-{counter}");
        counter += 1;
    }
    candidate
}

fn import_item(
    item: &PostmanItem,
    dir: &Path,
    root: &Path,
    taken: &mut HashSet<PathBuf>,
    result: &mut ImportResult,
) -> Result<()> {
    let name = unique_name(dir, &slugify(&item.name), taken);

    if let Some(children) = &item.item {
        let folder = dir.join(&name);
        fs::create_dir_all(&folder).with_context(|| format!("creating {}", folder.display()))?;

        let mut config = Mapping::new();
        config.insert("FOLDER_NAME".into(), item.name.clone().into());
        write_yaml(&folder.join(FOLDER_CONFIG_FILES[0]), &YamlValue::Mapping(config))?;
        result.folders.push(folder.clone());

        if !item.event.is_empty() {
            warning(
                result,
                format!("scripts on folder `{}` are not imported", item.name),
            );
        }
        for child in children {
            import_item(child, &folder, root, taken, result)?;
        }
        return Ok(());
    }

    let Some(request) = &item.request else {
        warning(result, format!("`{}` is neither a folder nor a request", item.name));
        return Ok(());
    };

    let path = dir.join(format!("{name}.yaml"));
    let descriptor = request_descriptor(request, &item.name, result);
    write_yaml(&path, &descriptor)?;
    info!(request = %path.display(), "request written");
    result.requests.push(path.clone());

    write_hooks(root, Some(&path), &item.event, result)
}

fn request_descriptor(request: &PostmanRequest, name: &str, result: &mut ImportResult) -> YamlValue {
    let mut descriptor = Mapping::new();

    let mut target = Mapping::new();
    target.insert(
        "method".into(),
        request
            .method
            .clone()
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase()
            .into(),
    );
    target.insert("url".into(), request.url.base().into());
    descriptor.insert("request".into(), YamlValue::Mapping(target));

    let params: Vec<(String, String)> = request
        .url
        .query()
        .iter()
        .filter(|param| !param.disabled && !param.key.is_empty())
        .map(|param| (param.key.clone(), param.value_string()))
        .collect();
    if !params.is_empty() {
        descriptor.insert("params".into(), string_map(&params));
    }

    if let Some(auth) = &request.auth {
        match auth.kind.as_str() {
            "bearer" => {
                let mut section = Mapping::new();
                section.insert(
                    "bearer_token".into(),
                    auth.bearer_token().unwrap_or_default().into(),
                );
                descriptor.insert("authentication".into(), YamlValue::Mapping(section));
            }
            "basic" => {
                let (username, password) = auth.basic_credentials();
                let mut credentials = Mapping::new();
                credentials.insert("username".into(), username.into());
                credentials.insert("password".into(), password.into());
                let mut section = Mapping::new();
                section.insert("basic_auth".into(), YamlValue::Mapping(credentials));
                descriptor.insert("authentication".into(), YamlValue::Mapping(section));
            }
            "noauth" | "" => {}
            other => warning(
                result,
                format!("`{name}` uses unsupported auth type `{other}`; configure it by hand"),
            ),
        }
    }

    let mut headers = enabled_headers(&request.header);
    let body = request
        .body
        .as_ref()
        .and_then(|body| request_body(body, name, &mut headers, result));
    if !headers.is_empty() {
        descriptor.insert("headers".into(), string_map(&headers));
    }
    if let Some(body) = body {
        descriptor.insert("body".into(), body);
    }

    YamlValue::Mapping(descriptor)
}

fn request_body(
    body: &PostmanBody,
    name: &str,
    headers: &mut Vec<(String, String)>,
    result: &mut ImportResult,
) -> Option<YamlValue> {
    match body.mode.as_str() {
        "raw" => {
            if body.raw.is_empty() {
                return None;
            }
            // pretty-printed JSON serializes as a readable block scalar
            match serde_json::from_str::<JsonValue>(&body.raw) {
                Ok(json) => {
                    if body.raw_language() == Some("json") {
                        ensure_header(headers, "Content-Type", "application/json");
                    }
                    let pretty = serde_json::to_string_pretty(&json).unwrap_or_else(|_| body.raw.clone());
                    Some(pretty.into())
                }
                Err(_) => Some(body.raw.clone().into()),
            }
        }
        "urlencoded" => {
            ensure_header(headers, "Content-Type", "application/x-www-form-urlencoded");
            let fields: Vec<(String, String)> = body
                .urlencoded
                .iter()
                .filter(|field| !field.disabled)
                .map(|field| (field.key.clone(), field.value_string()))
                .collect();
            Some(string_map(&fields))
        }
        "formdata" => {
            ensure_header(headers, "Content-Type", "multipart/form-data");
            let mut fields = Mapping::new();
            for field in body.formdata.iter().filter(|field| !field.disabled) {
                let value = if field.is_file() {
                    let src = field.file_src().unwrap_or_else(|| {
                        warning(
                            result,
                            format!("`{name}` form field `{}` has no file; set its src", field.key),
                        );
                        field.key.clone()
                    });
                    file_marker(&src)
                } else {
                    field.value_string().into()
                };
                fields.insert(field.key.clone().into(), value);
            }
            Some(YamlValue::Mapping(fields))
        }
        "file" => {
            ensure_header(headers, "Content-Type", "multipart/form-data");
            let src = body
                .file
                .as_ref()
                .and_then(|file| file.src.as_ref())
                .and_then(model::src_string)
                .unwrap_or_else(|| {
                    warning(result, format!("`{name}` has a file body without a file; set its src"));
                    "file".to_string()
                });
            let mut fields = Mapping::new();
            fields.insert("file".into(), file_marker(&src));
            Some(YamlValue::Mapping(fields))
        }
        "" | "none" => None,
        other => {
            warning(
                result,
                format!("`{name}` uses unsupported body mode `{other}`; the body was dropped"),
            );
            None
        }
    }
}

fn file_marker(src: &str) -> YamlValue {
    let mut marker = Mapping::new();
    marker.insert("type".into(), "file".into());
    marker.insert("src".into(), src.into());
    YamlValue::Mapping(marker)
}

fn string_map(pairs: &[(String, String)]) -> YamlValue {
    let mut map = Mapping::new();
    for (key, value) in pairs {
        map.insert(key.clone().into(), value.clone().into());
    }
    YamlValue::Mapping(map)
}

fn write_yaml(path: &Path, value: &YamlValue) -> Result<()> {
    let yaml = serde_yaml::to_string(value).with_context(|| format!("serializing {}", path.display()))?;
    fs::write(path, yaml).with_context(|| format!("writing {}", path.display()))
}

/// Postman `prerequest`/`test` events as pre/post hooks, for the collection
/// when `request` is `None`.
fn write_hooks(
    root: &Path,
    request: Option<&Path>,
    events: &[PostmanEvent],
    result: &mut ImportResult,
) -> Result<()> {
    for event in events {
        let stage = match (event.listen.as_str(), request.is_some()) {
            ("prerequest", true) => HookStage::RequestPre,
            ("test", true) => HookStage::RequestPost,
            ("prerequest", false) => HookStage::CollectionPre,
            ("test", false) => HookStage::CollectionPost,
            (other, _) => {
                warning(result, format!("script event `{other}` is not supported"));
                continue;
            }
        };
        let lines = event.script.exec.lines();
        if lines.iter().all(|line| line.trim().is_empty()) {
            continue;
        }

        let converted = convert_script(&lines, &event.listen);
        let path = stage.script_path(root, request);
        fs::write(&path, &converted.contents)
            .with_context(|| format!("writing {}", path.display()))?;
        if converted.unconverted > 0 {
            warning(
                result,
                format!(
                    "{}: {} script line(s) need manual conversion",
                    path.display(),
                    converted.unconverted
                ),
            );
        }
        result.hooks.push(path);
    }
    Ok(())
}

fn write_environment(
    output: &Path,
    environment: Option<&PostmanEnvironment>,
    result: &mut ImportResult,
) -> Result<()> {
    let env: Environment = environment
        .map(|environment| {
            environment
                .values
                .iter()
                .filter(|value| value.enabled && !value.key.is_empty())
                .map(|value| (value.key.clone(), value_to_string(&value.value)))
                .collect()
        })
        .unwrap_or_default();

    result.variables = env.len();
    FileEnvStore::for_collection(output)
        .save(&env)
        .context("writing imported environment")
}

/// Collection-level Postman variables become non-persisted defaults in
/// `colrun.json`.
fn write_collection_variables(output: &Path, collection: &PostmanCollection) -> Result<()> {
    let variables: BTreeMap<String, String> = collection
        .variable
        .iter()
        .filter(|variable| !variable.disabled && !variable.key.is_empty())
        .map(|variable| (variable.key.clone(), variable.value_string()))
        .collect();
    if variables.is_empty() {
        return Ok(());
    }

    let config = ColrunConfig {
        variables,
        ..ColrunConfig::default()
    };
    let path = output.join(CONFIG_FILE_NAME);
    let json = serde_json::to_string_pretty(&config).context("serializing colrun.json")?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), variables = config.variables.len(), "collection variables written");
    Ok(())
}
