//! Hook scripts: declarative step lists run around requests and around the
//! whole collection.
//!
//! A hook sees the environment (read/write), the response when there is one,
//! the run-wide shared scope and the assertion ledger. The caller learns what
//! the hook changed through [`HookOutcome::changes`] and decides what to
//! persist.

use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::{
    env::{is_reserved, is_valid_key, EnvChanges, Environment},
    error::HookError,
    executor::HttpResponse,
    template::{resolve, Helpers},
};

mod expr;
mod script;

pub use expr::{
    display_value, eval_runtime_expr, evaluate_condition, parse_runtime_expr, ConditionResult,
    ExprScope, RuntimeExpr,
};
pub use script::{parse_script, HookScript, Step};

pub const HOOK_EXTENSION: &str = "hook";

/// Run-scoped values shared between hooks. Never persisted.
pub type SharedScope = BTreeMap<String, JsonValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookStage {
    CollectionPre,
    RequestPre,
    RequestPost,
    CollectionPost,
}

impl HookStage {
    /// Where this stage's script lives by convention.
    pub fn script_path(self, collection_root: &Path, request_path: Option<&Path>) -> PathBuf {
        match (self, request_path) {
            (Self::CollectionPre, _) => collection_root.join("collection.pre.hook"),
            (Self::CollectionPost, _) => collection_root.join("collection.post.hook"),
            (Self::RequestPre | Self::RequestPost, Some(request)) => {
                let suffix = if self == Self::RequestPre { "pre" } else { "post" };
                let stem = request
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                request.with_file_name(format!("{stem}.{suffix}.{HOOK_EXTENSION}"))
            }
            (Self::RequestPre, None) => collection_root.join(format!("request.pre.{HOOK_EXTENSION}")),
            (Self::RequestPost, None) => collection_root.join(format!("request.post.{HOOK_EXTENSION}")),
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CollectionPre => "collection-pre",
            Self::RequestPre => "request-pre",
            Self::RequestPost => "request-post",
            Self::CollectionPost => "collection-post",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub source: String,
    pub stage: HookStage,
    #[serde(flatten)]
    pub outcome: AssertionOutcome,
}

/// Every assertion recorded during a run, in order.
#[derive(Debug, Clone, Default)]
pub struct AssertionLedger {
    entries: Vec<LedgerEntry>,
}

impl AssertionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, source: impl Into<String>, stage: HookStage, outcome: AssertionOutcome) {
        self.entries.push(LedgerEntry {
            source: source.into(),
            stage,
            outcome,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn passed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.passed()
    }
}

pub struct HookContext<'a> {
    pub env: &'a mut Environment,
    pub response: Option<&'a HttpResponse>,
    pub shared: &'a mut SharedScope,
    pub ledger: &'a mut AssertionLedger,
    pub helpers: &'a dyn Helpers,
    pub stage: HookStage,
    /// Label recorded with each assertion, usually the request path.
    pub source: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOutcome {
    pub env_changed: bool,
    pub changes: EnvChanges,
    pub output: String,
    pub error: Option<HookError>,
    pub assertions: Vec<AssertionOutcome>,
}

impl HookOutcome {
    pub fn is_assertion_failure(&self) -> bool {
        self.error.as_ref().is_some_and(HookError::is_assertion_failure)
    }
}

/// Runs the script at `script_path` if it exists. A missing script is a
/// no-op. Environment edits made before an error are kept and reported.
pub fn run_hook(script_path: &Path, mut ctx: HookContext<'_>) -> HookOutcome {
    if !script_path.is_file() {
        return HookOutcome::default();
    }
    debug!(stage = %ctx.stage, script = %script_path.display(), "running hook");

    let before = ctx.env.clone();
    let mut outcome = HookOutcome::default();

    let result = fs::read_to_string(script_path)
        .map_err(|err| HookError::runtime(format!("reading {}: {err}", script_path.display())))
        .and_then(|contents| parse_script(&contents).map_err(HookError::runtime))
        .and_then(|script| execute(&script, &mut ctx, &mut outcome));

    match result {
        Err(err @ HookError::Runtime { .. }) => {
            error!(stage = %ctx.stage, script = %script_path.display(), error = %err, "hook failed");
            outcome.error = Some(err);
        }
        Err(err) => {
            warn!(stage = %ctx.stage, script = %script_path.display(), error = %err, "hook assertion failed");
            outcome.error = Some(err);
        }
        Ok(()) => {
            if let Some(failed) = outcome.assertions.iter().find(|a| !a.passed) {
                let err = HookError::Assertion {
                    name: failed.name.clone(),
                    message: failed.message.clone().unwrap_or_default(),
                };
                warn!(stage = %ctx.stage, script = %script_path.display(), error = %err, "hook test failed");
                outcome.error = Some(err);
            }
        }
    }

    outcome.changes = ctx.env.changes_since(&before);
    outcome.env_changed = !outcome.changes.is_empty();
    if !outcome.output.is_empty() {
        debug!(stage = %ctx.stage, output = %outcome.output.trim_end(), "hook output");
    }
    outcome
}

fn execute(script: &HookScript, ctx: &mut HookContext<'_>, outcome: &mut HookOutcome) -> Result<(), HookError> {
    for step in &script.steps {
        match step {
            Step::Print(template) => {
                outcome.output.push_str(&resolve(template, ctx.env, ctx.helpers));
                outcome.output.push('\n');
            }
            Step::Set(pairs) => {
                for (key, template) in pairs {
                    check_key(key)?;
                    let value = resolve(template, ctx.env, ctx.helpers);
                    ctx.env.set(key.clone(), value);
                }
            }
            Step::Unset(keys) => {
                for key in keys {
                    check_key(key)?;
                    ctx.env.remove(key);
                }
            }
            Step::Extract(pairs) => {
                for (key, expr) in pairs {
                    check_key(key)?;
                    let value = eval(expr, ctx)?;
                    if value.is_null() {
                        return Err(HookError::runtime(format!("{expr} resolved to nothing for {key}")));
                    }
                    ctx.env.set(key.clone(), display_value(&value));
                }
            }
            Step::Share(pairs) => {
                for (name, expr) in pairs {
                    let value = eval(expr, ctx)?;
                    ctx.shared.insert(name.clone(), value);
                }
            }
            Step::Test { name, that } => {
                record(ctx, outcome, name, that)?;
            }
            Step::Assert { name, that } => {
                let assertion = record(ctx, outcome, name, that)?;
                if !assertion.passed {
                    return Err(HookError::Assertion {
                        name: assertion.name,
                        message: assertion.message.unwrap_or_default(),
                    });
                }
            }
            Step::Fail(template) => {
                return Err(HookError::runtime(resolve(template, ctx.env, ctx.helpers)));
            }
        }
    }
    Ok(())
}

fn check_key(key: &str) -> Result<(), HookError> {
    if is_reserved(key) {
        return Err(HookError::runtime(format!("{key} is reserved")));
    }
    if !is_valid_key(key) {
        return Err(HookError::runtime(format!("invalid environment key {key:?}")));
    }
    Ok(())
}

fn eval(expr: &str, ctx: &HookContext<'_>) -> Result<JsonValue, HookError> {
    let scope = ExprScope {
        env: &*ctx.env,
        response: ctx.response,
        shared: &*ctx.shared,
    };
    eval_runtime_expr(expr, &scope).map_err(HookError::runtime)
}

fn record(
    ctx: &mut HookContext<'_>,
    outcome: &mut HookOutcome,
    name: &str,
    that: &str,
) -> Result<AssertionOutcome, HookError> {
    let scope = ExprScope {
        env: &*ctx.env,
        response: ctx.response,
        shared: &*ctx.shared,
    };
    let result = evaluate_condition(that, &scope).map_err(HookError::runtime)?;
    let assertion = AssertionOutcome {
        name: name.to_string(),
        passed: result.passed,
        message: (!result.passed).then(|| format!("{that} (actual: {})", display_value(&result.actual))),
    };

    ctx.ledger.record(ctx.source, ctx.stage, assertion.clone());
    outcome.assertions.push(assertion.clone());
    Ok(assertion)
}
