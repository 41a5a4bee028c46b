//! Runs a collection: plans the request order, drives each request through
//! its hooks and the transport, and folds the results into a [`RunReport`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    builder::{build, BuildContext},
    config::{load_folder_overrides, FolderOverrides, RunSettings},
    env::{EnvStore, Environment, COLLECTION_ROOT_KEY, REQUEST_PATH_KEY},
    executor::{HttpResponse, HttpTransport},
    hooks::{run_hook, AssertionLedger, HookContext, HookOutcome, HookStage, SharedScope},
    parser::RequestDescriptor,
    template::Helpers,
};

mod classify;
mod discovery;
mod models;
mod plan;
#[cfg(feature = "cli")]
pub mod report;

pub use classify::{classify, classify_status, Verdict};
pub use discovery::{discover_requests, find_collection_root, is_request_file};
pub use models::{
    relative_to, ExecutionResult, HookFailure, Outcome, RequestFailure, RunReport, RunSummary,
};
pub use plan::{plan_requests, PlanEntry};

/// Sequential collection runner. Borrowing its collaborators keeps tests
/// free to swap in recording stores and fake transports.
pub struct CollectionRunner<'a> {
    store: &'a dyn EnvStore,
    transport: &'a dyn HttpTransport,
    helpers: &'a dyn Helpers,
    settings: &'a RunSettings,
}

/// Everything that lives for the duration of one run.
struct RunState {
    env: Environment,
    persist: bool,
    shared: SharedScope,
    ledger: AssertionLedger,
    last_response: Option<HttpResponse>,
    overrides: HashMap<PathBuf, FolderOverrides>,
    collection_pre_ran: bool,
    collection_hook_errors: Vec<HookFailure>,
}

impl<'a> CollectionRunner<'a> {
    pub fn new(
        store: &'a dyn EnvStore,
        transport: &'a dyn HttpTransport,
        helpers: &'a dyn Helpers,
        settings: &'a RunSettings,
    ) -> Self {
        Self {
            store,
            transport,
            helpers,
            settings,
        }
    }

    /// Runs `targets` (request files, already discovered) and reports on
    /// every planned entry in execution order.
    pub async fn run(&self, targets: &[PathBuf]) -> RunReport {
        let root = self.settings.root.as_path();
        let mut state = self.start(root);

        let plan = plan_requests(targets, root).await;
        info!(root = %root.display(), requests = plan.len(), "starting run");

        let mut summary = RunSummary::default();
        let mut results = Vec::with_capacity(plan.len());

        for entry in plan {
            let result = match entry {
                PlanEntry::Unparsable { path, error } => {
                    error!(request = %relative_to(&path, root).display(), error = %error, "request skipped");
                    ExecutionResult::failed(path, RequestFailure::Parse(error.to_string()))
                }
                PlanEntry::Blocked { path, error } => {
                    error!(request = %relative_to(&path, root).display(), error = %error, "request skipped");
                    ExecutionResult::failed(path, RequestFailure::Dependency(error.to_string()))
                }
                PlanEntry::Ready(descriptor) => {
                    if !state.collection_pre_ran {
                        state.collection_pre_ran = true;
                        self.run_collection_hook(&mut state, HookStage::CollectionPre);
                    }
                    let span = info_span!(
                        "request",
                        path = %relative_to(&descriptor.path, root).display()
                    );
                    self.process(&mut state, &descriptor).instrument(span).await
                }
            };
            summary.record(&result, root);
            results.push(result);
        }

        if state.collection_pre_ran {
            self.run_collection_hook(&mut state, HookStage::CollectionPost);
        }

        summary.assertions_passed = state.ledger.passed();
        summary.assertions_failed = state.ledger.failed();
        info!(
            total = summary.total,
            success = summary.success,
            warning = summary.warning,
            failure = summary.failure,
            "run finished"
        );

        RunReport {
            root: root.to_path_buf(),
            summary,
            results,
            collection_hook_errors: state.collection_hook_errors,
        }
    }

    fn start(&self, root: &Path) -> RunState {
        let (mut env, persist) = match self.store.load() {
            Ok(env) => (env, true),
            Err(err) => {
                error!(error = %err, "environment unavailable, continuing in memory only");
                (Environment::new(), false)
            }
        };
        env.set(COLLECTION_ROOT_KEY, root.display().to_string());

        RunState {
            env,
            persist,
            shared: SharedScope::new(),
            ledger: AssertionLedger::new(),
            last_response: None,
            overrides: HashMap::new(),
            collection_pre_ran: false,
            collection_hook_errors: Vec::new(),
        }
    }

    async fn process(&self, state: &mut RunState, descriptor: &RequestDescriptor) -> ExecutionResult {
        let root = self.settings.root.as_path();
        let path = descriptor.path.clone();
        let source = relative_to(&path, root).display().to_string();
        let mut result = ExecutionResult::new(path.clone());

        // Request-pre
        let mut working = self.working_env(state, &path);
        let pre_script = HookStage::RequestPre.script_path(root, Some(&path));
        let pre = run_hook(
            &pre_script,
            HookContext {
                env: &mut working,
                response: None,
                shared: &mut state.shared,
                ledger: &mut state.ledger,
                helpers: self.helpers,
                stage: HookStage::RequestPre,
                source: &source,
            },
        );
        self.absorb(state, &pre);
        result.assertions.extend(pre.assertions.iter().cloned());
        let pre_hook_failed = pre.error.is_some();
        if let Some(err) = &pre.error {
            result.hook_errors.push(HookFailure::new(HookStage::RequestPre, err));
        }

        // Build
        let request = match build(
            descriptor,
            &BuildContext {
                env: &working,
                helpers: self.helpers,
                request_path: &path,
                collection_root: root,
                default_headers: &self.settings.default_headers,
            },
        ) {
            Ok(request) => request,
            Err(err) => {
                error!(error = %err, "request could not be built");
                let failure = RequestFailure::Build(err.to_string());
                result.outcome = classify(Verdict {
                    failure: Some(&failure),
                    pre_hook_failed,
                    ..Verdict::default()
                });
                result.error = Some(failure);
                return result;
            }
        };
        result.method = Some(request.method.to_string());
        result.url = Some(request.url.clone());

        // Dispatch; attachments are consumed by the transport either way.
        let response = match self.transport.send(request).await {
            Ok(response) => {
                info!(
                    method = result.method.as_deref().unwrap_or_default(),
                    url = result.url.as_deref().unwrap_or_default(),
                    status = response.status,
                    duration_ms = response.duration_ms,
                    "response received"
                );
                result.dispatched = true;
                result.status = response.status;
                result.duration_ms = response.duration_ms;
                Some(response)
            }
            Err(err) => {
                error!(url = result.url.as_deref().unwrap_or_default(), error = %err, "dispatch failed");
                result.error = Some(RequestFailure::Dispatch(err.to_string()));
                None
            }
        };

        // Request-post, on a fresh view so pre-hook edits are visible.
        let post_script = HookStage::RequestPost.script_path(root, Some(&path));
        let post_hook = if post_script.is_file() {
            let mut working = self.working_env(state, &path);
            let post = run_hook(
                &post_script,
                HookContext {
                    env: &mut working,
                    response: response.as_ref(),
                    shared: &mut state.shared,
                    ledger: &mut state.ledger,
                    helpers: self.helpers,
                    stage: HookStage::RequestPost,
                    source: &source,
                },
            );
            self.absorb(state, &post);
            result.assertions.extend(post.assertions.iter().cloned());
            if let Some(err) = &post.error {
                result.hook_errors.push(HookFailure::new(HookStage::RequestPost, err));
            }
            Some(post.error.is_none())
        } else {
            None
        };

        result.outcome = classify(Verdict {
            failure: result.error.as_ref(),
            pre_hook_failed,
            post_hook,
            status: result.status,
        });
        debug!(outcome = ?result.outcome, "request classified");

        if response.is_some() {
            state.last_response = response;
        }
        result
    }

    fn run_collection_hook(&self, state: &mut RunState, stage: HookStage) {
        let root = self.settings.root.as_path();
        let script = stage.script_path(root, None);
        if !script.is_file() {
            return;
        }

        let mut working = self.defaults().layered(&state.env);
        let response = match stage {
            HookStage::CollectionPost => state.last_response.as_ref(),
            _ => None,
        };
        let outcome = run_hook(
            &script,
            HookContext {
                env: &mut working,
                response,
                shared: &mut state.shared,
                ledger: &mut state.ledger,
                helpers: self.helpers,
                stage,
                source: "collection",
            },
        );
        self.absorb(state, &outcome);
        if let Some(err) = &outcome.error {
            state.collection_hook_errors.push(HookFailure::new(stage, err));
        }
    }

    /// Non-persisted defaults from `colrun.json`.
    fn defaults(&self) -> Environment {
        self.settings
            .variables
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Defaults, then the global environment, then collection and folder
    /// overrides, then the request's own path.
    fn working_env(&self, state: &mut RunState, request_path: &Path) -> Environment {
        let root = self.settings.root.as_path();
        let mut working = self.defaults().layered(&state.env);

        let collection = overrides_for(&mut state.overrides, root);
        working = working.layered(&collection.vars);
        if let Some(dir) = request_path.parent().filter(|dir| *dir != root) {
            let folder = overrides_for(&mut state.overrides, dir);
            working = working.layered(&folder.vars);
        }

        working.set(REQUEST_PATH_KEY, request_path.display().to_string());
        working
    }

    /// Copies what a hook changed into the global environment and saves it.
    fn absorb(&self, state: &mut RunState, outcome: &HookOutcome) {
        if !outcome.env_changed {
            return;
        }
        state.env.apply(&outcome.changes);
        if !state.persist {
            debug!("environment changed, not persisted");
            return;
        }
        if let Err(err) = self.store.save(&state.env) {
            error!(error = %err, "environment could not be saved");
        }
    }
}

fn overrides_for<'m>(cache: &'m mut HashMap<PathBuf, FolderOverrides>, dir: &Path) -> &'m FolderOverrides {
    cache.entry(dir.to_path_buf()).or_insert_with(|| {
        load_folder_overrides(dir).unwrap_or_else(|err| {
            warn!(dir = %dir.display(), error = %format!("{err:#}"), "ignoring folder config");
            FolderOverrides::default()
        })
    })
}
