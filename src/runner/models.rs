use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{
    error::{HookError, RunError},
    hooks::{AssertionOutcome, HookStage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Warning,
    Failure,
}

/// Why a request never got a usable response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum RequestFailure {
    Parse(String),
    Build(String),
    Dispatch(String),
    Dependency(String),
}

impl RequestFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::Parse(m) | Self::Build(m) | Self::Dispatch(m) | Self::Dependency(m) => m,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFailure {
    pub stage: HookStage,
    pub message: String,
    pub assertion: bool,
}

impl HookFailure {
    pub fn new(stage: HookStage, error: &HookError) -> Self {
        Self {
            stage,
            message: error.to_string(),
            assertion: error.is_assertion_failure(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub dispatched: bool,
    /// 0 when no response was received.
    pub status: u16,
    pub duration_ms: f64,
    pub assertions: Vec<AssertionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RequestFailure>,
    pub hook_errors: Vec<HookFailure>,
    pub outcome: Outcome,
}

impl ExecutionResult {
    /// A request that has not been processed yet.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            method: None,
            url: None,
            dispatched: false,
            status: 0,
            duration_ms: 0.0,
            assertions: Vec::new(),
            error: None,
            hook_errors: Vec::new(),
            outcome: Outcome::Success,
        }
    }

    pub fn failed(path: PathBuf, failure: RequestFailure) -> Self {
        Self {
            error: Some(failure),
            outcome: Outcome::Failure,
            ..Self::new(path)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub success: usize,
    pub warning: usize,
    pub failure: usize,
    pub assertions_passed: usize,
    pub assertions_failed: usize,
    pub failed_requests: Vec<PathBuf>,
}

impl RunSummary {
    pub fn record(&mut self, result: &ExecutionResult, root: &Path) {
        self.total += 1;
        match result.outcome {
            Outcome::Success => self.success += 1,
            Outcome::Warning => self.warning += 1,
            Outcome::Failure => {
                self.failure += 1;
                self.failed_requests.push(relative_to(&result.path, root));
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub root: PathBuf,
    pub summary: RunSummary,
    pub results: Vec<ExecutionResult>,
    pub collection_hook_errors: Vec<HookFailure>,
}

impl RunReport {
    /// Collapses the report into the run-level verdict.
    pub fn check(&self) -> Result<(), RunError> {
        if self.summary.failure == 0 {
            Ok(())
        } else {
            Err(RunError::FailedRequests(self.summary.failed_requests.clone()))
        }
    }
}

pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(path: &str, outcome: Outcome) -> ExecutionResult {
        ExecutionResult {
            outcome,
            ..ExecutionResult::failed(PathBuf::from(path), RequestFailure::Parse(String::new()))
        }
    }

    #[test]
    fn summary_counts_outcomes_and_lists_failures() {
        let root = Path::new("/c");
        let mut summary = RunSummary::default();
        summary.record(&result("/c/a.yaml", Outcome::Success), root);
        summary.record(&result("/c/b.yaml", Outcome::Warning), root);
        summary.record(&result("/c/users/c.yaml", Outcome::Failure), root);

        assert_eq!(summary.total, 3);
        assert_eq!((summary.success, summary.warning, summary.failure), (1, 1, 1));
        assert_eq!(summary.failed_requests, vec![PathBuf::from("users/c.yaml")]);
    }

    #[test]
    fn check_fails_only_with_failures() {
        let mut report = RunReport {
            root: PathBuf::from("/c"),
            summary: RunSummary::default(),
            results: Vec::new(),
            collection_hook_errors: Vec::new(),
        };
        report.summary.warning = 2;
        assert!(report.check().is_ok());

        report.summary.failure = 1;
        report.summary.failed_requests = vec![PathBuf::from("a.yaml")];
        let err = report.check().unwrap_err();
        assert!(err.to_string().contains("a.yaml"));
    }

    #[test]
    fn request_failure_serializes_with_kind() {
        let json = serde_json::to_value(RequestFailure::Dispatch("timed out".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "dispatch", "message": "timed out"}));
    }
}
