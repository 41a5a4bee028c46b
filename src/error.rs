use std::path::PathBuf;

use thiserror::Error;

/// A request file could not be turned into a descriptor.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("reading request file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML syntax error in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("request file {} is empty or not a mapping", .path.display())]
    NotAMapping { path: PathBuf },
    #[error("invalid `{field}` in {}: {reason}", .path.display())]
    InvalidField {
        path: PathBuf,
        field: String,
        reason: String,
    },
}

/// A descriptor could not be turned into a dispatchable request.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("request URL is empty after substitution")]
    EmptyUrl,
    #[error("invalid HTTP method {0}")]
    InvalidMethod(String),
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("serializing body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("http error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("reading environment file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing environment file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("dependency cycle: {}", format_chain(.chain))]
    Cycle { chain: Vec<PathBuf> },
    #[error("dependency {dependency} of {} not found", .request.display())]
    Missing { request: PathBuf, dependency: String },
}

/// Why a hook script did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("assertion `{name}` failed: {message}")]
    Assertion { name: String, message: String },
    #[error("hook error: {message}")]
    Runtime { message: String },
}

impl HookError {
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    pub fn is_assertion_failure(&self) -> bool {
        matches!(self, Self::Assertion { .. })
    }
}

/// Run-level failure surfaced to the process boundary.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{} request(s) failed: {}", .0.len(), format_paths(.0))]
    FailedRequests(Vec<PathBuf>),
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_error_lists_the_chain() {
        let err = DependencyError::Cycle {
            chain: vec![
                PathBuf::from("a.yaml"),
                PathBuf::from("b.yaml"),
                PathBuf::from("a.yaml"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle: a.yaml -> b.yaml -> a.yaml"
        );
    }

    #[test]
    fn run_error_enumerates_failed_paths() {
        let err = RunError::FailedRequests(vec![
            PathBuf::from("users/create.yaml"),
            PathBuf::from("login.yaml"),
        ]);
        let message = err.to_string();
        assert!(message.starts_with("2 request(s) failed"));
        assert!(message.contains("users/create.yaml"));
        assert!(message.contains("login.yaml"));
    }
}
