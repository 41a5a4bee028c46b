use super::models::{Outcome, RequestFailure};

/// Facts about one processed request that decide its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verdict<'a> {
    pub failure: Option<&'a RequestFailure>,
    pub pre_hook_failed: bool,
    /// `Some(passed)` when a post-request hook exists.
    pub post_hook: Option<bool>,
    pub status: u16,
}

pub fn classify(verdict: Verdict<'_>) -> Outcome {
    if matches!(
        verdict.failure,
        Some(
            RequestFailure::Parse(_)
                | RequestFailure::Build(_)
                | RequestFailure::Dependency(_)
                | RequestFailure::Dispatch(_)
        )
    ) {
        return Outcome::Failure;
    }
    if verdict.pre_hook_failed {
        return Outcome::Failure;
    }

    match verdict.post_hook {
        Some(true) => Outcome::Success,
        Some(false) => Outcome::Failure,
        None => classify_status(verdict.status),
    }
}

/// 0 means nothing came back.
pub fn classify_status(status: u16) -> Outcome {
    match status {
        0 => Outcome::Failure,
        500.. => Outcome::Failure,
        400..=499 => Outcome::Warning,
        _ => Outcome::Success,
    }
}
