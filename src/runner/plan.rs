use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    error::{DependencyError, ParseError},
    parser::{parse_request_file, RequestDescriptor},
};

/// One step of the execution order.
#[derive(Debug)]
pub enum PlanEntry {
    Ready(RequestDescriptor),
    Unparsable { path: PathBuf, error: ParseError },
    Blocked { path: PathBuf, error: DependencyError },
}

impl PlanEntry {
    pub fn path(&self) -> &Path {
        match self {
            Self::Ready(descriptor) => &descriptor.path,
            Self::Unparsable { path, .. } | Self::Blocked { path, .. } => path,
        }
    }
}

#[derive(Clone)]
enum Dependency {
    Found(PathBuf),
    Missing { raw: String, expected: PathBuf },
}

struct Frame {
    key: PathBuf,
    path: PathBuf,
    parsed: Result<RequestDescriptor, ParseError>,
    deps: Vec<Dependency>,
    next: usize,
}

impl Frame {
    async fn open(path: PathBuf, root: &Path) -> Self {
        let parsed = parse_request_file(&path).await;
        let deps = match &parsed {
            Ok(descriptor) => descriptor
                .dependencies
                .iter()
                .map(|raw| resolve_dependency(raw, &path, root))
                .collect(),
            Err(_) => Vec::new(),
        };
        Self {
            key: canonical(&path),
            path,
            parsed,
            deps,
            next: 0,
        }
    }

    fn into_entry(self) -> PlanEntry {
        match self.parsed {
            Ok(descriptor) => PlanEntry::Ready(descriptor),
            Err(error) => PlanEntry::Unparsable {
                path: self.path,
                error,
            },
        }
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// `raw` relative to the requesting file's directory, then to the
/// collection root.
fn resolve_dependency(raw: &str, request_path: &Path, root: &Path) -> Dependency {
    let given = Path::new(raw);
    let request_dir = request_path.parent().unwrap_or(root);
    let candidates = if given.is_absolute() {
        vec![given.to_path_buf()]
    } else {
        vec![request_dir.join(given), root.join(given)]
    };

    match candidates.iter().find(|candidate| candidate.is_file()) {
        Some(found) => Dependency::Found(found.clone()),
        None => Dependency::Missing {
            raw: raw.to_string(),
            expected: candidates
                .into_iter()
                .next()
                .unwrap_or_else(|| given.to_path_buf()),
        },
    }
}

/// Orders `targets` so every dependency runs before its dependents, each
/// file at most once. A target caught in a cycle is planned as blocked;
/// the rest of the plan is unaffected.
pub async fn plan_requests(targets: &[PathBuf], root: &Path) -> Vec<PlanEntry> {
    let mut plan = Vec::new();
    let mut scheduled: HashSet<PathBuf> = HashSet::new();

    for target in targets {
        let target_key = canonical(target);
        if scheduled.contains(&target_key) {
            continue;
        }

        let mut attempt: Vec<(PathBuf, PlanEntry)> = Vec::new();
        let mut stack = vec![Frame::open(target.clone(), root).await];
        let mut cycle: Option<Vec<PathBuf>> = None;

        while let Some(top) = stack.last_mut() {
            if top.next >= top.deps.len() {
                if let Some(frame) = stack.pop() {
                    scheduled.insert(frame.key.clone());
                    attempt.push((frame.key.clone(), frame.into_entry()));
                }
                continue;
            }

            let dependency = top.deps[top.next].clone();
            top.next += 1;
            let requester = top.path.clone();

            match dependency {
                Dependency::Missing { raw, expected } => {
                    let key = canonical(&expected);
                    if scheduled.insert(key.clone()) {
                        warn!(request = %requester.display(), dependency = %raw, "dependency not found");
                        attempt.push((
                            key,
                            PlanEntry::Blocked {
                                path: expected,
                                error: DependencyError::Missing {
                                    request: requester,
                                    dependency: raw,
                                },
                            },
                        ));
                    }
                }
                Dependency::Found(dep_path) => {
                    let dep_key = canonical(&dep_path);
                    if scheduled.contains(&dep_key) {
                        continue;
                    }
                    if let Some(start) = stack.iter().position(|frame| frame.key == dep_key) {
                        let mut chain: Vec<PathBuf> =
                            stack[start..].iter().map(|frame| frame.path.clone()).collect();
                        chain.push(dep_path);
                        cycle = Some(chain);
                        break;
                    }
                    debug!(request = %requester.display(), dependency = %dep_path.display(), "scheduling dependency");
                    stack.push(Frame::open(dep_path, root).await);
                }
            }
        }

        match cycle {
            Some(chain) => {
                for (key, _) in &attempt {
                    scheduled.remove(key);
                }
                warn!(target = %target.display(), "dependency cycle detected");
                plan.push(PlanEntry::Blocked {
                    path: target.clone(),
                    error: DependencyError::Cycle { chain },
                });
            }
            None => plan.extend(attempt.into_iter().map(|(_, entry)| entry)),
        }
    }

    plan
}
