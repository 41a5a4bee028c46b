use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use anyhow::Result;
use colrun::{
    config::RunSettings,
    env::{EnvStore, Environment, FileEnvStore, ENV_FILE_NAME},
    error::PersistenceError,
    executor::ReqwestTransport,
    hooks::HookStage,
    runner::{discover_requests, CollectionRunner, Outcome, RequestFailure, RunReport},
    template::PmHelpers,
};
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::{tempdir, TempDir};

/// Nothing listens here; connections are refused immediately.
const CLOSED_PORT_URL: &str = "http://127.0.0.1:1";

fn write_file(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

fn collection(base_url: &str) -> Result<(TempDir, PathBuf)> {
    let temp = tempdir()?;
    let root = temp.path().canonicalize()?;
    write_file(root.join(ENV_FILE_NAME), &format!("BASE_URL={base_url}\n"))?;
    Ok((temp, root))
}

async fn run(root: &Path, store: &dyn EnvStore) -> RunReport {
    let settings = RunSettings {
        timeout: Duration::from_secs(5),
        ..RunSettings::new(root)
    };
    let transport = ReqwestTransport::new(settings.timeout).unwrap();
    let targets = discover_requests(root).unwrap();
    CollectionRunner::new(store, &transport, &PmHelpers, &settings)
        .run(&targets)
        .await
}

fn outcomes(report: &RunReport) -> Vec<(String, Outcome)> {
    report
        .results
        .iter()
        .map(|result| {
            let name = result
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (name, result.outcome)
        })
        .collect()
}

/// Records every save instead of writing anywhere.
#[derive(Default)]
struct RecordingStore {
    initial: Environment,
    saves: Mutex<Vec<Environment>>,
}

impl EnvStore for RecordingStore {
    fn load(&self) -> Result<Environment, PersistenceError> {
        Ok(self.initial.clone())
    }

    fn save(&self, env: &Environment) -> Result<(), PersistenceError> {
        self.saves.lock().unwrap().push(env.clone());
        Ok(())
    }
}

#[tokio::test]
async fn status_classification_without_post_hooks() -> Result<()> {
    let server = MockServer::start_async().await;
    for (path, status) in [("/ok", 200), ("/missing", 404), ("/broken", 503)] {
        server
            .mock_async(|when, then| {
                when.method(GET).path(path);
                then.status(status);
            })
            .await;
    }

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("a_ok.yaml"), "request:\n  url: \"{{BASE_URL}}/ok\"\n")?;
    write_file(root.join("b_missing.yaml"), "request:\n  url: \"{{BASE_URL}}/missing\"\n")?;
    write_file(root.join("c_broken.yaml"), "request:\n  url: \"{{BASE_URL}}/broken\"\n")?;
    write_file(
        root.join("d_down.yaml"),
        &format!("request:\n  url: {CLOSED_PORT_URL}/down\n"),
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    assert_eq!(
        outcomes(&report),
        vec![
            ("a_ok.yaml".to_string(), Outcome::Success),
            ("b_missing.yaml".to_string(), Outcome::Warning),
            ("c_broken.yaml".to_string(), Outcome::Failure),
            ("d_down.yaml".to_string(), Outcome::Failure),
        ]
    );

    let down = &report.results[3];
    assert_eq!(down.status, 0);
    assert!(!down.dispatched);
    assert!(matches!(down.error, Some(RequestFailure::Dispatch(_))));

    assert_eq!(
        (report.summary.success, report.summary.warning, report.summary.failure),
        (1, 1, 2)
    );
    assert_eq!(
        report.summary.failed_requests,
        vec![PathBuf::from("c_broken.yaml"), PathBuf::from("d_down.yaml")]
    );
    assert!(report.check().is_err());
    Ok(())
}

#[tokio::test]
async fn post_hook_assertions_decide_the_outcome() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok");
            then.status(200).json_body(json!({ "id": 7 }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/maintenance");
            then.status(503);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("created.yaml"), "request:\n  url: \"{{BASE_URL}}/ok\"\n")?;
    write_file(
        root.join("created.post.hook"),
        "- test: { name: has id, that: \"$response.body#/id == 7\" }\n\
         - test: { name: created, that: \"$statusCode == 201\" }\n",
    )?;
    write_file(root.join("down.yaml"), "request:\n  url: \"{{BASE_URL}}/maintenance\"\n")?;
    write_file(
        root.join("down.post.hook"),
        "- test: { name: expected outage, that: \"$statusCode == 503\" }\n",
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    assert_eq!(
        outcomes(&report),
        vec![
            ("created.yaml".to_string(), Outcome::Failure),
            ("down.yaml".to_string(), Outcome::Success),
        ]
    );

    let created = &report.results[0];
    assert_eq!(created.status, 200);
    assert_eq!(created.assertions.len(), 2);
    assert!(created.assertions[0].passed);
    assert!(!created.assertions[1].passed);
    assert!(created.hook_errors[0].assertion);

    assert_eq!(report.summary.assertions_passed, 2);
    assert_eq!(report.summary.assertions_failed, 1);
    Ok(())
}

#[tokio::test]
async fn refused_dispatch_fails_even_when_post_hook_passes() -> Result<()> {
    let (_temp, root) = collection(CLOSED_PORT_URL)?;
    write_file(root.join("down.yaml"), "request:\n  url: \"{{BASE_URL}}/down\"\n")?;
    write_file(
        root.join("down.post.hook"),
        "- set: { SEEN: \"yes\" }\n- test: { name: no status, that: \"$statusCode == 0\" }\n",
    )?;

    let store = RecordingStore {
        initial: [("BASE_URL", CLOSED_PORT_URL.to_string())].into_iter().collect(),
        ..RecordingStore::default()
    };
    let report = run(&root, &store).await;

    let down = &report.results[0];
    assert_eq!(down.outcome, Outcome::Failure);
    assert_eq!(down.status, 0);
    assert!(matches!(down.error, Some(RequestFailure::Dispatch(_))));
    assert!(down.hook_errors.is_empty());
    assert!(down.assertions[0].passed);

    let saves = store.saves.lock().unwrap();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].get("SEEN"), Some("yes"));
    drop(saves);

    assert!(report.check().is_err());
    Ok(())
}

#[tokio::test]
async fn pre_hook_errors_fail_the_request_but_still_dispatch() -> Result<()> {
    let server = MockServer::start_async().await;
    let ping = server
        .mock_async(|when, then| {
            when.method(GET).path("/ping");
            then.status(200);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("ping.yaml"), "request:\n  url: \"{{BASE_URL}}/ping\"\n")?;
    write_file(root.join("ping.pre.hook"), "- fail: boom\n")?;
    write_file(root.join("ping.post.hook"), "- set: { POST_RAN: \"yes\" }\n")?;

    let store = RecordingStore {
        initial: [("BASE_URL", server.base_url())].into_iter().collect(),
        ..RecordingStore::default()
    };
    let report = run(&root, &store).await;

    ping.assert_async().await;
    let result = &report.results[0];
    assert!(result.dispatched);
    assert_eq!(result.status, 200);
    assert_eq!(result.outcome, Outcome::Failure);
    assert_eq!(result.hook_errors.len(), 1);
    assert_eq!(result.hook_errors[0].stage, HookStage::RequestPre);
    assert!(!result.hook_errors[0].assertion);

    let saves = store.saves.lock().unwrap();
    assert!(saves.iter().any(|env| env.get("POST_RAN") == Some("yes")));
    Ok(())
}

#[tokio::test]
async fn only_mutating_hooks_save_and_changes_reach_later_requests() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/login");
            then.status(200).json_body(json!({ "token": "abc" }));
        })
        .await;
    let me = server
        .mock_async(|when, then| {
            when.method(GET).path("/me").header("Authorization", "Bearer abc");
            then.status(200);
        })
        .await;

    let temp = tempdir()?;
    let root = temp.path().canonicalize()?;
    write_file(
        root.join("a_login.yaml"),
        "request:\n  method: POST\n  url: \"{{BASE_URL}}/login\"\n",
    )?;
    write_file(root.join("a_login.pre.hook"), "- print: \"logging in to {{BASE_URL}}\"\n")?;
    write_file(
        root.join("a_login.post.hook"),
        "- extract: { TOKEN: \"$response.body#/token\" }\n",
    )?;
    write_file(
        root.join("b_me.yaml"),
        "request:\n  url: \"{{BASE_URL}}/me\"\nauthentication:\n  bearer_token: \"{{TOKEN}}\"\n",
    )?;

    let store = RecordingStore {
        initial: [("BASE_URL", server.base_url())].into_iter().collect(),
        ..RecordingStore::default()
    };
    let report = run(&root, &store).await;

    me.assert_async().await;
    assert_eq!(report.summary.success, 2);

    let saves = store.saves.lock().unwrap();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].get("TOKEN"), Some("abc"));
    assert_eq!(saves[0].get("__REQUEST_PATH"), None);
    Ok(())
}

#[tokio::test]
async fn folder_overrides_layer_over_the_environment_without_persisting() -> Result<()> {
    let server = MockServer::start_async().await;
    let v2 = server
        .mock_async(|when, then| {
            when.method(GET).path("/v2/users").query_param("page", "1");
            then.status(200).json_body(json!({ "total": 3 }));
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("users/config.yaml"), "PREFIX: /v2\n")?;
    write_file(
        root.join("users/list.yaml"),
        "request:\n  url: \"{{BASE_URL}}{{PREFIX}}/users\"\nparams:\n  page: 1\n",
    )?;
    write_file(
        root.join("users/list.post.hook"),
        "- extract: { USER_TOTAL: \"$response.body#/total\" }\n",
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    v2.assert_async().await;
    assert_eq!(report.summary.success, 1);

    let persisted = fs::read_to_string(root.join(ENV_FILE_NAME))?;
    assert!(persisted.contains("USER_TOTAL=3"));
    assert!(persisted.contains("BASE_URL="));
    assert!(!persisted.contains("PREFIX"));
    assert!(!persisted.contains("__"));
    Ok(())
}

#[tokio::test]
async fn multipart_prefers_the_request_subfolder() -> Result<()> {
    let server = MockServer::start_async().await;
    let upload = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/upload")
                .body_contains("from-subfolder")
                .body_contains("Avatar");
            then.status(201);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("avatar.png"), "from-root")?;
    write_file(root.join("upload/avatar.png"), "from-subfolder")?;
    write_file(
        root.join("upload.yaml"),
        "request:\n  method: POST\n  url: \"{{BASE_URL}}/upload\"\n\
         headers:\n  Content-Type: multipart/form-data\n\
         body:\n  title: Avatar\n  avatar:\n    type: file\n    src: avatar.png\n",
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    upload.assert_async().await;
    assert_eq!(report.results[0].status, 201);
    Ok(())
}

#[tokio::test]
async fn dependency_cycles_fail_only_their_members() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ping");
            then.status(200);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(
        root.join("a.yaml"),
        "request:\n  url: \"{{BASE_URL}}/ping\"\npre-requests: [b.yaml]\n",
    )?;
    write_file(
        root.join("b.yaml"),
        "request:\n  url: \"{{BASE_URL}}/ping\"\npre-requests: [a.yaml]\n",
    )?;
    write_file(root.join("c.yaml"), "request:\n  url: \"{{BASE_URL}}/ping\"\n")?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    assert_eq!(
        outcomes(&report),
        vec![
            ("a.yaml".to_string(), Outcome::Failure),
            ("b.yaml".to_string(), Outcome::Failure),
            ("c.yaml".to_string(), Outcome::Success),
        ]
    );
    let Some(RequestFailure::Dependency(message)) = &report.results[0].error else {
        panic!("expected a dependency failure");
    };
    assert!(message.contains("cycle"));
    Ok(())
}

#[tokio::test]
async fn collection_hooks_wrap_the_run() -> Result<()> {
    let server = MockServer::start_async().await;
    let tagged = server
        .mock_async(|when, then| {
            when.method(GET).path("/ping").header("X-Run", "nightly");
            then.status(200);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("collection.pre.hook"), "- set: { RUN_TAG: nightly }\n")?;
    write_file(
        root.join("collection.post.hook"),
        "- test: { name: last call ok, that: \"$statusCode == 200\" }\n- unset: [RUN_TAG]\n",
    )?;
    write_file(
        root.join("ping.yaml"),
        "request:\n  url: \"{{BASE_URL}}/ping\"\nheaders:\n  X-Run: \"{{RUN_TAG}}\"\n",
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    tagged.assert_async().await;
    assert!(report.collection_hook_errors.is_empty());
    assert_eq!(report.summary.assertions_passed, 1);

    let persisted = fs::read_to_string(root.join(ENV_FILE_NAME))?;
    assert!(!persisted.contains("RUN_TAG"));
    Ok(())
}

#[tokio::test]
async fn unparsable_requests_fail_and_the_run_continues() -> Result<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/ok");
            then.status(200);
        })
        .await;

    let (_temp, root) = collection(&server.base_url())?;
    write_file(root.join("a_broken.yaml"), "request: [not, a, mapping\n")?;
    write_file(root.join("b_bad_method.yaml"), "request:\n  method: \"GE T\"\n  url: http://x\n")?;
    write_file(root.join("c_ok.yaml"), "request:\n  url: \"{{BASE_URL}}/ok\"\n")?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    assert!(matches!(report.results[0].error, Some(RequestFailure::Parse(_))));
    assert!(matches!(report.results[1].error, Some(RequestFailure::Build(_))));
    assert_eq!(report.results[2].outcome, Outcome::Success);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn attachment_handles_are_closed_after_failed_dispatch() -> Result<()> {
    let (_temp, root) = collection(CLOSED_PORT_URL)?;
    let attachment = root.join("fd-check-attachment.bin");
    write_file(&attachment, "payload")?;
    write_file(
        root.join("upload.yaml"),
        "request:\n  method: POST\n  url: \"{{BASE_URL}}/upload\"\n\
         headers:\n  Content-Type: multipart/form-data\n\
         body:\n  file:\n    type: file\n    src: fd-check-attachment.bin\n",
    )?;

    let report = run(&root, &FileEnvStore::for_collection(&root)).await;
    assert!(matches!(report.results[0].error, Some(RequestFailure::Dispatch(_))));

    let open = fs::read_dir("/proc/self/fd")?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| fs::read_link(entry.path()).ok())
        .any(|target| target == attachment);
    assert!(!open, "attachment is still open");
    Ok(())
}
