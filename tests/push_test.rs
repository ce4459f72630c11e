use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cloudsmith_cli::api::{
    MockPackageApi, PackageState, PackageStatus, UploadReceipt,
};
use cloudsmith_cli::error::Error;
use cloudsmith_cli::poll::PollOptions;
use cloudsmith_cli::push::{push_all, validate_tasks, PushOptions, UploadTask};

fn task(path: &Path, distribution: &str) -> UploadTask {
    UploadTask {
        path: path.to_path_buf(),
        repository: "acme/widgets".into(),
        distribution: distribution.into(),
    }
}

fn package_file(dir: &TempDir, name: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"package bytes").expect("write package file");
    path
}

fn no_wait_options() -> PushOptions {
    PushOptions {
        wait: false,
        ..PushOptions::default()
    }
}

fn accept_upload(req: &cloudsmith_cli::api::UploadRequest) -> Result<UploadReceipt, Error> {
    let slug = req
        .path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pkg".into());
    Ok(UploadReceipt {
        slug,
        state: PackageState::Pending,
    })
}

#[test]
fn validation_rejects_exactly_the_tasks_missing_a_distribution() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");
    let b = package_file(&dir, "b.deb");
    let c = package_file(&dir, "c.deb");

    let tasks = vec![task(&a, "ubuntu/focal"), task(&b, ""), task(&c, "el/9")];
    let (valid, rejected) = validate_tasks(tasks);
    assert_eq!(valid.len(), 2);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].path, b);

    // Same set, reversed order: validity is order-independent.
    let tasks = vec![task(&c, "el/9"), task(&b, ""), task(&a, "ubuntu/focal")];
    let (valid, rejected) = validate_tasks(tasks);
    assert_eq!(valid.len(), 2);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].path, b);
}

#[test]
fn validation_rejects_malformed_repositories() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");
    let mut bad = task(&a, "ubuntu/focal");
    bad.repository = "no-slash".into();
    let (valid, rejected) = validate_tasks(vec![bad]);
    assert!(valid.is_empty());
    assert_eq!(rejected.len(), 1);
}

#[tokio::test]
async fn invalid_tasks_are_reported_while_valid_ones_proceed() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");
    let b = package_file(&dir, "b.deb");
    let c = package_file(&dir, "c.deb");

    let mut api = MockPackageApi::new();
    // Only the two valid tasks may reach the network.
    api.expect_upload_package()
        .times(2)
        .returning(|req| accept_upload(&req));

    let tasks = vec![task(&a, "ubuntu/focal"), task(&b, ""), task(&c, "el/9")];
    let outcomes = push_all(&api, tasks, &no_wait_options(), &CancellationToken::new()).await;

    assert_eq!(outcomes.len(), 3);
    let failures: Vec<_> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err())
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], Error::Validation(_)));
    let accepted = outcomes
        .iter()
        .filter(|o| matches!(&o.result, Ok(r) if r.state == PackageState::Pending))
        .count();
    assert_eq!(accepted, 2);
}

#[tokio::test]
async fn auth_rejections_are_not_retried() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");
    let b = package_file(&dir, "b.deb");

    let mut api = MockPackageApi::new();
    // times(2) proves one attempt per task despite max_attempts = 3.
    api.expect_upload_package().times(2).returning(|_| {
        Err(Error::Auth {
            status: 401,
            detail: Some("bad key".into()),
        })
    });

    let tasks = vec![task(&a, "ubuntu/focal"), task(&b, "ubuntu/focal")];
    let outcomes = push_all(&api, tasks, &no_wait_options(), &CancellationToken::new()).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(
            matches!(outcome.result.as_ref().err(), Some(Error::Auth { .. })),
            "got: {:?}",
            outcome.result
        );
    }
}

#[tokio::test]
async fn transport_failures_are_retried_with_backoff() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");

    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let mut api = MockPackageApi::new();
    api.expect_upload_package().times(2).returning(move |req| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(Error::Transport("connection reset".into()))
        } else {
            accept_upload(&req)
        }
    });

    let options = PushOptions {
        max_attempts: 2,
        ..no_wait_options()
    };
    let outcomes = push_all(
        &api,
        vec![task(&a, "ubuntu/focal")],
        &options,
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].result.is_ok(), "got: {:?}", outcomes[0].result);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn one_slow_package_times_out_without_affecting_the_rest() {
    let dir = TempDir::new().unwrap();
    let fast = package_file(&dir, "fast.deb");
    let slow = package_file(&dir, "slow.deb");

    let mut api = MockPackageApi::new();
    api.expect_upload_package()
        .times(2)
        .returning(|req| accept_upload(&req));
    api.expect_package_status().returning(|_, slug| {
        let state = if slug == "slow" {
            PackageState::Pending
        } else {
            PackageState::Completed
        };
        Ok(PackageStatus {
            slug: slug.to_string(),
            state,
            status_reason: None,
        })
    });

    let options = PushOptions {
        wait: true,
        poll: PollOptions {
            timeout: Duration::from_millis(200),
            max_concurrent: 4,
        },
        ..PushOptions::default()
    };
    let tasks = vec![task(&fast, "ubuntu/focal"), task(&slow, "ubuntu/focal")];
    let outcomes = push_all(&api, tasks, &options, &CancellationToken::new()).await;

    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        if outcome.task.path == slow {
            assert!(
                matches!(outcome.result.as_ref().err(), Some(Error::Timeout(_))),
                "slow task should time out, got: {:?}",
                outcome.result
            );
        } else {
            let result = outcome.result.as_ref().expect("fast task should complete");
            assert_eq!(result.state, PackageState::Completed);
        }
    }
}

#[tokio::test]
async fn outcomes_arrive_in_completion_order_not_submission_order() {
    let dir = TempDir::new().unwrap();
    let slow = package_file(&dir, "slow.deb");
    let fast = package_file(&dir, "fast.deb");

    let mut api = MockPackageApi::new();
    api.expect_upload_package()
        .times(2)
        .returning(|req| accept_upload(&req));
    // The fast package is terminal on its first status check; the slow one
    // needs a second round, so it finishes a full backoff step later.
    let slow_polls = Arc::new(AtomicU32::new(0));
    let seen = slow_polls.clone();
    api.expect_package_status().returning(move |_, slug| {
        let state = if slug == "slow" && seen.fetch_add(1, Ordering::SeqCst) == 0 {
            PackageState::Processing
        } else {
            PackageState::Completed
        };
        Ok(PackageStatus {
            slug: slug.to_string(),
            state,
            status_reason: None,
        })
    });

    let options = PushOptions {
        wait: true,
        ..PushOptions::default()
    };
    // Slow submitted first, fast second.
    let tasks = vec![task(&slow, "ubuntu/focal"), task(&fast, "ubuntu/focal")];
    let outcomes = push_all(&api, tasks, &options, &CancellationToken::new()).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].task.path, fast, "fast task finished first");
    assert_eq!(outcomes[1].task.path, slow);
    for outcome in &outcomes {
        let result = outcome.result.as_ref().expect("both tasks should complete");
        assert_eq!(result.state, PackageState::Completed);
    }
}

#[tokio::test]
async fn cancellation_marks_outstanding_tasks_cancelled() {
    let dir = TempDir::new().unwrap();
    let a = package_file(&dir, "a.deb");
    let b = package_file(&dir, "b.deb");

    let mut api = MockPackageApi::new();
    api.expect_upload_package()
        .times(2)
        .returning(|req| accept_upload(&req));
    // Never terminal: tasks sit in the polling phase until cancelled.
    api.expect_package_status().returning(|_, slug| {
        Ok(PackageStatus {
            slug: slug.to_string(),
            state: PackageState::Processing,
            status_reason: None,
        })
    });

    let options = PushOptions {
        wait: true,
        poll: PollOptions {
            timeout: Duration::from_secs(60),
            max_concurrent: 4,
        },
        ..PushOptions::default()
    };
    let tasks = vec![task(&a, "ubuntu/focal"), task(&b, "ubuntu/focal")];
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let worker = tokio::spawn(async move { push_all(&api, tasks, &options, &cancel).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    trigger.cancel();

    let outcomes = worker.await.expect("push task should not panic");
    assert_eq!(outcomes.len(), 2);
    for outcome in &outcomes {
        assert!(
            matches!(outcome.result.as_ref().err(), Some(Error::Cancelled)),
            "got: {:?}",
            outcome.result
        );
    }
}
