//! Upload orchestration.
//!
//! Tasks are validated as a batch up front: every task missing a target
//! distribution is rejected and reported, while the valid remainder still
//! proceeds. Valid tasks are submitted concurrently through a bounded
//! worker limit; transport failures are retried with backoff up to a
//! bounded attempt count, auth rejections are surfaced immediately. When
//! waiting is enabled each accepted upload is then polled to a terminal
//! state. Outcomes are produced in completion order, not submission order.

use std::path::PathBuf;

use futures::stream::{self, StreamExt};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{PackageApi, UploadReceipt, UploadRequest, UploadResult};
use crate::error::{Error, InvalidTask};
use crate::poll::{backoff_delay, PollOptions, StatusPoller};

/// One local package file destined for a repository and distribution.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub path: PathBuf,
    pub repository: String,
    pub distribution: String,
}

impl UploadTask {
    /// Pre-flight check, no network involved. Returns the reason this task
    /// cannot be submitted, if any.
    pub fn validation_problem(&self) -> Option<String> {
        if self.distribution.trim().is_empty() {
            return Some("missing target distribution".to_string());
        }
        let mut parts = self.repository.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let repo = parts.next().unwrap_or_default();
        if owner.is_empty() || repo.is_empty() {
            return Some(format!(
                "repository {:?} must be of the form OWNER/REPO",
                self.repository
            ));
        }
        if !self.path.exists() {
            return Some(format!("file {:?} does not exist", self.path));
        }
        None
    }
}

#[derive(Debug, Clone)]
pub struct PushOptions {
    /// Upper bound on concurrent uploads.
    pub workers: usize,
    /// Submission attempts per task, counting the first.
    pub max_attempts: u32,
    /// Whether to wait for processing to finish after upload.
    pub wait: bool,
    pub poll: PollOptions,
}

impl Default for PushOptions {
    fn default() -> Self {
        PushOptions {
            workers: 4,
            max_attempts: 3,
            wait: true,
            poll: PollOptions::default(),
        }
    }
}

/// Final word on one task, in completion order.
#[derive(Debug)]
pub struct TaskOutcome {
    pub task: UploadTask,
    pub result: Result<UploadResult, Error>,
}

/// Split tasks into submittable and rejected. Batch semantics: every
/// invalid task is reported, not just the first, and validity does not
/// depend on task ordering.
pub fn validate_tasks(tasks: Vec<UploadTask>) -> (Vec<UploadTask>, Vec<UploadTask>) {
    tasks
        .into_iter()
        .partition(|task| task.validation_problem().is_none())
}

/// Upload every valid task and (optionally) wait for processing. Invalid
/// tasks yield per-task validation outcomes without any network call.
pub async fn push_all(
    api: &dyn PackageApi,
    tasks: Vec<UploadTask>,
    options: &PushOptions,
    cancel: &CancellationToken,
) -> Vec<TaskOutcome> {
    let (valid, rejected) = validate_tasks(tasks);

    let mut outcomes: Vec<TaskOutcome> = rejected
        .into_iter()
        .map(|task| {
            let reason = task
                .validation_problem()
                .unwrap_or_else(|| "invalid task".to_string());
            let invalid = InvalidTask {
                path: task.path.clone(),
                reason,
            };
            TaskOutcome {
                task,
                result: Err(Error::Validation(vec![invalid])),
            }
        })
        .collect();

    if valid.is_empty() {
        return outcomes;
    }

    info!(count = valid.len(), workers = options.workers, "Submitting uploads");

    let poller = StatusPoller::new(api, options.poll.clone());
    let poller = &poller;
    let completed: Vec<TaskOutcome> = stream::iter(valid.into_iter().map(|task| async move {
        let result = run_task(api, poller, &task, options, cancel).await;
        TaskOutcome { task, result }
    }))
    .buffer_unordered(options.workers.max(1))
    .collect()
    .await;

    outcomes.extend(completed);
    outcomes
}

async fn run_task(
    api: &dyn PackageApi,
    poller: &StatusPoller<'_>,
    task: &UploadTask,
    options: &PushOptions,
    cancel: &CancellationToken,
) -> Result<UploadResult, Error> {
    let receipt = submit_with_retry(api, task, options, cancel).await?;
    let result = UploadResult::from(receipt);
    if !options.wait {
        return Ok(result);
    }
    poller
        .poll_until_terminal(&task.repository, result, cancel)
        .await
}

async fn submit_with_retry(
    api: &dyn PackageApi,
    task: &UploadTask,
    options: &PushOptions,
    cancel: &CancellationToken,
) -> Result<UploadReceipt, Error> {
    let req = UploadRequest {
        repository: task.repository.clone(),
        distribution: task.distribution.clone(),
        path: task.path.clone(),
    };

    let mut attempt: u32 = 0;
    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            submitted = api.upload_package(req.clone()) => submitted,
        };
        match outcome {
            Ok(receipt) => {
                info!(file = ?task.path, slug = %receipt.slug, "Upload submitted");
                return Ok(receipt);
            }
            Err(e) if e.is_retryable() && attempt + 1 < options.max_attempts => {
                let delay = backoff_delay(attempt);
                warn!(file = ?task.path, error = %e, attempt, delay = ?delay, "Upload failed, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    _ = sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
