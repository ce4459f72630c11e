//! Status polling with exponential backoff.
//!
//! After an upload is accepted the service processes it asynchronously.
//! [`StatusPoller`] watches a pending result until it reaches a terminal
//! state or the sync timeout elapses. Polling is idempotent: a result that
//! is already terminal (or cached as terminal from an earlier poll) is
//! returned as-is with no network call. Concurrent polls are bounded by a
//! permit pool so a large batch does not hammer the status endpoint.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{PackageApi, PackageState, UploadResult};
use crate::error::Error;

pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Pure backoff schedule: 1s, 2s, 4s, 8s, 16s, then capped. Attempt counts
/// from zero.
pub fn backoff_delay(attempt: u32) -> Duration {
    let secs = 1u64 << attempt.min(5);
    Duration::from_secs(secs).min(BACKOFF_CAP)
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Total budget for one result to reach a terminal state.
    pub timeout: Duration,
    /// Maximum number of in-flight status requests across all results.
    pub max_concurrent: usize,
}

impl Default for PollOptions {
    fn default() -> Self {
        PollOptions {
            timeout: Duration::from_secs(300),
            max_concurrent: 4,
        }
    }
}

pub struct StatusPoller<'a> {
    api: &'a dyn PackageApi,
    options: PollOptions,
    permits: Semaphore,
    // Keyed by (repository, slug): slugs are only unique within one repo.
    terminal: Mutex<HashMap<(String, String), UploadResult>>,
}

impl<'a> StatusPoller<'a> {
    pub fn new(api: &'a dyn PackageApi, options: PollOptions) -> Self {
        let permits = Semaphore::new(options.max_concurrent.max(1));
        StatusPoller {
            api,
            options,
            permits,
            terminal: Mutex::new(HashMap::new()),
        }
    }

    /// Poll until the result is terminal, the timeout elapses, or the run
    /// is cancelled. A timeout does not mean the remote job failed, only
    /// that the CLI stopped waiting for it.
    pub async fn poll_until_terminal(
        &self,
        repository: &str,
        result: UploadResult,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, Error> {
        if result.state.is_terminal() {
            return Ok(result);
        }
        let key = (repository.to_string(), result.slug.clone());
        if let Some(cached) = self.terminal.lock().await.get(&key) {
            return Ok(cached.clone());
        }

        let deadline = Instant::now() + self.options.timeout;
        let mut current = result;
        let mut attempt: u32 = 0;

        loop {
            let fetched = {
                let permit = match self.permits.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return Err(Error::Cancelled),
                };
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                    status = self.api.package_status(repository, &current.slug) => status,
                };
                drop(permit);
                outcome
            };

            match fetched {
                Ok(status) if status.state.is_terminal() => {
                    let done = UploadResult {
                        slug: current.slug.clone(),
                        state: status.state,
                    };
                    self.terminal
                        .lock()
                        .await
                        .insert(key.clone(), done.clone());
                    debug!(slug = %done.slug, state = %done.state, "Package reached terminal state");
                    return Ok(done);
                }
                Ok(status) => {
                    // States only move forward; ignore a stale regression.
                    if current.state != PackageState::Processing {
                        current.state = status.state;
                    }
                    debug!(slug = %current.slug, state = %current.state, attempt, "Package still in flight");
                }
                Err(e) if e.is_retryable() => {
                    warn!(slug = %current.slug, error = %e, attempt, "Status poll failed, will retry");
                }
                Err(e) => return Err(e),
            }

            let delay = backoff_delay(attempt);
            if Instant::now() + delay >= deadline {
                return Err(Error::Timeout(self.options.timeout));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
