//! Error taxonomy shared by the credential resolver, upload orchestrator
//! and status poller.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// A task rejected during pre-flight validation, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct InvalidTask {
    pub path: PathBuf,
    pub reason: String,
}

/// All failure classes the CLI distinguishes. Validation and credential
/// failures are raised before any network call; auth rejections are never
/// retried; transport failures are retried with backoff up to a bounded
/// attempt count. A timeout only means the CLI stopped waiting, the remote
/// job may still complete server-side.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed for {0:?}")]
    Validation(Vec<InvalidTask>),

    #[error("no usable credentials: {0}")]
    Credential(String),

    #[error("authentication rejected by service (status {status})")]
    Auth { status: u16, detail: Option<String> },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("timed out after {0:?} waiting for package synchronisation")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Short lowercase name of the failure class, used in per-task report lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Credential(_) => "credential",
            Error::Auth { .. } => "auth",
            Error::Transport(_) => "transport",
            Error::Timeout(_) => "timeout",
            Error::Cancelled => "cancelled",
        }
    }

    /// Process exit code for this failure class. Success is 0 and
    /// unexpected failures are 1; the classes below get stable codes so
    /// scripts can tell them apart. For multi-task runs the highest code
    /// encountered wins.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_) => 2,
            Error::Credential(_) => 3,
            Error::Auth { .. } => 4,
            Error::Transport(_) => 5,
            Error::Timeout(_) => 6,
            Error::Cancelled => 7,
        }
    }

    /// A human hint for common failure situations, shown after the error
    /// line. A 401 with an api key set is a permissions problem, without
    /// one it is a missing-credentials problem.
    pub fn hint(&self, had_api_key: bool) -> Option<&'static str> {
        match self {
            Error::Auth { status: 401, .. } if had_api_key => Some(
                "Since you have an API key set, this probably means you don't \
                 have permission to perform this action.",
            ),
            Error::Auth { status: 401, .. } => Some(
                "You don't have an API key set. Set CLOUDSMITH_API_KEY or add \
                 one to your profile, then try again.",
            ),
            Error::Transport(msg) if msg.contains("404") => {
                Some("This usually means the owner/repo is wrong or not visible.")
            }
            Error::Transport(msg) if msg.contains("500") => Some(
                "This usually means the service is encountering issues. \
                 Please try again later.",
            ),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
