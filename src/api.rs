//! Service API seam.
//!
//! A single trait ([`PackageApi`]) abstracts the package-hosting service so
//! the orchestrator and poller work against a real REST client or a mock.
//! The trait is annotated for `mockall` so tests can generate deterministic
//! mocks; all methods are async and return the shared error taxonomy.

use std::path::PathBuf;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Processing state of a package on the service. Transitions only move
/// forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PackageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PackageState::Completed | PackageState::Failed)
    }
}

impl std::fmt::Display for PackageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PackageState::Pending => "pending",
            PackageState::Processing => "processing",
            PackageState::Completed => "completed",
            PackageState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A package file submission: which file, into which owner/repo, for which
/// distribution.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub repository: String,
    pub distribution: String,
    pub path: PathBuf,
}

/// Returned by the service when an upload is accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Remote identifier of the created package.
    pub slug: String,
    pub state: PackageState,
}

impl From<UploadReceipt> for UploadResult {
    fn from(receipt: UploadReceipt) -> Self {
        UploadResult {
            slug: receipt.slug,
            state: receipt.state,
        }
    }
}

/// Tracked state of one upload as the CLI sees it: the remote identifier
/// plus the last observed processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub slug: String,
    pub state: PackageState,
}

/// Point-in-time processing status of a package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageStatus {
    pub slug: String,
    pub state: PackageState,
    #[serde(default)]
    pub status_reason: Option<String>,
}

/// Who the service thinks we are; used by `check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub authenticated: bool,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    pub name: String,
    pub slug: String,
    pub namespace: String,
    #[serde(default)]
    pub repository_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionVersion {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub name: String,
    pub slug: String,
    pub format: String,
    #[serde(default)]
    pub versions: Vec<DistributionVersion>,
}

/// Async interface to the package-hosting service. Implemented by the
/// reqwest client and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PackageApi: Send + Sync {
    /// Verify credentials and connectivity; returns the authenticated
    /// identity.
    async fn check_identity(&self) -> Result<ServiceIdentity, Error>;

    /// Submit one package file. A successful return means the service has
    /// accepted the upload and queued processing.
    async fn upload_package(&self, req: UploadRequest) -> Result<UploadReceipt, Error>;

    /// Fetch the current processing status of a previously uploaded
    /// package.
    async fn package_status(&self, repository: &str, slug: &str) -> Result<PackageStatus, Error>;

    /// List repositories, optionally restricted to one namespace.
    async fn list_repos(&self, namespace: Option<String>) -> Result<Vec<RepositoryEntry>, Error>;

    /// List distributions, optionally restricted to one package format.
    async fn list_distros(&self, format: Option<String>) -> Result<Vec<Distribution>, Error>;
}
