//! REST implementation of the [`PackageApi`] trait on top of reqwest.
//!
//! The client owns the resolved [`ApiContext`]: base URL, optional proxy,
//! user agent and the active credential. HTTP 401/403 map to
//! [`Error::Auth`]; every other failure, including non-success statuses,
//! maps to [`Error::Transport`] so the orchestrator can decide about
//! retries.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::api::{
    Distribution, PackageApi, PackageStatus, RepositoryEntry, ServiceIdentity, UploadReceipt,
    UploadRequest,
};
use crate::credentials::{ApiContext, Credential};
use crate::error::Error;

pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credential: Credential,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

impl RestClient {
    pub fn new(ctx: &ApiContext) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        if let Credential::ApiKey(key) = &ctx.credential {
            let value = HeaderValue::from_str(key)
                .map_err(|_| Error::Credential("api key contains invalid characters".into()))?;
            headers.insert("X-Api-Key", value);
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(ctx.settings.user_agent.clone())
            .default_headers(headers);
        if let Some(proxy) = &ctx.settings.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }
        let http = builder.build()?;

        info!(host = %ctx.settings.host, "Constructed API client");
        Ok(RestClient {
            http,
            base_url: ctx.settings.host.trim_end_matches('/').to_string(),
            credential: ctx.credential.clone(),
        })
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            // The api key already rides along as a default header.
            Credential::ApiKey(_) => rb,
            Credential::Login { user, password } => rb.basic_auth(user, Some(password)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn success_or_error(resp: Response) -> Result<Response, Error> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let detail = resp
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(Error::Auth {
                status: status.as_u16(),
                detail,
            })
        } else {
            Err(Error::Transport(format!(
                "unexpected status {status}{}",
                detail.map(|d| format!(": {d}")).unwrap_or_default()
            )))
        }
    }
}

#[async_trait]
impl PackageApi for RestClient {
    async fn check_identity(&self) -> Result<ServiceIdentity, Error> {
        let resp = self
            .authorize(self.http.get(self.url("user/self/")))
            .send()
            .await?;
        let resp = Self::success_or_error(resp).await?;
        Ok(resp.json::<ServiceIdentity>().await?)
    }

    async fn upload_package(&self, req: UploadRequest) -> Result<UploadReceipt, Error> {
        let content = tokio::fs::read(&req.path)
            .await
            .map_err(|e| Error::Transport(format!("failed to read {:?}: {e}", req.path)))?;

        let checksum = {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            format!("{:x}", hasher.finalize())
        };

        let file_name = req
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());

        debug!(file = %file_name, repository = %req.repository, distribution = %req.distribution, "Uploading package");

        let form = Form::new()
            .part("package_file", Part::bytes(content).file_name(file_name))
            .text("distribution", req.distribution.clone())
            .text("sha256_checksum", checksum);

        let url = self.url(&format!("packages/{}/upload/", req.repository));
        let resp = self
            .authorize(self.http.post(url).multipart(form))
            .send()
            .await?;
        let resp = Self::success_or_error(resp).await?;
        let receipt = resp.json::<UploadReceipt>().await?;
        info!(slug = %receipt.slug, state = %receipt.state, "Upload accepted");
        Ok(receipt)
    }

    async fn package_status(&self, repository: &str, slug: &str) -> Result<PackageStatus, Error> {
        let url = self.url(&format!("packages/{repository}/{slug}/status/"));
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = Self::success_or_error(resp).await?;
        Ok(resp.json::<PackageStatus>().await?)
    }

    async fn list_repos(&self, namespace: Option<String>) -> Result<Vec<RepositoryEntry>, Error> {
        let url = match namespace {
            Some(ns) => self.url(&format!("repos/{ns}/")),
            None => self.url("repos/"),
        };
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = Self::success_or_error(resp).await?;
        Ok(resp.json::<Vec<RepositoryEntry>>().await?)
    }

    async fn list_distros(&self, format: Option<String>) -> Result<Vec<Distribution>, Error> {
        let url = match format {
            Some(fmt) => self.url(&format!("distros/{fmt}/")),
            None => self.url("distros/"),
        };
        let resp = self.authorize(self.http.get(url)).send().await?;
        let resp = Self::success_or_error(resp).await?;
        Ok(resp.json::<Vec<Distribution>>().await?)
    }
}
