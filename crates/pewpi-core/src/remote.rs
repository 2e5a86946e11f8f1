//! Remote content API
//!
//! Read and commit single files in a GitHub repository through the
//! contents endpoint (`/repos/{owner}/{repo}/contents/{path}`). File
//! content travels base64 encoded in both directions.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Default API root
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 30;

const ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("No access token loaded; committing requires one")]
    MissingToken,

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a failure status
    #[error("{operation} failed with {status}: {message}")]
    Api {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Remote content is not valid base64: {0}")]
    Content(#[from] base64::DecodeError),
}

/// State of a remote file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub exists: bool,
    /// Blob SHA, required to overwrite an existing file
    pub sha: Option<String>,
    /// Base64 content as returned by the API (may contain line breaks)
    pub content: Option<String>,
}

impl FileInfo {
    pub fn missing() -> Self {
        Self::default()
    }

    /// Decode the base64 content
    pub fn decoded_content(&self) -> Result<Option<Vec<u8>>, RemoteError> {
        let Some(content) = &self.content else {
            return Ok(None);
        };
        let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(Some(STANDARD.decode(compact)?))
    }
}

/// A file write request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFile<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    pub path: &'a str,
    pub branch: &'a str,
    pub message: &'a str,
    /// Base64 encoded file content
    pub content: &'a str,
    /// SHA of the file being replaced, if it exists
    pub sha: Option<&'a str>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedContent {
    pub sha: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Outcome of a successful write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitResult {
    #[serde(default)]
    pub content: Option<CommittedContent>,
    #[serde(default)]
    pub commit: Option<CommitInfo>,
}

/// Read/write access to files in a remote repository
pub trait RemoteContent {
    /// Fetch a file at `reference` (branch, tag or SHA)
    ///
    /// A missing file is `FileInfo { exists: false, .. }`, not an error.
    fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<FileInfo, RemoteError>;

    /// Create or replace a file with a commit on `branch`
    fn put_file(&self, request: &PutFile<'_>) -> Result<CommitResult, RemoteError>;
}

/// Blocking GitHub contents API client
pub struct GitHubClient {
    http: Client,
    api_url: Url,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self, RemoteError> {
        let api_url =
            Url::parse(api_url).map_err(|e| RemoteError::InvalidUrl(format!("{api_url}: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(api_url.to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("pewpi/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// URL of a file in the contents endpoint
    pub fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Result<Url, RemoteError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "contents"])
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(reqwest::header::ACCEPT, ACCEPT);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl RemoteContent for GitHubClient {
    fn get_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<FileInfo, RemoteError> {
        let mut url = self.contents_url(owner, repo, path)?;
        url.query_pairs_mut().append_pair("ref", reference);
        debug!(%url, "Fetching remote file");

        let response = self.authorized(self.http.get(url)).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FileInfo::missing());
        }
        let body = checked_json(response, "GET")?;

        Ok(FileInfo {
            exists: true,
            sha: body.get("sha").and_then(Value::as_str).map(str::to_string),
            content: body
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn put_file(&self, request: &PutFile<'_>) -> Result<CommitResult, RemoteError> {
        if self.token.is_none() {
            return Err(RemoteError::MissingToken);
        }
        let url = self.contents_url(request.owner, request.repo, request.path)?;
        debug!(%url, branch = request.branch, "Committing remote file");

        let mut body = serde_json::json!({
            "message": request.message,
            "content": request.content,
            "branch": request.branch,
        });
        if let Some(sha) = request.sha {
            body["sha"] = Value::String(sha.to_string());
        }

        let response = self.authorized(self.http.put(url)).json(&body).send()?;
        let body = checked_json(response, "PUT")?;
        Ok(serde_json::from_value(body).unwrap_or_default())
    }
}

/// Parse the body, turning failure statuses into `RemoteError::Api`
fn checked_json(response: Response, operation: &'static str) -> Result<Value, RemoteError> {
    let status = response.status();
    let text = response.text()?;
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

    if !status.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(text);
        return Err(RemoteError::Api {
            operation,
            status: status.as_u16(),
            message,
        });
    }
    Ok(body)
}
