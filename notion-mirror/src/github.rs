#![doc = "GitHub destination for the CLI: implements the core `DestinationStore` over the GitHub REST API."]
//
//! # GitHub store (CLI <-> Core)
//!
//! [`GitHubClient`] bridges the engine's [`DestinationStore`] trait to one
//! repository branch:
//!
//! - single files go through the contents API (`/contents/{path}`), bodies
//!   base64-encoded, the blob `sha` used as the revision marker;
//! - atomic publishes use the git data API (blobs, trees, commits, refs).
//!
//! Construct it with [`GitHubClient::connect`], which doubles as a startup
//! preflight: the repository must exist and the branch must resolve.
//!
//! Status mapping: 404 → `NotFound`, 409/422 → `Conflict`, 429 and
//! rate-limited 403 → `RateLimited`, 5xx and timeouts → `Transient`.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use notion_mirror_core::contract::{
    BranchHead, DeleteFile, DestinationStore, PutFile, RemoteFile, TreeEntry,
};
use notion_mirror_core::error::StoreError;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use tracing::{error, info};

pub const GITHUB_API_BASE: &str = "https://api.github.com";

pub struct GitHubClient {
    http: Client,
    api_base: String,
    owner: String,
    repo: String,
    branch: String,
    token: String,
}

/// Percent-encode each path segment, keeping the `/` separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Decode a contents-API body. GitHub wraps base64 at 60 columns.
pub fn decode_content(encoded: &str) -> Result<Vec<u8>, StoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| StoreError::Decode(format!("invalid base64 content: {e}")))
}

/// Body of a contents-API file response. `None` when GitHub left it out
/// (files over 1 MB come back with `encoding: "none"`) and the blob has to
/// be fetched by sha instead.
pub fn inline_content(file: &Value) -> Result<Option<Vec<u8>>, StoreError> {
    let encoding = file.get("encoding").and_then(Value::as_str);
    match (encoding, file.get("content").and_then(Value::as_str)) {
        (Some("none"), _) | (_, None) => Ok(None),
        (_, Some(encoded)) => decode_content(encoded).map(Some),
    }
}

pub fn classify(status: StatusCode, retry_after: Option<Duration>, rate_limited: bool, body: &str) -> StoreError {
    let message = api_message(body);
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(message),
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => StoreError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => StoreError::RateLimited { retry_after },
        StatusCode::FORBIDDEN if rate_limited => StoreError::RateLimited { retry_after },
        s if s.is_server_error() => StoreError::Transient(format!("{s}: {message}")),
        s => StoreError::Api {
            status: s.as_u16(),
            message,
        },
    }
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Decode(e.to_string())
    }
}

fn sha_at(value: &Value, pointer: &str) -> Result<String, StoreError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Decode(format!("response missing {pointer}")))
}

impl GitHubClient {
    /// Build a client for `owner/repo` and resolve the branch (the
    /// repository's default branch when `branch` is `None`).
    pub async fn connect(
        owner: &str,
        repo: &str,
        branch: Option<&str>,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Self::connect_to(GITHUB_API_BASE, owner, repo, branch, token, timeout).await
    }

    pub async fn connect_to(
        api_base: &str,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
        token: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("notion-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StoreError::Transient(format!("failed to build HTTP client: {e}")))?;
        let mut client = Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.unwrap_or_default().to_string(),
            token: token.to_string(),
        };

        let info = client.request(Method::GET, &client.repo_url(""), None).await?;
        if client.branch.is_empty() {
            client.branch = info
                .get("default_branch")
                .and_then(Value::as_str)
                .unwrap_or("main")
                .to_string();
        }
        info!(
            owner,
            repo,
            branch = %client.branch,
            private = info.get("private").and_then(serde_json::Value::as_bool).unwrap_or(false),
            "Connected to GitHub repository"
        );
        Ok(client)
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!("{}/repos/{}/{}{suffix}", self.api_base, self.owner, self.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        self.repo_url(&format!("/contents/{}", encode_path(path)))
    }

    async fn blob_content(&self, sha: &str) -> Result<Vec<u8>, StoreError> {
        let blob = self
            .request(Method::GET, &self.repo_url(&format!("/git/blobs/{sha}")), None)
            .await?;
        match blob.get("content").and_then(Value::as_str) {
            Some(encoded) => decode_content(encoded),
            None => Err(StoreError::Decode(format!("blob {sha} has no content"))),
        }
    }

    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value, StoreError> {
        let mut request = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let headers = response.headers();
        let retry_after = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let rate_limited = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false);
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            if status != StatusCode::NOT_FOUND {
                error!(status = %status, method = %method, url = %url, "GitHub API returned error. Response body: {text}");
            }
            return Err(classify(status, retry_after, rate_limited, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl DestinationStore for GitHubClient {
    async fn get_file(&self, path: &str) -> Result<Option<RemoteFile>, StoreError> {
        let url = format!(
            "{}?ref={}",
            self.contents_url(path),
            urlencoding::encode(&self.branch)
        );
        let file = match self.request(Method::GET, &url, None).await {
            Ok(file) => file,
            Err(StoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if file.is_array() {
            return Err(StoreError::Decode(format!("{path} is a directory")));
        }
        let revision = sha_at(&file, "/sha")?;
        let content = match inline_content(&file)? {
            Some(content) => content,
            None => {
                info!(path, sha = %revision, "Large file, reading its blob");
                self.blob_content(&revision).await?
            }
        };
        Ok(Some(RemoteFile { content, revision }))
    }

    async fn put_file(&self, request: PutFile) -> Result<(), StoreError> {
        let mut body = json!({
            "message": request.message,
            "content": STANDARD.encode(&request.content),
            "branch": self.branch,
        });
        if let Some(sha) = &request.prior_revision {
            body["sha"] = Value::String(sha.clone());
        }
        self.request(Method::PUT, &self.contents_url(&request.path), Some(body))
            .await?;
        Ok(())
    }

    async fn delete_file(&self, request: DeleteFile) -> Result<(), StoreError> {
        let body = json!({
            "message": request.message,
            "sha": request.revision,
            "branch": self.branch,
        });
        self.request(Method::DELETE, &self.contents_url(&request.path), Some(body))
            .await?;
        Ok(())
    }

    async fn read_head(&self) -> Result<BranchHead, StoreError> {
        let reference = self
            .request(
                Method::GET,
                &self.repo_url(&format!("/git/ref/heads/{}", encode_path(&self.branch))),
                None,
            )
            .await?;
        let commit_id = sha_at(&reference, "/object/sha")?;
        let commit = self
            .request(Method::GET, &self.repo_url(&format!("/git/commits/{commit_id}")), None)
            .await?;
        let tree_id = sha_at(&commit, "/tree/sha")?;
        Ok(BranchHead { commit_id, tree_id })
    }

    async fn create_blob(&self, content: Vec<u8>) -> Result<String, StoreError> {
        let body = json!({ "content": STANDARD.encode(&content), "encoding": "base64" });
        let blob = self
            .request(Method::POST, &self.repo_url("/git/blobs"), Some(body))
            .await?;
        sha_at(&blob, "/sha")
    }

    async fn create_tree(&self, base_tree: String, entries: Vec<TreeEntry>) -> Result<String, StoreError> {
        let tree: Vec<Value> = entries
            .into_iter()
            .map(|e| json!({ "path": e.path, "mode": e.mode, "type": "blob", "sha": e.blob_id }))
            .collect();
        let body = json!({ "base_tree": base_tree, "tree": tree });
        let created = self
            .request(Method::POST, &self.repo_url("/git/trees"), Some(body))
            .await?;
        sha_at(&created, "/sha")
    }

    async fn create_commit(
        &self,
        message: String,
        tree_id: String,
        parents: Vec<String>,
    ) -> Result<String, StoreError> {
        let body = json!({ "message": message, "tree": tree_id, "parents": parents });
        let commit = self
            .request(Method::POST, &self.repo_url("/git/commits"), Some(body))
            .await?;
        sha_at(&commit, "/sha")
    }

    async fn update_ref(&self, commit_id: String) -> Result<(), StoreError> {
        let body = json!({ "sha": commit_id, "force": false });
        self.request(
            Method::PATCH,
            &self.repo_url(&format!("/git/refs/heads/{}", encode_path(&self.branch))),
            Some(body),
        )
        .await?;
        Ok(())
    }
}
