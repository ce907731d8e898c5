//! GitHub REST implementation of [`VcsHost`].
//!
//! Uses the Git Data API (`/git/blobs`, `/git/trees`, `/git/commits`,
//! `/git/refs`) for commits so several files land in one commit without a
//! working copy.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

use ledgersync_shared::{LedgerSyncError, RepoRef, Result};

use crate::{Issue, PullRequest, TreeEntry, VcsHost};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("ledgersync/", env!("CARGO_PKG_VERSION"));

const API_VERSION: &str = "2022-11-28";

const JSON_MEDIA: &str = "application/vnd.github+json";

/// Media type that makes the contents endpoint return the file body as-is.
const RAW_MEDIA: &str = "application/vnd.github.raw+json";

/// Default timeout in seconds for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Regular file mode for tree entries.
const FILE_MODE: &str = "100644";

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Deserialize)]
struct RefResponse {
    object: ShaResponse,
}

#[derive(Deserialize)]
struct CommitResponse {
    tree: ShaResponse,
}

#[derive(Deserialize)]
struct HtmlUrlResponse {
    html_url: String,
}

// ---------------------------------------------------------------------------
// GitHubClient
// ---------------------------------------------------------------------------

/// Authenticated GitHub REST client.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    token: String,
}

impl GitHubClient {
    /// Create a client for `api_base_url` (e.g. `https://api.github.com`).
    pub fn new(api_base_url: &str, token: impl Into<String>) -> Result<Self> {
        let base = Url::parse(api_base_url).map_err(|e| {
            LedgerSyncError::config(format!("invalid GitHub API URL '{api_base_url}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| LedgerSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: base.as_str().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn repo_url(&self, repo: &RepoRef, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, repo.owner, repo.repo, tail
        )
    }

    /// Send a request and map the status: 404 → `NotFound`, other non-2xx → `Network`.
    async fn send(
        &self,
        req: RequestBuilder,
        accept: &str,
        what: &str,
    ) -> Result<reqwest::Response> {
        let response = req
            .bearer_auth(&self.token)
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| LedgerSyncError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(LedgerSyncError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerSyncError::Network(format!(
                "{what}: HTTP {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
        self.send(req, JSON_MEDIA, what)
            .await?
            .json::<T>()
            .await
            .map_err(|e| LedgerSyncError::parse(format!("{what}: unexpected response: {e}")))
    }
}

impl VcsHost for GitHubClient {
    #[instrument(skip_all, fields(repo = %repo, path = %path, reference = %reference))]
    async fn get_file_contents(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<String> {
        let req = self
            .client
            .get(self.repo_url(repo, &format!("contents/{path}")))
            .query(&[("ref", reference)]);
        self.send(req, RAW_MEDIA, &format!("{repo}:{path}@{reference}"))
            .await?
            .text()
            .await
            .map_err(|e| LedgerSyncError::Network(format!("{repo}:{path}: failed to read body: {e}")))
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool> {
        match self.branch_head(repo, branch).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(repo = %repo, branch = %branch, from_ref = %from_ref))]
    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_ref: &str) -> Result<String> {
        let head = self.branch_head(repo, from_ref).await?;
        let req = self
            .client
            .post(self.repo_url(repo, "git/refs"))
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": head }));
        self.send(req, JSON_MEDIA, &format!("create branch {branch}"))
            .await?;
        debug!(branch, from_ref, %head, "branch created");
        Ok(head)
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        let req = self
            .client
            .get(self.repo_url(repo, &format!("git/ref/heads/{branch}")));
        let r: RefResponse = self
            .send_json(req, &format!("{repo} branch {branch}"))
            .await?;
        Ok(r.object.sha)
    }

    async fn commit_tree(&self, repo: &RepoRef, commit_sha: &str) -> Result<String> {
        let req = self
            .client
            .get(self.repo_url(repo, &format!("git/commits/{commit_sha}")));
        let c: CommitResponse = self
            .send_json(req, &format!("{repo} commit {commit_sha}"))
            .await?;
        Ok(c.tree.sha)
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String> {
        let req = self
            .client
            .post(self.repo_url(repo, "git/blobs"))
            .json(&json!({ "content": content, "encoding": "utf-8" }));
        let r: ShaResponse = self.send_json(req, "create blob").await?;
        Ok(r.sha)
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        let tree: Vec<_> = entries
            .iter()
            .map(|e| json!({ "path": e.path, "mode": FILE_MODE, "type": "blob", "sha": e.blob_sha }))
            .collect();
        let req = self
            .client
            .post(self.repo_url(repo, "git/trees"))
            .json(&json!({ "base_tree": base_tree, "tree": tree }));
        let r: ShaResponse = self.send_json(req, "create tree").await?;
        Ok(r.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String> {
        let req = self
            .client
            .post(self.repo_url(repo, "git/commits"))
            .json(&json!({ "message": message, "tree": tree_sha, "parents": [parent_sha] }));
        let r: ShaResponse = self.send_json(req, "create commit").await?;
        Ok(r.sha)
    }

    async fn update_ref(&self, repo: &RepoRef, branch: &str, commit_sha: &str) -> Result<()> {
        let req = self
            .client
            .patch(self.repo_url(repo, &format!("git/refs/heads/{branch}")))
            .json(&json!({ "sha": commit_sha, "force": false }));
        self.send(req, JSON_MEDIA, &format!("update ref {branch}"))
            .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(repo = %repo, head = %pr.head))]
    async fn open_pull_request(&self, repo: &RepoRef, pr: &PullRequest) -> Result<String> {
        let req = self.client.post(self.repo_url(repo, "pulls")).json(&json!({
            "title": pr.title,
            "body": pr.body,
            "head": pr.head,
            "base": pr.base,
        }));
        let r: HtmlUrlResponse = self.send_json(req, "open pull request").await?;
        Ok(r.html_url)
    }

    #[instrument(skip_all, fields(repo = %repo))]
    async fn open_issue(&self, repo: &RepoRef, issue: &Issue) -> Result<String> {
        let req = self.client.post(self.repo_url(repo, "issues")).json(&json!({
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
        }));
        let r: HtmlUrlResponse = self.send_json(req, "open issue").await?;
        Ok(r.html_url)
    }
}
