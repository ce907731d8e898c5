//! Version-control host access for ledgersync.
//!
//! [`VcsHost`] is the contract the pipeline consumes: file reads, branch
//! management, the four object-graph primitives (blob, tree, commit, ref) and
//! pull request / issue creation. [`GitHubClient`] implements it over the
//! GitHub REST API; [`DryRunHost`] reads through to another host and fakes
//! every write. [`CommitBuilder`] turns a set of pending edits into one commit.

mod client;
mod commit;
mod dry_run;
#[cfg(any(test, feature = "memory-host"))]
pub mod memory;

use std::future::Future;

use ledgersync_shared::{RepoRef, Result};

pub use client::GitHubClient;
pub use commit::{CommitBuilder, CommitStep};
pub use dry_run::DryRunHost;

/// One file placed into a new tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub blob_sha: String,
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
}

/// An issue to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Operations the engine needs from a version-control host.
///
/// Every method is a single request; none retries internally.
pub trait VcsHost: Send + Sync {
    /// Text content of `path` at `reference`. Absent files yield
    /// [`LedgerSyncError::NotFound`](ledgersync_shared::LedgerSyncError::NotFound).
    fn get_file_contents(
        &self,
        repo: &RepoRef,
        path: &str,
        reference: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn branch_exists(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Create `branch` at the head of `from_ref`; returns that head commit id.
    fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        from_ref: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Commit id the branch currently points at.
    fn branch_head(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Tree id of a commit.
    fn commit_tree(
        &self,
        repo: &RepoRef,
        commit_sha: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn create_blob(
        &self,
        repo: &RepoRef,
        content: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// New tree = `base_tree` with `entries` layered on top.
    fn create_tree(
        &self,
        repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> impl Future<Output = Result<String>> + Send;

    fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Point `branch` at `commit_sha` (fast-forward only).
    fn update_ref(
        &self,
        repo: &RepoRef,
        branch: &str,
        commit_sha: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns the pull request URL.
    fn open_pull_request(
        &self,
        repo: &RepoRef,
        pr: &PullRequest,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Returns the issue URL.
    fn open_issue(
        &self,
        repo: &RepoRef,
        issue: &Issue,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// `Ok(None)` for a missing file, errors otherwise.
pub async fn get_optional_file<H: VcsHost>(
    host: &H,
    repo: &RepoRef,
    path: &str,
    reference: &str,
) -> Result<Option<String>> {
    match host.get_file_contents(repo, path, reference).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
