//! In-memory [`VcsHost`] backed by a content-addressed object store.
//!
//! Blobs, trees and commits are kept per host, refs per repository. Object
//! ids are sha256 digests so identical content shares a blob the way it does
//! on a real host. A single operation can be made to fail with
//! [`MemoryHost::fail_on`] to exercise partial-failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};

use ledgersync_shared::{LedgerSyncError, RepoRef, Result};

use crate::{Issue, PullRequest, TreeEntry, VcsHost};

/// Host operations, as recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostOp {
    GetFile,
    BranchExists,
    CreateBranch,
    BranchHead,
    CommitTree,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
    OpenPullRequest,
    OpenIssue,
}

#[derive(Debug, Clone)]
struct CommitObject {
    tree: String,
    parent: Option<String>,
    message: String,
}

#[derive(Default)]
struct State {
    blobs: HashMap<String, String>,
    /// tree id -> (path -> blob id)
    trees: HashMap<String, BTreeMap<String, String>>,
    commits: HashMap<String, CommitObject>,
    /// (repo, branch) -> commit id
    refs: HashMap<(String, String), String>,
    pull_requests: Vec<(RepoRef, PullRequest)>,
    issues: Vec<(RepoRef, Issue)>,
    ops: Vec<HostOp>,
    fail_on: Option<HostOp>,
    sequence: u64,
}

impl State {
    fn record(&mut self, op: HostOp) -> Result<()> {
        self.ops.push(op);
        if self.fail_on == Some(op) {
            return Err(LedgerSyncError::Network(format!(
                "injected failure at {op:?}"
            )));
        }
        Ok(())
    }

    fn head(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        self.refs
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| LedgerSyncError::NotFound(format!("{repo} ref heads/{branch}")))
    }

    fn commit(&self, sha: &str) -> Result<&CommitObject> {
        self.commits
            .get(sha)
            .ok_or_else(|| LedgerSyncError::NotFound(format!("commit {sha}")))
    }

    fn put_blob(&mut self, content: &str) -> String {
        let sha = digest(&["blob", content]);
        self.blobs.insert(sha.clone(), content.to_string());
        sha
    }

    fn put_tree(&mut self, files: BTreeMap<String, String>) -> String {
        let mut parts = vec!["tree".to_string()];
        for (path, blob) in &files {
            parts.push(format!("{path}\0{blob}"));
        }
        let borrowed: Vec<&str> = parts.iter().map(String::as_str).collect();
        let sha = digest(&borrowed);
        self.trees.insert(sha.clone(), files);
        sha
    }

    fn put_commit(&mut self, tree: &str, parent: Option<&str>, message: &str) -> String {
        self.sequence += 1;
        let seq = self.sequence.to_string();
        let sha = digest(&["commit", tree, parent.unwrap_or(""), message, seq.as_str()]);
        self.commits.insert(
            sha.clone(),
            CommitObject {
                tree: tree.to_string(),
                parent: parent.map(str::to_string),
                message: message.to_string(),
            },
        );
        sha
    }
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

/// A [`VcsHost`] that lives entirely in memory.
#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<State>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create `branch` in `repo` with a root commit holding `files`.
    /// Returns the commit id.
    pub fn seed(&self, repo: &RepoRef, branch: &str, files: &[(&str, &str)]) -> String {
        let mut state = self.lock();
        let mut tree = BTreeMap::new();
        for (path, content) in files {
            let blob = state.put_blob(content);
            tree.insert(path.to_string(), blob);
        }
        let tree_sha = state.put_tree(tree);
        let commit = state.put_commit(&tree_sha, None, "seed");
        state
            .refs
            .insert((repo.to_string(), branch.to_string()), commit.clone());
        commit
    }

    /// Make every later call of `op` fail with a network error.
    pub fn fail_on(&self, op: HostOp) {
        self.lock().fail_on = Some(op);
    }

    /// Commit the branch points at, if it exists.
    pub fn head(&self, repo: &RepoRef, branch: &str) -> Option<String> {
        self.lock().head(repo, branch).ok()
    }

    /// Content of `path` at the head of `branch`.
    pub fn read(&self, repo: &RepoRef, branch: &str, path: &str) -> Option<String> {
        let state = self.lock();
        let head = state.head(repo, branch).ok()?;
        let tree = &state.commits.get(&head)?.tree;
        let blob = state.trees.get(tree)?.get(path)?;
        state.blobs.get(blob).cloned()
    }

    /// Path -> blob id of the tree a commit points at.
    pub fn tree_entries(&self, commit_sha: &str) -> BTreeMap<String, String> {
        let state = self.lock();
        state
            .commits
            .get(commit_sha)
            .and_then(|c| state.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    pub fn parent_of(&self, commit_sha: &str) -> Option<String> {
        self.lock().commits.get(commit_sha)?.parent.clone()
    }

    pub fn message_of(&self, commit_sha: &str) -> Option<String> {
        self.lock()
            .commits
            .get(commit_sha)
            .map(|c| c.message.clone())
    }

    pub fn pull_requests(&self) -> Vec<(RepoRef, PullRequest)> {
        self.lock().pull_requests.clone()
    }

    pub fn issues(&self) -> Vec<(RepoRef, Issue)> {
        self.lock().issues.clone()
    }

    /// Every operation called so far, in order.
    pub fn ops(&self) -> Vec<HostOp> {
        self.lock().ops.clone()
    }

    pub fn op_count(&self, op: HostOp) -> usize {
        self.lock().ops.iter().filter(|o| **o == op).count()
    }
}

impl VcsHost for MemoryHost {
    async fn get_file_contents(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::GetFile)?;
        let head = state.head(repo, reference)?;
        let tree = state.commit(&head)?.tree.clone();
        state
            .trees
            .get(&tree)
            .and_then(|files| files.get(path))
            .and_then(|blob| state.blobs.get(blob))
            .cloned()
            .ok_or_else(|| LedgerSyncError::NotFound(format!("{repo}:{path}@{reference}")))
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool> {
        let mut state = self.lock();
        state.record(HostOp::BranchExists)?;
        Ok(state.head(repo, branch).is_ok())
    }

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_ref: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::CreateBranch)?;
        let key = (repo.to_string(), branch.to_string());
        if state.refs.contains_key(&key) {
            return Err(LedgerSyncError::validation(format!(
                "reference already exists: {branch}"
            )));
        }
        let head = state.head(repo, from_ref)?;
        state.refs.insert(key, head.clone());
        Ok(head)
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::BranchHead)?;
        state.head(repo, branch)
    }

    async fn commit_tree(&self, _repo: &RepoRef, commit_sha: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::CommitTree)?;
        Ok(state.commit(commit_sha)?.tree.clone())
    }

    async fn create_blob(&self, _repo: &RepoRef, content: &str) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::CreateBlob)?;
        Ok(state.put_blob(content))
    }

    async fn create_tree(
        &self,
        _repo: &RepoRef,
        base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::CreateTree)?;
        let mut files = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| LedgerSyncError::NotFound(format!("tree {base_tree}")))?;
        for entry in entries {
            if !state.blobs.contains_key(&entry.blob_sha) {
                return Err(LedgerSyncError::NotFound(format!("blob {}", entry.blob_sha)));
            }
            files.insert(entry.path.clone(), entry.blob_sha.clone());
        }
        Ok(state.put_tree(files))
    }

    async fn create_commit(
        &self,
        _repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::CreateCommit)?;
        if !state.trees.contains_key(tree_sha) {
            return Err(LedgerSyncError::NotFound(format!("tree {tree_sha}")));
        }
        state.commit(parent_sha)?;
        Ok(state.put_commit(tree_sha, Some(parent_sha), message))
    }

    async fn update_ref(&self, repo: &RepoRef, branch: &str, commit_sha: &str) -> Result<()> {
        let mut state = self.lock();
        state.record(HostOp::UpdateRef)?;
        let current = state.head(repo, branch)?;
        let parent = state.commit(commit_sha)?.parent.clone();
        if parent.as_deref() != Some(current.as_str()) {
            return Err(LedgerSyncError::Network(format!(
                "update of heads/{branch} is not a fast forward"
            )));
        }
        state
            .refs
            .insert((repo.to_string(), branch.to_string()), commit_sha.to_string());
        Ok(())
    }

    async fn open_pull_request(&self, repo: &RepoRef, pr: &PullRequest) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::OpenPullRequest)?;
        state.pull_requests.push((repo.clone(), pr.clone()));
        Ok(format!(
            "https://github.com/{repo}/pull/{}",
            state.pull_requests.len()
        ))
    }

    async fn open_issue(&self, repo: &RepoRef, issue: &Issue) -> Result<String> {
        let mut state = self.lock();
        state.record(HostOp::OpenIssue)?;
        state.issues.push((repo.clone(), issue.clone()));
        Ok(format!("https://github.com/{repo}/issues/{}", state.issues.len()))
    }
}
