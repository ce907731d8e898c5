//! Atomic multi-file commits over the object-graph primitives.
//!
//! Order: ensure branch, resolve head, read base tree, one blob per file,
//! layered tree, commit, and only then move the ref. A failure before the
//! final step leaves only unreachable objects behind; the branch still points
//! at its prior commit.

use std::fmt;

use tracing::{debug, info, instrument};

use ledgersync_shared::{LedgerSyncError, PendingEdits, RepoRef, Result};

use crate::{TreeEntry, VcsHost};

/// Stage of commit construction, named in
/// [`LedgerSyncError::CommitConstruction`] errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStep {
    Prepare,
    EnsureBranch,
    ResolveHead,
    ReadBaseTree,
    CreateBlob,
    CreateTree,
    CreateCommit,
    UpdateRef,
}

impl CommitStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::EnsureBranch => "ensure-branch",
            Self::ResolveHead => "resolve-head",
            Self::ReadBaseTree => "read-base-tree",
            Self::CreateBlob => "create-blob",
            Self::CreateTree => "create-tree",
            Self::CreateCommit => "create-commit",
            Self::UpdateRef => "update-ref",
        }
    }
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn at<T>(step: CommitStep, result: Result<T>) -> Result<T> {
    result.map_err(|e| LedgerSyncError::commit(step, e.to_string()))
}

/// Materializes one team's [`PendingEdits`] as a single commit.
pub struct CommitBuilder<'a, H> {
    host: &'a H,
}

impl<'a, H: VcsHost> CommitBuilder<'a, H> {
    pub fn new(host: &'a H) -> Self {
        Self { host }
    }

    /// Commit every pending file to `branch` in `repo` and return the new
    /// commit id. A missing `branch` is created from `baseline`; an existing
    /// one is reused and the commit stacks on its head.
    ///
    /// Nothing is retried. Any failing step yields
    /// [`LedgerSyncError::CommitConstruction`] with the ref untouched.
    #[instrument(skip_all, fields(repo = %repo, branch = %branch, files = edits.len()))]
    pub async fn build(
        &self,
        repo: &RepoRef,
        branch: &str,
        baseline: &str,
        edits: &PendingEdits,
        message: &str,
    ) -> Result<String> {
        if edits.is_empty() {
            return Err(LedgerSyncError::commit(
                CommitStep::Prepare,
                "no pending edits to commit",
            ));
        }

        let exists = at(
            CommitStep::EnsureBranch,
            self.host.branch_exists(repo, branch).await,
        )?;
        let parent = if exists {
            debug!(branch, "reusing existing branch");
            at(
                CommitStep::ResolveHead,
                self.host.branch_head(repo, branch).await,
            )?
        } else {
            debug!(branch, baseline, "creating branch");
            at(
                CommitStep::EnsureBranch,
                self.host.create_branch(repo, branch, baseline).await,
            )?
        };

        let base_tree = at(
            CommitStep::ReadBaseTree,
            self.host.commit_tree(repo, &parent).await,
        )?;

        let mut entries = Vec::with_capacity(edits.len());
        for (path, content) in edits.iter() {
            let blob_sha = at(
                CommitStep::CreateBlob,
                self.host.create_blob(repo, content).await,
            )?;
            entries.push(TreeEntry {
                path: path.to_string(),
                blob_sha,
            });
        }

        let tree = at(
            CommitStep::CreateTree,
            self.host.create_tree(repo, &base_tree, &entries).await,
        )?;
        let commit = at(
            CommitStep::CreateCommit,
            self.host.create_commit(repo, message, &tree, &parent).await,
        )?;

        at(
            CommitStep::UpdateRef,
            self.host.update_ref(repo, branch, &commit).await,
        )?;

        info!(commit = %commit, files = entries.len(), "branch advanced");
        Ok(commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{HostOp, MemoryHost};
    use ledgersync_shared::ErrorKind;

    const BRANCH: &str = "ledgersync/2026-10-19";

    fn repo() -> RepoRef {
        RepoRef::new("acme", "data-eng")
    }

    fn seeded() -> MemoryHost {
        let host = MemoryHost::new();
        host.seed(
            &repo(),
            "main",
            &[
                ("README.md", "# Data Eng\n"),
                ("docs/CROSS_TEAM_QUESTIONS.md", "ledger v1\n"),
                ("docs/INSIGHTS.md", "insights v1\n"),
            ],
        );
        host
    }

    fn edits(files: &[(&str, &str)]) -> PendingEdits {
        let mut edits = PendingEdits::new();
        for (path, content) in files {
            edits.insert(*path, *content);
        }
        edits
    }

    #[tokio::test]
    async fn k_files_make_exactly_one_commit() {
        let host = seeded();
        let base = host.head(&repo(), "main").unwrap();
        let pending = edits(&[
            ("docs/CROSS_TEAM_QUESTIONS.md", "ledger v2\n"),
            ("docs/INSIGHTS.md", "insights v2\n"),
            ("docs/NEXT_SESSION.md", "plan\n"),
        ]);

        let commit = CommitBuilder::new(&host)
            .build(&repo(), BRANCH, "main", &pending, "docs(de): sync")
            .await
            .unwrap();

        assert_eq!(host.head(&repo(), BRANCH).as_deref(), Some(commit.as_str()));
        assert_eq!(host.parent_of(&commit).as_deref(), Some(base.as_str()));
        assert_eq!(host.message_of(&commit).as_deref(), Some("docs(de): sync"));
        assert_eq!(host.op_count(HostOp::CreateCommit), 1);

        let before = host.tree_entries(&base);
        let after = host.tree_entries(&commit);
        let changed = after
            .iter()
            .filter(|(path, blob)| before.get(*path) != Some(*blob))
            .count();
        assert_eq!(changed, 3);
        assert_eq!(after.get("README.md"), before.get("README.md"));

        assert_eq!(
            host.read(&repo(), BRANCH, "docs/NEXT_SESSION.md").as_deref(),
            Some("plan\n")
        );
        // Baseline branch is never moved.
        assert_eq!(host.head(&repo(), "main"), Some(base));
    }

    #[tokio::test]
    async fn existing_branch_is_reused() {
        let host = seeded();
        let builder = CommitBuilder::new(&host);

        let first = builder
            .build(&repo(), BRANCH, "main", &edits(&[("a.md", "1")]), "first")
            .await
            .unwrap();
        let second = builder
            .build(&repo(), BRANCH, "main", &edits(&[("b.md", "2")]), "second")
            .await
            .unwrap();

        assert_eq!(host.op_count(HostOp::CreateBranch), 1);
        assert_eq!(host.parent_of(&second), Some(first));
        assert_eq!(host.read(&repo(), BRANCH, "a.md").as_deref(), Some("1"));
        assert_eq!(host.read(&repo(), BRANCH, "b.md").as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn empty_edits_are_rejected_before_any_call() {
        let host = seeded();
        let err = CommitBuilder::new(&host)
            .build(&repo(), BRANCH, "main", &PendingEdits::new(), "noop")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::CommitConstruction);
        assert!(err.to_string().contains("prepare"));
        assert!(host.ops().is_empty());
    }

    #[tokio::test]
    async fn failure_at_any_step_leaves_branch_unmoved() {
        let cases = [
            (HostOp::CommitTree, "read-base-tree"),
            (HostOp::CreateBlob, "create-blob"),
            (HostOp::CreateTree, "create-tree"),
            (HostOp::CreateCommit, "create-commit"),
            (HostOp::UpdateRef, "update-ref"),
        ];

        for (op, step) in cases {
            let host = seeded();
            // Branch exists from an earlier run, so its head is observable.
            let prior = CommitBuilder::new(&host)
                .build(&repo(), BRANCH, "main", &edits(&[("x.md", "x")]), "prior")
                .await
                .unwrap();
            host.fail_on(op);
            let calls_before = host.op_count(op);

            let err = CommitBuilder::new(&host)
                .build(
                    &repo(),
                    BRANCH,
                    "main",
                    &edits(&[("a.md", "1"), ("b.md", "2")]),
                    "doomed",
                )
                .await
                .unwrap_err();

            assert_eq!(err.kind(), ErrorKind::CommitConstruction, "{op:?}");
            assert!(err.to_string().contains(step), "{err}");
            assert_eq!(host.head(&repo(), BRANCH).as_deref(), Some(prior.as_str()));
            assert_eq!(host.read(&repo(), BRANCH, "a.md"), None);
            // No internal retry.
            assert_eq!(host.op_count(op), calls_before + 1, "{op:?}");
        }
    }

    #[tokio::test]
    async fn branch_creation_failure_is_reported() {
        let host = seeded();
        host.fail_on(HostOp::CreateBranch);

        let err = CommitBuilder::new(&host)
            .build(&repo(), BRANCH, "main", &edits(&[("a.md", "1")]), "m")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("ensure-branch"));
        assert_eq!(host.head(&repo(), BRANCH), None);
    }

    #[test]
    fn step_names() {
        assert_eq!(CommitStep::UpdateRef.to_string(), "update-ref");
        assert_eq!(CommitStep::ReadBaseTree.as_str(), "read-base-tree");
    }
}
