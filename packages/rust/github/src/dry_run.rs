use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use ledgersync_shared::{RepoRef, Result};

use crate::{Issue, PullRequest, TreeEntry, VcsHost};

/// Reads go to the wrapped host; writes are logged and answered with
/// synthetic ids, so a full run can be previewed without touching any repo.
pub struct DryRunHost<H> {
    inner: H,
    counter: AtomicU64,
}

impl<H: VcsHost> DryRunHost<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self, kind: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("dry-run-{kind}-{n}")
    }
}

impl<H: VcsHost> VcsHost for DryRunHost<H> {
    async fn get_file_contents(&self, repo: &RepoRef, path: &str, reference: &str) -> Result<String> {
        self.inner.get_file_contents(repo, path, reference).await
    }

    async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> Result<bool> {
        self.inner.branch_exists(repo, branch).await
    }

    async fn create_branch(&self, repo: &RepoRef, branch: &str, from_ref: &str) -> Result<String> {
        info!(repo = %repo, branch, from_ref, "[dry-run] would create branch");
        self.inner.branch_head(repo, from_ref).await
    }

    async fn branch_head(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        self.inner.branch_head(repo, branch).await
    }

    async fn commit_tree(&self, repo: &RepoRef, commit_sha: &str) -> Result<String> {
        self.inner.commit_tree(repo, commit_sha).await
    }

    async fn create_blob(&self, repo: &RepoRef, content: &str) -> Result<String> {
        info!(repo = %repo, bytes = content.len(), "[dry-run] would create blob");
        Ok(self.next_id("blob"))
    }

    async fn create_tree(
        &self,
        repo: &RepoRef,
        _base_tree: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        for entry in entries {
            info!(repo = %repo, path = %entry.path, "[dry-run] would write file");
        }
        Ok(self.next_id("tree"))
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        _tree_sha: &str,
        parent_sha: &str,
    ) -> Result<String> {
        info!(repo = %repo, parent = parent_sha, message, "[dry-run] would create commit");
        Ok(self.next_id("commit"))
    }

    async fn update_ref(&self, repo: &RepoRef, branch: &str, commit_sha: &str) -> Result<()> {
        info!(repo = %repo, branch, commit = commit_sha, "[dry-run] would update ref");
        Ok(())
    }

    async fn open_pull_request(&self, repo: &RepoRef, pr: &PullRequest) -> Result<String> {
        info!(repo = %repo, head = %pr.head, base = %pr.base, title = %pr.title, "[dry-run] would open pull request");
        Ok(format!("dry-run://{repo}/pull/{}", self.next_id("pr")))
    }

    async fn open_issue(&self, repo: &RepoRef, issue: &Issue) -> Result<String> {
        info!(repo = %repo, title = %issue.title, "[dry-run] would open issue");
        Ok(format!("dry-run://{repo}/issues/{}", self.next_id("issue")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommitBuilder;
    use crate::memory::{HostOp, MemoryHost};
    use ledgersync_shared::PendingEdits;

    #[tokio::test]
    async fn commit_through_dry_run_leaves_host_untouched() {
        let repo = RepoRef::new("acme", "nexus");
        let memory = MemoryHost::new();
        let head = memory.seed(&repo, "main", &[("README.md", "hi")]);
        let host = DryRunHost::new(memory);

        let mut edits = PendingEdits::new();
        edits.insert("README.md", "changed");
        let commit = CommitBuilder::new(&host)
            .build(&repo, "ledgersync/2026-10-19", "main", &edits, "m")
            .await
            .unwrap();

        assert!(commit.starts_with("dry-run-commit-"));
        let inner = &host.inner;
        assert_eq!(inner.head(&repo, "main"), Some(head));
        assert_eq!(inner.head(&repo, "ledgersync/2026-10-19"), None);
        assert_eq!(inner.op_count(HostOp::CreateBlob), 0);
        assert_eq!(inner.op_count(HostOp::UpdateRef), 0);
    }

    #[tokio::test]
    async fn reads_pass_through() {
        let repo = RepoRef::new("acme", "nexus");
        let memory = MemoryHost::new();
        memory.seed(&repo, "main", &[("docs/a.md", "alpha")]);
        let host = DryRunHost::new(memory);

        assert_eq!(
            host.get_file_contents(&repo, "docs/a.md", "main")
                .await
                .unwrap(),
            "alpha"
        );
        let url = host
            .open_issue(
                &repo,
                &Issue {
                    title: "t".into(),
                    body: "b".into(),
                    labels: vec![],
                },
            )
            .await
            .unwrap();
        assert!(url.starts_with("dry-run://acme/nexus/issues/"));
        assert!(host.inner.issues().is_empty());
    }
}
