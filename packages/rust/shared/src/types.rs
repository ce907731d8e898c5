//! Core domain types shared by the pipeline, the commit builder and the CLI.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RepoRef
// ---------------------------------------------------------------------------

/// `owner/repo` on the VCS host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

// ---------------------------------------------------------------------------
// PendingEdits
// ---------------------------------------------------------------------------

/// File path → full new content, produced by one team's pipeline run.
///
/// At most one content per path: a later [`PendingEdits::insert`] for the same
/// path replaces the earlier one. Paths without an entry are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PendingEdits {
    files: BTreeMap<String, String>,
}

impl PendingEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `content` for `path`, replacing any earlier pending content.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Pending content for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Changed paths in sorted order.
    pub fn paths(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_str()))
    }
}

// ---------------------------------------------------------------------------
// TeamResult
// ---------------------------------------------------------------------------

/// Per-team outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamResult {
    /// Team identifier.
    pub team: String,
    /// Questions addressed to the team that received an answer this run.
    pub questions_answered: usize,
    /// Answers to the team's own questions that were turned into insights.
    pub questions_reviewed: usize,
    /// Paths with pending content.
    pub updated_paths: Vec<String>,
    /// The next-session plan was regenerated.
    pub plan_updated: bool,
    /// The README audit asked for changes.
    pub readme_needs_update: bool,
    /// Sum of fixed per-operation cost estimates (USD).
    pub cost: f64,
    /// Item-level and fatal error messages, in occurrence order.
    pub errors: Vec<String>,
    /// False only when a phase-fatal error aborted the pipeline.
    pub success: bool,
}

impl TeamResult {
    /// Fresh result at pipeline start: zero counters, no errors, successful.
    pub fn start(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            success: true,
            ..Self::default()
        }
    }

    /// Zero-count failed result carrying a single error message.
    pub fn failed(team: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            errors: vec![error.into()],
            success: false,
            ..Self::default()
        }
    }

    /// Whether the coordinator should build a commit for this team.
    pub fn wants_commit(&self) -> bool {
        self.success && !self.updated_paths.is_empty()
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

/// Outcome of one team's commit phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub team: String,
    pub repo: RepoRef,
    pub branch: String,
    /// New commit id, or the construction error message.
    pub outcome: CommitOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum CommitOutcome {
    Landed(String),
    Failed(String),
}

/// Token and cost usage reported by the answering service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageStats {
    pub cost: f64,
    pub tokens_used: u64,
}

/// Coordinator-level aggregate of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub timestamp: DateTime<Utc>,
    /// One entry per configured team, in configuration order.
    pub results: Vec<TeamResult>,
    pub total_cost: f64,
    /// Whether the cost alert was raised.
    pub cost_alerted: bool,
    pub pull_request: Option<String>,
    pub issues: Vec<String>,
    pub commits: Vec<CommitRecord>,
    pub usage: Option<UsageStats>,
}

impl RunSummary {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            run_id: RunId::new(),
            timestamp,
            results: Vec::new(),
            total_cost: 0.0,
            cost_alerted: false,
            pull_request: None,
            issues: Vec::new(),
            commits: Vec::new(),
            usage: None,
        }
    }

    pub fn successful_teams(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}
