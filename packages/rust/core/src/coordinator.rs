//! One scheduled run across all configured teams.
//!
//! Teams are processed strictly one after another. A team that fails is
//! reported through an issue in its own repository and does not affect the
//! others. Commits are built only after every team has run, and a single
//! pull request summarizes the whole run.

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use ledgersync_answering::{AnsweringService, ContextCache};
use ledgersync_github::{CommitBuilder, Issue, PullRequest, VcsHost};
use ledgersync_shared::{
    AppConfig, CommitOutcome, CommitRecord, PendingEdits, RunSummary, TeamConfig, TeamResult,
};

use crate::alert::AlertSink;
use crate::cost::CostTable;
use crate::pipeline::{ProgressReporter, TeamPipeline};
use crate::report::{render_failure_issue, render_summary_markdown};

/// Drives [`TeamPipeline`] for every team, then commits and reports.
pub struct RunCoordinator<'a, H, A, C, S> {
    host: &'a H,
    answering: &'a A,
    cache: &'a C,
    alerts: &'a S,
    config: &'a AppConfig,
    costs: CostTable,
    now: Option<DateTime<Utc>>,
}

impl<'a, H, A, C, S> RunCoordinator<'a, H, A, C, S>
where
    H: VcsHost,
    A: AnsweringService,
    C: ContextCache,
    S: AlertSink,
{
    pub fn new(host: &'a H, answering: &'a A, cache: &'a C, alerts: &'a S, config: &'a AppConfig) -> Self {
        Self {
            host,
            answering,
            cache,
            alerts,
            config,
            costs: CostTable::from_config(&config.cost),
            now: None,
        }
    }

    /// Pin the run clock (branch date, answer dates, timestamps).
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Branch every team's commit lands on for a run at `now`.
    pub fn branch_name(&self, now: DateTime<Utc>) -> String {
        format!("{}/{}", self.config.github.branch_prefix, now.format("%Y-%m-%d"))
    }

    /// Run every team once. Never fails as a whole: every error is contained
    /// in the summary, an issue, or the log.
    #[instrument(skip_all, fields(teams = teams.len()))]
    pub async fn run_once(&self, teams: &[TeamConfig], progress: &dyn ProgressReporter) -> RunSummary {
        let now = self.now.unwrap_or_else(Utc::now);
        let mut summary = RunSummary::new(now);
        info!(run_id = %summary.run_id, "starting run");

        if let Err(e) = self.cache.ensure_loaded(&self.config.cache.sources).await {
            warn!(error = %e, "context cache could not be loaded; continuing without it");
        }

        let pipeline = TeamPipeline::new(
            self.host,
            self.answering,
            &self.config.ledger.path,
            &self.config.pipeline,
            &self.costs,
        )
        .at(now);

        let mut pending: Vec<(&TeamConfig, PendingEdits)> = Vec::new();
        for (i, team) in teams.iter().enumerate() {
            progress.team_started(&team.id, i + 1, teams.len());
            let result = match pipeline.run(team, progress).await {
                Ok(run) => {
                    if run.result.wants_commit() {
                        pending.push((team, run.edits));
                    }
                    run.result
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    self.report_failure(team, &message, &failure.partial, &mut summary)
                        .await;
                    TeamResult::failed(&team.id, message)
                }
            };
            progress.team_finished(&result);
            summary.results.push(result);
        }

        summary.total_cost = summary.results.iter().map(|r| r.cost).sum();
        if self.costs.exceeds(summary.total_cost) {
            summary.cost_alerted = true;
            let message = format!(
                "ledgersync run {} estimated cost ${:.2} exceeds the ${:.2} threshold",
                summary.run_id,
                summary.total_cost,
                self.costs.threshold()
            );
            if let Err(e) = self.alerts.notify(&message).await {
                warn!(error = %e, "cost alert could not be delivered");
            }
        }

        let branch = self.branch_name(now);
        for (team, edits) in &pending {
            progress.committing(&team.id);
            let outcome = self.commit_team(team, &branch, edits, now).await;
            summary.commits.push(CommitRecord {
                team: team.id.clone(),
                repo: team.repo_ref(),
                branch: branch.clone(),
                outcome,
            });
        }

        match self.cache.usage_stats().await {
            Ok(usage) => summary.usage = Some(usage),
            Err(e) => warn!(error = %e, "usage stats unavailable"),
        }

        self.open_pull_request(teams, &branch, now, &mut summary).await;

        info!(
            succeeded = summary.successful_teams(),
            total = summary.results.len(),
            cost = summary.total_cost,
            "run complete"
        );
        summary
    }

    async fn commit_team(
        &self,
        team: &TeamConfig,
        branch: &str,
        edits: &PendingEdits,
        now: DateTime<Utc>,
    ) -> CommitOutcome {
        let message = format!(
            "docs({}): sync ledger and derived docs ({})",
            team.id,
            now.format("%Y-%m-%d")
        );
        match CommitBuilder::new(self.host)
            .build(&team.repo_ref(), branch, &team.base_branch, edits, &message)
            .await
        {
            Ok(sha) => CommitOutcome::Landed(sha),
            Err(e) => {
                warn!(team = %team.id, error = %e, "commit failed");
                CommitOutcome::Failed(e.to_string())
            }
        }
    }

    async fn report_failure(
        &self,
        team: &TeamConfig,
        message: &str,
        partial: &TeamResult,
        summary: &mut RunSummary,
    ) {
        let issue = Issue {
            title: format!(
                "ledgersync: run failed for {} ({})",
                team.display_name(),
                summary.timestamp.format("%Y-%m-%d")
            ),
            body: render_failure_issue(team, message, partial),
            labels: self.config.github.issue_labels.clone(),
        };
        match self.host.open_issue(&team.repo_ref(), &issue).await {
            Ok(url) => {
                info!(team = %team.id, url = %url, "failure issue opened");
                summary.issues.push(url);
            }
            Err(e) => warn!(team = %team.id, error = %e, "failure issue could not be opened"),
        }
    }

    /// One pull request, against the first team whose commit landed.
    async fn open_pull_request(
        &self,
        teams: &[TeamConfig],
        branch: &str,
        now: DateTime<Utc>,
        summary: &mut RunSummary,
    ) {
        let Some(target) = summary.commits.iter().find_map(|c| match c.outcome {
            CommitOutcome::Landed(_) => teams.iter().find(|t| t.id == c.team),
            CommitOutcome::Failed(_) => None,
        }) else {
            info!("no commits landed; skipping pull request");
            return;
        };

        let pr = PullRequest {
            title: format!("ledgersync: cross-team sync {}", now.format("%Y-%m-%d")),
            body: render_summary_markdown(summary),
            head: branch.to_string(),
            base: target.base_branch.clone(),
        };
        match self.host.open_pull_request(&target.repo_ref(), &pr).await {
            Ok(url) => {
                info!(url = %url, "pull request opened");
                summary.pull_request = Some(url);
            }
            Err(e) => warn!(error = %e, "pull request could not be opened"),
        }
    }
}
