//! Per-team pipeline: answer → review → check-updates → plan → readme-audit.
//!
//! Phases run in a fixed order. Inside a phase, a failing question or query
//! is recorded in [`TeamResult::errors`] and the phase moves on. Only a
//! foundational failure (the ledger cannot be read) escapes a phase; it
//! aborts the remaining phases and fails the team.

use std::fmt;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use ledgersync_answering::AnsweringService;
use ledgersync_github::{VcsHost, get_optional_file};
use ledgersync_ledger::{
    AnswerMutation, DocumentAccumulator, ParseOptions, Question, QuestionStatus, awaiting_review,
    has_entry, inbox, parse_with,
};
use ledgersync_shared::{LedgerSyncError, PendingEdits, PipelineConfig, Result, TeamConfig, TeamResult};

use crate::cost::{CostTable, Operation};
use crate::prompts;

// ---------------------------------------------------------------------------
// Phases and progress
// ---------------------------------------------------------------------------

/// Pipeline phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Answer,
    Review,
    CheckUpdates,
    Plan,
    ReadmeAudit,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::Answer,
        Phase::Review,
        Phase::CheckUpdates,
        Phase::Plan,
        Phase::ReadmeAudit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Review => "review",
            Self::CheckUpdates => "check-updates",
            Self::Plan => "plan",
            Self::ReadmeAudit => "readme-audit",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a team's pipeline starts (`index` is 1-based).
    fn team_started(&self, team: &str, index: usize, total: usize);
    /// Called when entering a phase.
    fn phase(&self, team: &str, phase: Phase);
    /// Called after one question or query in a phase succeeded.
    fn item_done(&self, team: &str, phase: Phase, item: &str);
    /// Called with the team's final (or synthesized failed) result.
    fn team_finished(&self, result: &TeamResult);
    /// Called before a team's commit is built.
    fn committing(&self, team: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn team_started(&self, _team: &str, _index: usize, _total: usize) {}
    fn phase(&self, _team: &str, _phase: Phase) {}
    fn item_done(&self, _team: &str, _phase: Phase, _item: &str) {}
    fn team_finished(&self, _result: &TeamResult) {}
    fn committing(&self, _team: &str) {}
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A pipeline that ran to completion (possibly with item errors).
#[derive(Debug)]
pub struct TeamRun {
    pub result: TeamResult,
    pub edits: PendingEdits,
}

/// A pipeline aborted by a phase-fatal error.
#[derive(Debug)]
pub struct TeamFailure {
    pub error: LedgerSyncError,
    /// Counters reached before the abort.
    pub partial: TeamResult,
}

/// Mutable state owned by one pipeline run.
struct TeamState {
    result: TeamResult,
    edits: PendingEdits,
    /// Ledger view after this run's answers, for the plan prompt.
    questions: Vec<Question>,
}

impl TeamState {
    fn new(team: &str) -> Self {
        Self {
            result: TeamResult::start(team),
            edits: PendingEdits::new(),
            questions: Vec::new(),
        }
    }

    fn record_edit(&mut self, path: &str, content: String) {
        self.edits.insert(path, content);
        if !self.result.updated_paths.iter().any(|p| p == path) {
            self.result.updated_paths.push(path.to_string());
        }
    }

    fn item_error(&mut self, phase: Phase, item: &str, error: impl fmt::Display) {
        warn!(team = %self.result.team, %phase, item, error = %error, "item failed");
        self.result.errors.push(format!("{phase} {item}: {error}"));
    }

    fn charge(&mut self, costs: &CostTable, op: Operation) {
        self.result.cost += costs.charge(op);
    }
}

// ---------------------------------------------------------------------------
// TeamPipeline
// ---------------------------------------------------------------------------

/// Runs the five phases for one team against its own repository.
pub struct TeamPipeline<'a, H, A> {
    host: &'a H,
    answering: &'a A,
    ledger_path: &'a str,
    settings: &'a PipelineConfig,
    costs: &'a CostTable,
    now: DateTime<Utc>,
}

impl<'a, H: VcsHost, A: AnsweringService> TeamPipeline<'a, H, A> {
    pub fn new(
        host: &'a H,
        answering: &'a A,
        ledger_path: &'a str,
        settings: &'a PipelineConfig,
        costs: &'a CostTable,
    ) -> Self {
        Self {
            host,
            answering,
            ledger_path,
            settings,
            costs,
            now: Utc::now(),
        }
    }

    /// Use `now` for answer dates and log timestamps.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Run every phase for `team`. Pending edits are returned, never written.
    #[instrument(skip_all, fields(team = %team.id))]
    pub async fn run(
        &self,
        team: &TeamConfig,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<TeamRun, TeamFailure> {
        let mut state = TeamState::new(&team.id);

        for phase in Phase::ALL {
            progress.phase(&team.id, phase);
            debug!(%phase, "entering phase");

            let outcome = match phase {
                Phase::Answer => self.answer(team, &mut state, progress).await,
                Phase::Review => self.review(team, &mut state, progress).await,
                Phase::CheckUpdates => self.check_updates(team, &mut state, progress).await,
                Phase::Plan => self.plan(team, &mut state, progress).await,
                Phase::ReadmeAudit => self.readme_audit(team, &mut state, progress).await,
            };

            if let Err(error) = outcome {
                let error = match error {
                    e @ LedgerSyncError::PhaseFatal { .. } => e,
                    other => LedgerSyncError::phase_fatal(phase, other.to_string()),
                };
                warn!(%phase, error = %error, "pipeline aborted");
                let mut partial = state.result;
                partial.success = false;
                partial.errors.push(error.to_string());
                return Err(TeamFailure { error, partial });
            }
        }

        info!(
            answered = state.result.questions_answered,
            reviewed = state.result.questions_reviewed,
            files = state.result.updated_paths.len(),
            errors = state.result.errors.len(),
            cost = state.result.cost,
            "pipeline complete"
        );
        Ok(TeamRun {
            result: state.result,
            edits: state.edits,
        })
    }

    fn parse_options(team: &TeamConfig) -> ParseOptions {
        match &team.waiting_placeholder {
            Some(p) => ParseOptions::default().with_placeholder(&team.id, p),
            None => ParseOptions::default(),
        }
    }

    async fn fetch_ledger(&self, team: &TeamConfig, phase: Phase) -> Result<String> {
        self.host
            .get_file_contents(&team.repo_ref(), self.ledger_path, &team.base_branch)
            .await
            .map_err(|e| {
                LedgerSyncError::phase_fatal(
                    phase,
                    format!("cannot read ledger {}: {e}", self.ledger_path),
                )
            })
    }

    /// Answer every open question addressed to the team, one ledger
    /// mutation per answer, all stacked on the same fetched copy.
    async fn answer(
        &self,
        team: &TeamConfig,
        state: &mut TeamState,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let ledger = self.fetch_ledger(team, Phase::Answer).await?;
        let opts = Self::parse_options(team);
        let questions = parse_with(&ledger, &opts);
        let pending: Vec<Question> = inbox(&questions, &team.id).into_iter().cloned().collect();
        debug!(count = pending.len(), "questions awaiting an answer");

        let mut current = ledger;
        let mut answered = 0;

        for question in &pending {
            let reply = match self.answering.ask(&prompts::answer(team, question)).await {
                Ok(reply) => reply,
                Err(e) => {
                    state.item_error(Phase::Answer, &question.id, e);
                    continue;
                }
            };
            state.charge(self.costs, Operation::Answer);

            let mut mutation = AnswerMutation::new(&question.id, &reply, &team.id)
                .on(self.now.date_naive());
            if let Some(placeholder) = team.waiting_placeholder.as_deref() {
                mutation = mutation.placeholder(placeholder);
            }
            let updated = mutation.apply(&current);
            if updated == current {
                state.item_error(Phase::Answer, &question.id, "answer placeholder not found");
                continue;
            }

            current = updated;
            answered += 1;
            progress.item_done(&team.id, Phase::Answer, &question.id);
        }

        state.result.questions_answered = answered;
        if answered > 0 {
            state.record_edit(self.ledger_path, current.clone());
        }
        state.questions = parse_with(&current, &opts);
        Ok(())
    }

    /// Turn answers to the team's own questions into insights-log entries.
    async fn review(
        &self,
        team: &TeamConfig,
        state: &mut TeamState,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let ledger = self.fetch_ledger(team, Phase::Review).await?;
        let questions = parse_with(&ledger, &Self::parse_options(team));
        let candidates = awaiting_review(&questions, &team.id);
        if candidates.is_empty() {
            debug!("no answered questions to review");
            return Ok(());
        }

        let mut doc = match get_optional_file(
            self.host,
            &team.repo_ref(),
            &team.insights_path,
            &team.base_branch,
        )
        .await
        {
            Ok(doc) => doc,
            Err(e) => {
                state.item_error(Phase::Review, &team.insights_path, e);
                return Ok(());
            }
        };

        let accumulator = DocumentAccumulator::insights();
        let mut reviewed = 0;

        for question in candidates {
            if doc.as_deref().is_some_and(|d| has_entry(d, &question.id)) {
                debug!(id = %question.id, "insight already recorded");
                continue;
            }

            match self.answering.ask(&prompts::review(team, question)).await {
                Ok(insight) => {
                    state.charge(self.costs, Operation::Review);
                    doc = Some(accumulator.append_at(doc.as_deref(), &question.id, &insight, self.now));
                    reviewed += 1;
                    progress.item_done(&team.id, Phase::Review, &question.id);
                }
                Err(e) => state.item_error(Phase::Review, &question.id, e),
            }
        }

        state.result.questions_reviewed = reviewed;
        if let Some(doc) = doc.filter(|_| reviewed > 0) {
            state.record_edit(&team.insights_path, doc);
        }
        Ok(())
    }

    async fn check_updates(
        &self,
        team: &TeamConfig,
        state: &mut TeamState,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let reply = match self.answering.ask(&prompts::check_updates(team)).await {
            Ok(reply) => reply,
            Err(e) => {
                state.item_error(Phase::CheckUpdates, "query", e);
                return Ok(());
            }
        };
        state.charge(self.costs, Operation::CheckUpdates);

        let digest = reply.trim();
        if digest.chars().count() <= self.settings.min_update_len {
            debug!(len = digest.len(), "no relevant upstream changes");
            return Ok(());
        }

        let existing = match get_optional_file(
            self.host,
            &team.repo_ref(),
            &team.updates_path,
            &team.base_branch,
        )
        .await
        {
            Ok(existing) => existing,
            Err(e) => {
                state.item_error(Phase::CheckUpdates, &team.updates_path, e);
                return Ok(());
            }
        };

        let entry_id = self.now.format("%Y-%m-%d").to_string();
        let doc =
            DocumentAccumulator::updates().append_at(existing.as_deref(), &entry_id, digest, self.now);
        state.record_edit(&team.updates_path, doc);
        progress.item_done(&team.id, Phase::CheckUpdates, &entry_id);
        Ok(())
    }

    async fn plan(
        &self,
        team: &TeamConfig,
        state: &mut TeamState,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let prompt = {
            let involved: Vec<&Question> = state
                .questions
                .iter()
                .filter(|q| q.asked_by == team.id || q.asked_to == team.id)
                .filter(|q| matches!(q.status, QuestionStatus::Open | QuestionStatus::Blocked))
                .collect();
            prompts::plan(team, &involved)
        };

        let reply = match self.answering.ask(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                state.item_error(Phase::Plan, "query", e);
                return Ok(());
            }
        };
        state.charge(self.costs, Operation::Plan);

        let content = format!(
            "# Next Session Plan: {}\n\n_Generated by ledgersync on {}._\n\n{}\n",
            team.display_name(),
            self.now.format("%Y-%m-%d"),
            reply.trim(),
        );
        state.record_edit(&team.plan_path, content);
        state.result.plan_updated = true;
        progress.item_done(&team.id, Phase::Plan, &team.plan_path);
        Ok(())
    }

    async fn readme_audit(
        &self,
        team: &TeamConfig,
        state: &mut TeamState,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        let readme = match get_optional_file(
            self.host,
            &team.repo_ref(),
            &team.readme_path,
            &team.base_branch,
        )
        .await
        {
            Ok(readme) => readme,
            Err(e) => {
                state.item_error(Phase::ReadmeAudit, &team.readme_path, e);
                return Ok(());
            }
        };

        let phrase = &self.settings.no_changes_phrase;
        let prompt = prompts::readme_audit(team, readme.as_deref(), phrase);
        let reply = match self.answering.ask(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                state.item_error(Phase::ReadmeAudit, "query", e);
                return Ok(());
            }
        };
        state.charge(self.costs, Operation::ReadmeAudit);

        if reply.to_lowercase().contains(&phrase.to_lowercase()) {
            debug!("README is current");
        } else {
            info!(path = %team.readme_path, "README needs update");
            state.result.readme_needs_update = true;
        }
        progress.item_done(&team.id, Phase::ReadmeAudit, &team.readme_path);
        Ok(())
    }
}
