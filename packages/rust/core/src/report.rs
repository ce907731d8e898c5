//! Markdown bodies for the run's pull request and failure issues.

use ledgersync_shared::{CommitOutcome, RunSummary, TeamConfig, TeamResult};

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Pull request body: one table row per team plus commit and error details.
pub fn render_summary_markdown(summary: &RunSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "## ledgersync run {}\n\nRun `{}`: {} of {} teams succeeded. Estimated cost ${:.2}",
        summary.timestamp.format("%Y-%m-%d %H:%M UTC"),
        summary.run_id,
        summary.successful_teams(),
        summary.results.len(),
        summary.total_cost,
    ));
    if summary.cost_alerted {
        out.push_str(" (over budget)");
    }
    out.push_str(".\n\n");

    out.push_str("| Team | Status | Answered | Reviewed | Files | Plan | README update | Cost | Errors |\n");
    out.push_str("|------|--------|---------:|---------:|------:|------|---------------|-----:|-------:|\n");
    for r in &summary.results {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | ${:.2} | {} |\n",
            r.team,
            if r.success { "✅ ok" } else { "❌ failed" },
            r.questions_answered,
            r.questions_reviewed,
            r.updated_paths.len(),
            yes_no(r.plan_updated),
            yes_no(r.readme_needs_update),
            r.cost,
            r.errors.len(),
        ));
    }

    if !summary.commits.is_empty() {
        out.push_str("\n### Commits\n\n");
        for c in &summary.commits {
            match &c.outcome {
                CommitOutcome::Landed(sha) => out.push_str(&format!(
                    "- `{}` {}@{}: `{}`\n",
                    c.team,
                    c.repo,
                    c.branch,
                    &sha[..sha.len().min(12)]
                )),
                CommitOutcome::Failed(msg) => out.push_str(&format!(
                    "- `{}` {}@{}: failed: {msg}\n",
                    c.team, c.repo, c.branch
                )),
            }
        }
    }

    let with_errors: Vec<&TeamResult> = summary.results.iter().filter(|r| !r.errors.is_empty()).collect();
    if !with_errors.is_empty() {
        out.push_str("\n### Errors\n");
        for r in with_errors {
            out.push_str(&format!("\n**{}**\n\n", r.team));
            for e in &r.errors {
                out.push_str(&format!("- {e}\n"));
            }
        }
    }

    if let Some(usage) = &summary.usage {
        out.push_str(&format!(
            "\nAnswering service usage: {} tokens (${:.2}).\n",
            usage.tokens_used, usage.cost
        ));
    }
    out
}

/// Issue body for a team whose pipeline aborted.
pub fn render_failure_issue(team: &TeamConfig, message: &str, partial: &TeamResult) -> String {
    let mut out = format!(
        "The ledgersync run for **{}** (`{}`) aborted.\n\n### Cause\n\n```\n{message}\n```\n\n",
        team.display_name(),
        team.id,
    );
    out.push_str("### Progress before the abort\n\n");
    out.push_str(&format!(
        "- Questions answered: {}\n- Questions reviewed: {}\n- Files with pending changes: {}\n- Plan regenerated: {}\n- Estimated cost: ${:.2}\n",
        partial.questions_answered,
        partial.questions_reviewed,
        partial.updated_paths.len(),
        yes_no(partial.plan_updated),
        partial.cost,
    ));

    let earlier: Vec<&String> = partial.errors.iter().filter(|e| e.as_str() != message).collect();
    if !earlier.is_empty() {
        out.push_str("\n### Earlier item errors\n\n");
        for e in earlier {
            out.push_str(&format!("- {e}\n"));
        }
    }
    out.push_str("\nNo changes were committed for this team.\n");
    out
}
