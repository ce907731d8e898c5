//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ledgersync_answering::OpenRouterClient;
use ledgersync_core::{
    AlertSink, LogAlert, Phase, ProgressReporter, RunCoordinator, WebhookAlert,
};
use ledgersync_github::{DryRunHost, GitHubClient, VcsHost};
use ledgersync_ledger::{AnswerMutation, ParseOptions, Question, parse, parse_with};
use ledgersync_shared::{
    AppConfig, CommitOutcome, RunSummary, TeamConfig, TeamResult, init_config, load_config,
    load_config_from, validate_credentials,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ledgersync: keep a cross-team question ledger and team docs in sync.
#[derive(Parser)]
#[command(
    name = "ledgersync",
    version,
    about = "Answer cross-team ledger questions and sync derived docs into each team's repository.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.ledgersync/ledgersync.toml).
    #[arg(long, global = true, env = "LEDGERSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every configured team once: answer, review, plan, commit, open a PR.
    Run {
        /// Only run these teams (repeatable). Defaults to all configured teams.
        #[arg(long = "team")]
        teams: Vec<String>,

        /// Read from GitHub but log every write instead of performing it.
        #[arg(long)]
        dry_run: bool,

        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or edit a local ledger file.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Local ledger subcommands.
#[derive(Subcommand)]
pub(crate) enum LedgerAction {
    /// List the questions in a ledger file.
    List {
        /// Path to the ledger Markdown file.
        file: PathBuf,

        /// Only questions asked by or addressed to this team.
        #[arg(long)]
        team: Option<String>,

        /// Print questions as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Answer one open question in a ledger file.
    Answer {
        /// Path to the ledger Markdown file.
        file: PathBuf,

        /// Question id, e.g. Q-001.
        #[arg(long)]
        id: String,

        /// Answering team id.
        #[arg(long)]
        by: String,

        /// Answer text.
        #[arg(long)]
        answer: String,

        /// Write the result back to the file instead of printing it.
        #[arg(long)]
        write: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "ledgersync=info",
        1 => "ledgersync=debug",
        _ => "ledgersync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Run {
            teams,
            dry_run,
            json,
        } => cmd_run(config_path.as_deref(), &teams, dry_run, json).await,
        Command::Ledger { action } => match action {
            LedgerAction::List { file, team, json } => {
                cmd_ledger_list(config_path.as_deref(), &file, team.as_deref(), json)
            }
            LedgerAction::Answer {
                file,
                id,
                by,
                answer,
                write,
            } => cmd_ledger_answer(config_path.as_deref(), &file, &id, &by, &answer, write),
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

fn env_secret(var: &str) -> Result<String> {
    std::env::var(var).map_err(|_| eyre!("environment variable {var} is not set"))
}

/// Configured teams, narrowed to `only` when given.
fn select_teams(config: &AppConfig, only: &[String]) -> Result<Vec<TeamConfig>> {
    if config.teams.is_empty() {
        return Err(eyre!("no teams configured; add [[teams]] entries to the config file"));
    }
    if only.is_empty() {
        return Ok(config.teams.clone());
    }
    for id in only {
        if !config.teams.iter().any(|t| &t.id == id) {
            return Err(eyre!("unknown team '{id}'"));
        }
    }
    // Keep configuration order regardless of flag order.
    Ok(config
        .teams
        .iter()
        .filter(|t| only.contains(&t.id))
        .cloned()
        .collect())
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Alert sink chosen from config: webhook when its env var is set.
enum Alerts {
    Webhook(WebhookAlert),
    Log(LogAlert),
}

impl Alerts {
    fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config
            .alerts
            .webhook_url_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok());
        Ok(match url {
            Some(url) => Alerts::Webhook(WebhookAlert::new(&url)?),
            None => Alerts::Log(LogAlert),
        })
    }
}

impl AlertSink for Alerts {
    async fn notify(&self, message: &str) -> ledgersync_shared::Result<()> {
        match self {
            Alerts::Webhook(sink) => sink.notify(message).await,
            Alerts::Log(sink) => sink.notify(message).await,
        }
    }
}

async fn cmd_run(config_path: Option<&Path>, only: &[String], dry_run: bool, json: bool) -> Result<()> {
    let config = load(config_path)?;
    validate_credentials(&config)?;
    let teams = select_teams(&config, only)?;

    let github = GitHubClient::new(
        &config.github.api_base_url,
        env_secret(&config.github.token_env)?,
    )?;
    let answering = OpenRouterClient::new(&config.answering, env_secret(&config.answering.api_key_env)?)?
        .with_cache_alias(config.cache.alias.clone());
    let alerts = Alerts::from_config(&config)?;

    info!(teams = teams.len(), dry_run, "starting ledgersync run");

    let summary = if dry_run {
        let host = DryRunHost::new(github);
        execute(&host, &answering, &alerts, &config, &teams).await
    } else {
        execute(&github, &answering, &alerts, &config, &teams).await
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, dry_run);
    }
    Ok(())
}

async fn execute<H: VcsHost>(
    host: &H,
    answering: &OpenRouterClient,
    alerts: &Alerts,
    config: &AppConfig,
    teams: &[TeamConfig],
) -> RunSummary {
    let reporter = CliProgress::new();
    let summary = RunCoordinator::new(host, answering, answering, alerts, config)
        .run_once(teams, &reporter)
        .await;
    reporter.finish();
    summary
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  Dry run: nothing was written.");
    }
    println!(
        "  Run {}: {}/{} teams succeeded",
        summary.run_id,
        summary.successful_teams(),
        summary.results.len()
    );
    for r in &summary.results {
        println!(
            "  {} {:<12} answered {:>2}  reviewed {:>2}  files {:>2}  cost ${:.2}{}",
            if r.success { "✓" } else { "✗" },
            r.team,
            r.questions_answered,
            r.questions_reviewed,
            r.updated_paths.len(),
            r.cost,
            if r.errors.is_empty() {
                String::new()
            } else {
                format!("  ({} errors)", r.errors.len())
            }
        );
    }
    for c in &summary.commits {
        match &c.outcome {
            CommitOutcome::Landed(sha) => println!("  commit {} {}@{}: {sha}", c.team, c.repo, c.branch),
            CommitOutcome::Failed(msg) => println!("  commit {} failed: {msg}", c.team),
        }
    }
    println!(
        "  Total cost: ${:.2}{}",
        summary.total_cost,
        if summary.cost_alerted { " (alert raised)" } else { "" }
    );
    if let Some(usage) = &summary.usage {
        println!("  Tokens:     {} (${:.2})", usage.tokens_used, usage.cost);
    }
    if let Some(pr) = &summary.pull_request {
        println!("  PR:         {pr}");
    }
    for issue in &summary.issues {
        println!("  Issue:      {issue}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn team_started(&self, team: &str, index: usize, total: usize) {
        self.spinner.set_message(format!("[{index}/{total}] {team}"));
    }

    fn phase(&self, team: &str, phase: Phase) {
        self.spinner.set_message(format!("{team}: {phase}"));
    }

    fn item_done(&self, team: &str, phase: Phase, item: &str) {
        self.spinner.set_message(format!("{team}: {phase} {item} done"));
    }

    fn team_finished(&self, result: &TeamResult) {
        let mark = if result.success { "✓" } else { "✗" };
        self.spinner.println(format!(
            "{mark} {} ({} answered, {} reviewed)",
            result.team, result.questions_answered, result.questions_reviewed
        ));
    }

    fn committing(&self, team: &str) {
        self.spinner.set_message(format!("{team}: committing"));
    }
}

// ---------------------------------------------------------------------------
// ledger
// ---------------------------------------------------------------------------

fn read_ledger(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).map_err(|e| eyre!("cannot read ledger '{}': {e}", file.display()))
}

/// Placeholder overrides of every configured team.
fn parse_options(config: &AppConfig) -> ParseOptions {
    config
        .teams
        .iter()
        .filter_map(|t| t.waiting_placeholder.as_deref().map(|p| (t.id.as_str(), p)))
        .fold(ParseOptions::default(), |opts, (team, p)| opts.with_placeholder(team, p))
}

fn list_questions(ledger: &str, config: &AppConfig, team: Option<&str>) -> Vec<Question> {
    parse_with(ledger, &parse_options(config))
        .into_iter()
        .filter(|q| team.is_none_or(|t| q.asked_by == t || q.asked_to == t))
        .collect()
}

/// Apply an answer, anchoring on the addressed team's configured placeholder.
fn answer_ledger(ledger: &str, config: &AppConfig, id: &str, by: &str, answer: &str) -> String {
    let placeholder = parse(ledger)
        .into_iter()
        .find(|q| q.id == id)
        .and_then(|q| config.teams.iter().find(|t| t.id == q.asked_to))
        .and_then(|t| t.waiting_placeholder.as_deref());

    let mutation = AnswerMutation::new(id, answer, by);
    match placeholder {
        Some(p) => mutation.placeholder(p).apply(ledger),
        None => mutation.apply(ledger),
    }
}

fn cmd_ledger_list(
    config_path: Option<&Path>,
    file: &Path,
    team: Option<&str>,
    json: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let selected = list_questions(&read_ledger(file)?, &config, team);

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    if selected.is_empty() {
        println!("No questions found.");
        return Ok(());
    }
    for q in selected {
        println!(
            "{:<6} {:<12} {:>10} → {:<10} {}",
            q.id,
            q.status.to_string(),
            q.asked_by,
            q.asked_to,
            q.title
        );
    }
    Ok(())
}

fn cmd_ledger_answer(
    config_path: Option<&Path>,
    file: &Path,
    id: &str,
    by: &str,
    answer: &str,
    write: bool,
) -> Result<()> {
    let config = load(config_path)?;
    let ledger = read_ledger(file)?;
    let updated = answer_ledger(&ledger, &config, id, by, answer);
    if updated == ledger {
        return Err(eyre!("no question {id} is waiting for an answer in '{}'", file.display()));
    }

    if write {
        std::fs::write(file, &updated)
            .map_err(|e| eyre!("cannot write ledger '{}': {e}", file.display()))?;
        info!(id, by, "ledger updated");
        println!("Answered {id} in {}", file.display());
    } else {
        print!("{updated}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
