//! Application configuration for ledgersync.
//!
//! User config lives at `~/.ledgersync/ledgersync.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored here, only the names of the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LedgerSyncError, Result};
use crate::types::RepoRef;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ledgersync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ledgersync";

// ---------------------------------------------------------------------------
// Config structs (matching ledgersync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// GitHub host settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// Answering service settings.
    #[serde(default)]
    pub answering: AnsweringConfig,

    /// Where the ledger lives inside each team repository.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Shared context preloaded once per run.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Cost estimates and alert threshold.
    #[serde(default)]
    pub cost: CostConfig,

    /// Alert delivery.
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Pipeline tuning knobs.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Teams processed by each run, in order.
    #[serde(default)]
    pub teams: Vec<TeamConfig>,
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// REST API base URL.
    #[serde(default = "default_github_api")]
    pub api_base_url: String,

    /// Name of the env var holding the token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,

    /// Prefix for the date-derived sync branch (`<prefix>/<YYYY-MM-DD>`).
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Labels attached to failure issues.
    #[serde(default = "default_issue_labels")]
    pub issue_labels: Vec<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_github_api(),
            token_env: default_github_token_env(),
            branch_prefix: default_branch_prefix(),
            issue_labels: default_issue_labels(),
        }
    }
}

fn default_github_api() -> String {
    "https://api.github.com".into()
}
fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_branch_prefix() -> String {
    "ledgersync".into()
}
fn default_issue_labels() -> Vec<String> {
    vec!["ledgersync".into(), "automation-failure".into()]
}

/// `[answering]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnsweringConfig {
    /// OpenAI-compatible API base URL.
    #[serde(default = "default_answering_api")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// USD per 1000 tokens, used for the usage report.
    #[serde(default = "default_price_per_1k")]
    pub price_per_1k_tokens: f64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AnsweringConfig {
    fn default() -> Self {
        Self {
            base_url: default_answering_api(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            price_per_1k_tokens: default_price_per_1k(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_answering_api() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_price_per_1k() -> f64 {
    0.002
}
fn default_timeout_secs() -> u64 {
    120
}

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the ledger document inside each team repository.
    #[serde(default = "default_ledger_path")]
    pub path: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> String {
    "docs/CROSS_TEAM_QUESTIONS.md".into()
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Alias under which the context is registered. Derived from the source
    /// list when unset.
    #[serde(default)]
    pub alias: Option<String>,

    /// Local files concatenated into the shared context.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// `[cost]` section. All values in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default = "default_answer_cost")]
    pub answer: f64,
    #[serde(default = "default_review_cost")]
    pub review: f64,
    #[serde(default = "default_check_updates_cost")]
    pub check_updates: f64,
    #[serde(default = "default_plan_cost")]
    pub plan: f64,
    #[serde(default = "default_readme_cost")]
    pub readme_audit: f64,

    /// Alert fires when the run total strictly exceeds this.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            answer: default_answer_cost(),
            review: default_review_cost(),
            check_updates: default_check_updates_cost(),
            plan: default_plan_cost(),
            readme_audit: default_readme_cost(),
            alert_threshold: default_alert_threshold(),
        }
    }
}

fn default_answer_cost() -> f64 {
    0.02
}
fn default_review_cost() -> f64 {
    0.01
}
fn default_check_updates_cost() -> f64 {
    0.01
}
fn default_plan_cost() -> f64 {
    0.02
}
fn default_readme_cost() -> f64 {
    0.01
}
fn default_alert_threshold() -> f64 {
    1.0
}

/// `[alerts]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Env var holding a chat webhook URL. Alerts go to the log when unset.
    #[serde(default)]
    pub webhook_url_env: Option<String>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Check-updates responses shorter than this are treated as "nothing new".
    #[serde(default = "default_min_update_len")]
    pub min_update_len: usize,

    /// Phrase whose presence in the README audit means the README is current.
    #[serde(default = "default_no_changes_phrase")]
    pub no_changes_phrase: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_update_len: default_min_update_len(),
            no_changes_phrase: default_no_changes_phrase(),
        }
    }
}

fn default_min_update_len() -> usize {
    100
}
fn default_no_changes_phrase() -> String {
    "no changes needed".into()
}

/// `[[teams]]` entry. One independent unit with its own repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Lowercase identifier used in the ledger's From/To lines.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch the sync branch is cut from and the PR targets.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_insights_path")]
    pub insights_path: String,
    #[serde(default = "default_updates_path")]
    pub updates_path: String,
    #[serde(default = "default_plan_path")]
    pub plan_path: String,
    #[serde(default = "default_readme_path")]
    pub readme_path: String,
    /// Overrides the `_Waiting for <ID> response_` placeholder.
    #[serde(default)]
    pub waiting_placeholder: Option<String>,
}

fn default_base_branch() -> String {
    "main".into()
}
fn default_insights_path() -> String {
    "docs/INSIGHTS.md".into()
}
fn default_updates_path() -> String {
    "docs/UPDATES.md".into()
}
fn default_plan_path() -> String {
    "docs/NEXT_SESSION.md".into()
}
fn default_readme_path() -> String {
    "README.md".into()
}

impl TeamConfig {
    /// Build a team config with default document paths.
    pub fn new(id: impl Into<String>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.to_uppercase(),
            id,
            owner: owner.into(),
            repo: repo.into(),
            base_branch: default_base_branch(),
            insights_path: default_insights_path(),
            updates_path: default_updates_path(),
            plan_path: default_plan_path(),
            readme_path: default_readme_path(),
            waiting_placeholder: None,
        }
    }

    /// The team's repository.
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.repo)
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Reject configs the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let id_ok = !self.id.is_empty()
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !id_ok {
            return Err(LedgerSyncError::validation(format!(
                "team id '{}' must be non-empty lowercase [a-z0-9_-]",
                self.id
            )));
        }
        if self.owner.is_empty() || self.repo.is_empty() {
            return Err(LedgerSyncError::validation(format!(
                "team '{}' has no repository configured",
                self.id
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ledgersync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LedgerSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ledgersync/ledgersync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LedgerSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        LedgerSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LedgerSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LedgerSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LedgerSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Structural checks that do not need the network.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    for (name, raw) in [
        ("github.api_base_url", &config.github.api_base_url),
        ("answering.base_url", &config.answering.base_url),
    ] {
        Url::parse(raw)
            .map_err(|e| LedgerSyncError::config(format!("{name} '{raw}' is not a URL: {e}")))?;
    }

    let mut seen = std::collections::HashSet::new();
    for team in &config.teams {
        team.validate()?;
        if !seen.insert(team.id.as_str()) {
            return Err(LedgerSyncError::config(format!(
                "team '{}' is configured twice",
                team.id
            )));
        }
    }
    Ok(())
}

/// Check that the credential env vars a live run needs are set and non-empty.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    for var_name in [&config.github.token_env, &config.answering.api_key_env] {
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => {}
            _ => {
                return Err(LedgerSyncError::config(format!(
                    "credential not found. Set the {var_name} environment variable."
                )));
            }
        }
    }
    Ok(())
}
