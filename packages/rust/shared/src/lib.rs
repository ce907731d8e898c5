//! Shared types, error model, and configuration for ledgersync.
//!
//! This crate is the foundation depended on by all other ledgersync crates.
//! It provides:
//! - [`LedgerSyncError`]: the unified error type
//! - Domain types ([`PendingEdits`], [`TeamResult`], [`RunSummary`], [`RepoRef`])
//! - Configuration ([`AppConfig`], [`TeamConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AlertsConfig, AnsweringConfig, AppConfig, CacheConfig, CostConfig, GitHubConfig,
    LedgerConfig, PipelineConfig, TeamConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, validate_config, validate_credentials,
};
pub use error::{ErrorKind, LedgerSyncError, Result};
pub use types::{
    CommitOutcome, CommitRecord, PendingEdits, RepoRef, RunId, RunSummary, TeamResult,
    UsageStats,
};
