//! Error types for ledgersync.
//!
//! Library crates use [`LedgerSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Every collaborator call returns [`Result`], so callers always get either a
//! value or an error whose [`ErrorKind`] says which failure class it belongs to.

use std::path::PathBuf;

/// Top-level error type for all ledgersync operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A collaborator (VCS host, answering service, alert sink) answered with
    /// a non-success status or could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The requested file or ref does not exist on the VCS host.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed response or document content.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad team config, empty input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The answering service returned something unusable.
    #[error("answering error: {0}")]
    Answering(String),

    /// One of the object-graph commit steps failed. The branch ref was not moved.
    #[error("commit construction failed at {step}: {message}")]
    CommitConstruction { step: String, message: String },

    /// A foundational failure that aborts the remaining phases for one team.
    #[error("{phase} phase aborted: {message}")]
    PhaseFatal { phase: String, message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LedgerSyncError>;

/// Discriminant of a [`LedgerSyncError`], for callers that branch on the
/// failure class rather than the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Network,
    NotFound,
    Parse,
    Io,
    Validation,
    Answering,
    CommitConstruction,
    PhaseFatal,
}

impl LedgerSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a commit-construction error for the named step.
    pub fn commit(step: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::CommitConstruction {
            step: step.to_string(),
            message: msg.into(),
        }
    }

    /// Create a phase-fatal error for the named phase.
    pub fn phase_fatal(phase: impl std::fmt::Display, msg: impl Into<String>) -> Self {
        Self::PhaseFatal {
            phase: phase.to_string(),
            message: msg.into(),
        }
    }

    /// The failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Network(_) => ErrorKind::Network,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Io { .. } => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Answering(_) => ErrorKind::Answering,
            Self::CommitConstruction { .. } => ErrorKind::CommitConstruction,
            Self::PhaseFatal { .. } => ErrorKind::PhaseFatal,
        }
    }

    /// True when the VCS host reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
