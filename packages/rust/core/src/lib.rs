//! Run orchestration for ledgersync.
//!
//! [`TeamPipeline`] runs the five phases for one team and returns its pending
//! edits; [`RunCoordinator`] runs every team in sequence, commits the edits,
//! raises cost alerts and opens the run's pull request and failure issues.

pub mod alert;
pub mod coordinator;
pub mod cost;
pub mod pipeline;
pub mod prompts;
pub mod report;

#[cfg(test)]
mod testing;

pub use alert::{AlertSink, LogAlert, WebhookAlert};
pub use coordinator::RunCoordinator;
pub use cost::{CostTable, Operation};
pub use pipeline::{Phase, ProgressReporter, SilentProgress, TeamFailure, TeamPipeline, TeamRun};
pub use report::{render_failure_issue, render_summary_markdown};
