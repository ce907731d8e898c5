//! External answering service and shared context cache.
//!
//! The pipeline talks to a language model through [`AnsweringService`] and
//! preloads shared context through [`ContextCache`]. [`OpenRouterClient`]
//! implements both against an OpenAI-compatible chat completions API.

mod openrouter;

use std::future::Future;

use ledgersync_shared::{Result, UsageStats};

pub use openrouter::{OpenRouterClient, cache_alias};

/// Free-text question answering.
pub trait AnsweringService: Send + Sync {
    /// Send one prompt and return the model's reply. The text is returned
    /// as-is; callers do not rely on any structure in it.
    fn ask(&self, prompt: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Shared context loaded once per run and reused by every prompt.
pub trait ContextCache: Send + Sync {
    /// Load `sources` unless the same set is already loaded.
    fn ensure_loaded(&self, sources: &[String]) -> impl Future<Output = Result<()>> + Send;

    /// Tokens consumed so far and their cost.
    fn usage_stats(&self) -> impl Future<Output = Result<UsageStats>> + Send;
}
