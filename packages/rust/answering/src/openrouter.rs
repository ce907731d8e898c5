//! Chat-completions client for OpenRouter (or any OpenAI-compatible API).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;

use ledgersync_shared::{AnsweringConfig, LedgerSyncError, Result, UsageStats};

use crate::{AnsweringService, ContextCache};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("ledgersync/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u64,
}

// ---------------------------------------------------------------------------
// Context cache
// ---------------------------------------------------------------------------

/// Alias for a source list: the configured alias, or a short sha256 of the
/// paths in order.
pub fn cache_alias(configured: Option<&str>, sources: &[String]) -> String {
    if let Some(alias) = configured {
        return alias.to_string();
    }
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(source.as_bytes());
        hasher.update(b"\n");
    }
    let digest = format!("{:x}", hasher.finalize());
    format!("ctx-{}", &digest[..16])
}

#[derive(Default)]
struct LoadedContext {
    alias: Option<String>,
    text: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenRouterClient
// ---------------------------------------------------------------------------

/// Answering client with a process-local context cache.
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    price_per_1k_tokens: f64,
    alias: Option<String>,
    context: Mutex<LoadedContext>,
    tokens_used: AtomicU64,
}

impl OpenRouterClient {
    pub fn new(config: &AnsweringConfig, api_key: impl Into<String>) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            LedgerSyncError::config(format!(
                "invalid answering base URL '{}': {e}",
                config.base_url
            ))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LedgerSyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base.as_str().trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
            price_per_1k_tokens: config.price_per_1k_tokens,
            alias: None,
            context: Mutex::new(LoadedContext::default()),
            tokens_used: AtomicU64::new(0),
        })
    }

    /// Register loaded context under a fixed alias instead of a derived one.
    pub fn with_cache_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// Alias of the currently loaded context.
    pub async fn loaded_alias(&self) -> Option<String> {
        self.context.lock().await.alias.clone()
    }
}

impl AnsweringService for OpenRouterClient {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn ask(&self, prompt: &str) -> Result<String> {
        let system = self.context.lock().await.text.clone();

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerSyncError::Network(format!("answering request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LedgerSyncError::Network(format!(
                "answering service returned HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LedgerSyncError::parse(format!("invalid completion response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            self.tokens_used
                .fetch_add(usage.total_tokens, Ordering::Relaxed);
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LedgerSyncError::Answering("completion had no content".into()))?;

        debug!(reply_len = content.len(), "answer received");
        Ok(content)
    }
}

impl ContextCache for OpenRouterClient {
    #[instrument(skip_all, fields(sources = sources.len()))]
    async fn ensure_loaded(&self, sources: &[String]) -> Result<()> {
        let alias = cache_alias(self.alias.as_deref(), sources);
        let mut context = self.context.lock().await;

        if context.alias.as_deref() == Some(alias.as_str()) {
            debug!(alias = %alias, "context already loaded");
            return Ok(());
        }

        let mut text = String::new();
        for source in sources {
            let content = tokio::fs::read_to_string(source)
                .await
                .map_err(|e| LedgerSyncError::io(source, e))?;
            text.push_str(&format!("## {source}\n\n{}\n\n", content.trim_end()));
        }

        info!(alias = %alias, bytes = text.len(), "context loaded");
        context.alias = Some(alias);
        context.text = (!text.is_empty()).then_some(text);
        Ok(())
    }

    async fn usage_stats(&self) -> Result<UsageStats> {
        let tokens_used = self.tokens_used.load(Ordering::Relaxed);
        Ok(UsageStats {
            cost: tokens_used as f64 / 1000.0 * self.price_per_1k_tokens,
            tokens_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> AnsweringConfig {
        AnsweringConfig {
            base_url: base.to_string(),
            model: "test/model".into(),
            price_per_1k_tokens: 0.5,
            ..AnsweringConfig::default()
        }
    }

    fn completion(text: &str, tokens: u64) -> serde_json::Value {
        json!({
            "choices": [{ "message": { "role": "assistant", "content": text } }],
            "usage": { "total_tokens": tokens },
        })
    }

    #[tokio::test]
    async fn ask_returns_first_choice_and_counts_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test/model",
                "messages": [{ "role": "user", "content": "Partition key?" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("By date.", 2000)))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config(&server.uri()), "sk-test").unwrap();
        assert_eq!(client.ask("Partition key?").await.unwrap(), "By date.");

        let usage = client.usage_stats().await.unwrap();
        assert_eq!(usage.tokens_used, 2000);
        assert!((usage.cost - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn non_success_is_network_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config(&server.uri()), "k").unwrap();
        let err = client.ask("hi").await.unwrap_err();
        assert_eq!(err.kind(), ledgersync_shared::ErrorKind::Network);
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn missing_content_is_answering_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config(&server.uri()), "k").unwrap();
        let err = client.ask("hi").await.unwrap_err();
        assert_eq!(err.kind(), ledgersync_shared::ErrorKind::Answering);
    }

    #[tokio::test]
    async fn loaded_context_is_sent_as_system_message() {
        let dir = std::env::temp_dir().join(format!("ledgersync-ctx-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("ARCHITECTURE.md");
        std::fs::write(&source, "Events are partitioned by day.\n").unwrap();
        let sources = vec![source.to_string_lossy().into_owned()];

        let server = MockServer::start().await;
        let expected_system = format!("## {}\n\nEvents are partitioned by day.\n\n", sources[0]);
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "messages": [
                    { "role": "system", "content": expected_system },
                    { "role": "user", "content": "q" },
                ],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("a", 10)))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(&config(&server.uri()), "k")
            .unwrap()
            .with_cache_alias(Some("team-docs".into()));
        client.ensure_loaded(&sources).await.unwrap();
        assert_eq!(client.loaded_alias().await.as_deref(), Some("team-docs"));

        // Second load with the same alias is a no-op even if the file is gone.
        std::fs::remove_file(&source).unwrap();
        client.ensure_loaded(&sources).await.unwrap();

        assert_eq!(client.ask("q").await.unwrap(), "a");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_source_is_io_error() {
        let client = OpenRouterClient::new(&config("http://localhost:1"), "k").unwrap();
        let err = client
            .ensure_loaded(&["/nonexistent/ledgersync/ctx.md".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ledgersync_shared::ErrorKind::Io);
        assert_eq!(client.loaded_alias().await, None);
    }

    #[test]
    fn derived_alias_depends_on_sources() {
        let a = cache_alias(None, &["a.md".into()]);
        let b = cache_alias(None, &["b.md".into()]);
        assert_ne!(a, b);
        assert!(a.starts_with("ctx-"));
        assert_eq!(a, cache_alias(None, &["a.md".into()]));
        assert_eq!(cache_alias(Some("fixed"), &["a.md".into()]), "fixed");
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let client = OpenRouterClient::new(&config("https://openrouter.ai/api/v1/"), "k").unwrap();
        assert_eq!(client.endpoint, "https://openrouter.ai/api/v1/chat/completions");
    }
}
