//! Test doubles shared by the pipeline and coordinator tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, TimeZone, Utc};

use ledgersync_answering::{AnsweringService, ContextCache};
use ledgersync_github::memory::MemoryHost;
use ledgersync_shared::{LedgerSyncError, Result, TeamConfig, UsageStats};

use crate::alert::AlertSink;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 6, 0, 0).unwrap()
}

pub fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("../../../fixtures/ledger/{name}")).expect("read ledger fixture")
}

/// Team `id` with its own repository `acme/<id>`, seeded on `main`.
pub fn seed_team(host: &MemoryHost, id: &str, files: &[(&str, &str)]) -> TeamConfig {
    let team = TeamConfig::new(id, "acme", id);
    host.seed(&team.repo_ref(), &team.base_branch, files);
    team
}

enum Rule {
    Reply(String, String),
    Fail(String),
}

/// Answers by prompt content: the first matching rule wins, otherwise a
/// canned reply that keeps the README current and reports no upstream news.
pub struct ScriptedAnswers {
    rules: Vec<Rule>,
    calls: AtomicUsize,
}

impl ScriptedAnswers {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn reply_when(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push(Rule::Reply(needle.into(), reply.into()));
        self
    }

    pub fn fail_when(mut self, needle: &str) -> Self {
        self.rules.push(Rule::Fail(needle.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl AnsweringService for ScriptedAnswers {
    async fn ask(&self, prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        for rule in &self.rules {
            match rule {
                Rule::Reply(needle, reply) if prompt.contains(needle.as_str()) => {
                    return Ok(reply.clone());
                }
                Rule::Fail(needle) if prompt.contains(needle.as_str()) => {
                    return Err(LedgerSyncError::Network("scripted failure".into()));
                }
                _ => {}
            }
        }
        if prompt.contains("Audit the README") {
            Ok("No changes needed.".into())
        } else if prompt.contains("upstream documentation") {
            Ok("nothing relevant".into())
        } else {
            Ok(format!("answer: reply #{n}"))
        }
    }
}

/// Counts loads and reports fixed usage.
#[derive(Default)]
pub struct FakeCache {
    loads: AtomicUsize,
    fail: bool,
}

impl FakeCache {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ContextCache for FakeCache {
    async fn ensure_loaded(&self, _sources: &[String]) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LedgerSyncError::Network("cache unavailable".into()));
        }
        Ok(())
    }

    async fn usage_stats(&self) -> Result<UsageStats> {
        if self.fail {
            return Err(LedgerSyncError::Network("cache unavailable".into()));
        }
        Ok(UsageStats {
            cost: 0.25,
            tokens_used: 1234,
        })
    }
}

/// Records every alert message.
#[derive(Default)]
pub struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingAlerts {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    async fn notify(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(LedgerSyncError::Network("webhook down".into()));
        }
        Ok(())
    }
}
