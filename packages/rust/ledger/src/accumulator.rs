//! Append-only derived documents (insights log, update digest).
//!
//! Each call appends one fenced, timestamped section. Prior sections are
//! never rewritten or removed, so the logs grow monotonically across runs.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

/// Header a new document is seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentTemplate {
    pub title: &'static str,
    pub preamble: &'static str,
}

impl DocumentTemplate {
    pub fn render(&self) -> String {
        format!("# {}\n\n{}\n", self.title, self.preamble)
    }
}

/// Insights extracted from answers to a team's own questions.
pub const INSIGHTS_TEMPLATE: DocumentTemplate = DocumentTemplate {
    title: "Cross-Team Insights",
    preamble: "Actionable insights distilled from answers other teams gave to our questions. \
               Maintained by ledgersync; append-only.",
};

/// Relevant upstream guidance changes.
pub const UPDATES_TEMPLATE: DocumentTemplate = DocumentTemplate {
    title: "Upstream Update Digest",
    preamble: "Changes in upstream guidance that may affect this team. \
               Maintained by ledgersync; append-only.",
};

static ENTRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^<!-- entry:(\S+) -->$").expect("entry regex"));

/// Builds one derived document from a template.
#[derive(Debug, Clone, Copy)]
pub struct DocumentAccumulator {
    template: DocumentTemplate,
}

impl DocumentAccumulator {
    pub fn new(template: DocumentTemplate) -> Self {
        Self { template }
    }

    pub fn insights() -> Self {
        Self::new(INSIGHTS_TEMPLATE)
    }

    pub fn updates() -> Self {
        Self::new(UPDATES_TEMPLATE)
    }

    /// Append a section stamped with the current time.
    pub fn append(&self, existing: Option<&str>, entry_id: &str, body: &str) -> String {
        self.append_at(existing, entry_id, body, Utc::now())
    }

    /// Append a section stamped with `at`. `existing = None` means the file
    /// does not exist yet and is seeded from the template.
    pub fn append_at(
        &self,
        existing: Option<&str>,
        entry_id: &str,
        body: &str,
        at: DateTime<Utc>,
    ) -> String {
        let mut doc = match existing {
            Some(content) => content.to_string(),
            None => self.template.render(),
        };

        if !doc.is_empty() && !doc.ends_with('\n') {
            doc.push('\n');
        }

        doc.push_str(&format!(
            "\n<!-- entry:{entry_id} -->\n## {entry_id} · {}\n\n{}\n\n<!-- /entry -->\n",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            body.trim(),
        ));
        doc
    }
}

/// Entry ids in document order.
pub fn entry_ids(content: &str) -> Vec<String> {
    ENTRY_RE
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Whether `content` already holds a section for `entry_id`.
pub fn has_entry(content: &str, entry_id: &str) -> bool {
    ENTRY_RE
        .captures_iter(content)
        .any(|caps| &caps[1] == entry_id)
}
