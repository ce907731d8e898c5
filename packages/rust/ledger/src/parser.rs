//! Ledger format parser.
//!
//! The ledger is a Markdown document made of entry blocks:
//! - Header: `### [Q-001] Title`
//! - `**From:** nexus → **To:** de` (two lowercase team ids, `→` or `->`)
//! - `**Status:** 🟡 Open` (🟡 Open, 🟢 Answered, ✅ Closed, 🔴 Blocked)
//! - `**Question:** ...`, optional `**Context:** ...`, `**Answer:** ...`
//!
//! Labeled lines may appear in any order. Question, Context and Answer values
//! continue onto following lines until the next labeled line or a `---` rule.
//! Blocks without a From/To line are dropped without an error: half-written
//! entries are normal while people edit the ledger.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Open,
    Answered,
    Closed,
    Blocked,
}

impl QuestionStatus {
    /// The emoji written on the Status line.
    pub fn glyph(&self) -> &'static str {
        match self {
            Self::Open => "🟡",
            Self::Answered => "🟢",
            Self::Closed => "✅",
            Self::Blocked => "🔴",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Answered => "Answered",
            Self::Closed => "Closed",
            Self::Blocked => "Blocked",
        }
    }

    fn from_glyph(glyph: &str) -> Option<Self> {
        match glyph {
            "🟡" => Some(Self::Open),
            "🟢" => Some(Self::Answered),
            "✅" => Some(Self::Closed),
            "🔴" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.glyph(), self.label())
    }
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// `Q-<digits>` from the header, `Q-000` when the header has no digits.
    pub id: String,
    pub asked_by: String,
    pub asked_to: String,
    pub status: QuestionStatus,
    pub title: String,
    pub body: String,
    pub context: Option<String>,
    /// `None` while the Answer line still holds the waiting placeholder.
    pub answer_body: Option<String>,
    pub answered_by: Option<String>,
    pub answered_at: Option<NaiveDate>,
}

impl Question {
    /// Open and still waiting for an answer.
    pub fn is_awaiting_answer(&self) -> bool {
        self.status == QuestionStatus::Open && self.answer_body.is_none()
    }
}

/// Per-team overrides for the waiting placeholder.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    placeholders: HashMap<String, String>,
}

impl ParseOptions {
    /// Use `placeholder` instead of the default for questions asked to `team`.
    pub fn with_placeholder(mut self, team: impl Into<String>, placeholder: impl Into<String>) -> Self {
        self.placeholders.insert(team.into(), placeholder.into());
        self
    }

    /// The placeholder an unanswered question to `team` carries.
    pub fn placeholder_for(&self, team: &str) -> String {
        self.placeholders
            .get(team)
            .cloned()
            .unwrap_or_else(|| waiting_placeholder(team))
    }
}

/// Default Answer-line placeholder for questions asked to `team`.
pub fn waiting_placeholder(team: &str) -> String {
    format!("_Waiting for {} response_", team.to_uppercase())
}

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches `### [Q-001] Title`.
static HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^###\s+\[([^\]]*)\]\s*(.*?)\s*$").expect("header regex"));

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digits regex"));

/// Matches `**From:** a → **To:** b`.
static FROM_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*From:\*\*\s*([a-z0-9_-]+)\s*(?:→|->)\s*\*\*To:\*\*\s*([a-z0-9_-]+)\s*$")
        .expect("from/to regex")
});

/// Matches the single-label lines.
pub(crate) static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*(Status|Question|Context|Answer):\*\*\s*(.*?)\s*$").expect("label regex")
});

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(🟡|🟢|✅|🔴)").expect("status regex"));

/// Matches the annotation the mutator appends under an answer.
pub(crate) static ANSWERED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^_Answered by ([a-z0-9_-]+) on (\d{4}-\d{2}-\d{2})_[ \t]*$")
        .expect("answered regex")
});

// ---------------------------------------------------------------------------
// Block splitting
// ---------------------------------------------------------------------------

/// A header-delimited slice of the ledger.
#[derive(Debug, Clone)]
pub(crate) struct Block<'a> {
    pub id: String,
    pub title: &'a str,
    /// Byte offset of the header line.
    pub start: usize,
    /// Byte offset one past the block (next header or end of document).
    pub end: usize,
}

/// Split `markdown` at every entry header. Text before the first header
/// belongs to no block.
pub(crate) fn split_blocks(markdown: &str) -> Vec<Block<'_>> {
    let mut blocks: Vec<Block<'_>> = Vec::new();
    let mut offset = 0;

    for line in markdown.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if let Some(caps) = HEADER_RE.captures(content) {
            if let Some(prev) = blocks.last_mut() {
                prev.end = offset;
            }
            blocks.push(Block {
                id: normalize_id(caps.get(1).map_or("", |m| m.as_str())),
                title: caps.get(2).map_or("", |m| m.as_str()),
                start: offset,
                end: markdown.len(),
            });
        }
        offset += line.len();
    }

    blocks
}

/// `Q-<first digit run>`, or `Q-000` when the bracket holds no digits.
fn normalize_id(raw: &str) -> String {
    match DIGITS_RE.find(raw) {
        Some(m) => format!("Q-{}", m.as_str()),
        None => "Q-000".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a ledger into its well-formed questions, in document order.
pub fn parse(markdown: &str) -> Vec<Question> {
    parse_with(markdown, &ParseOptions::default())
}

/// [`parse`] with per-team placeholder overrides.
pub fn parse_with(markdown: &str, opts: &ParseOptions) -> Vec<Question> {
    split_blocks(markdown)
        .iter()
        .filter_map(|block| parse_block(&markdown[block.start..block.end], block, opts))
        .collect()
}

#[derive(Clone, Copy)]
enum Field {
    Question,
    Context,
    Answer,
}

#[derive(Default)]
struct RawFields {
    asked: Option<(String, String)>,
    status: Option<String>,
    question: Option<String>,
    context: Option<String>,
    answer: Option<String>,
}

impl RawFields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Question => &mut self.question,
            Field::Context => &mut self.context,
            Field::Answer => &mut self.answer,
        }
    }
}

fn parse_block(text: &str, block: &Block<'_>, opts: &ParseOptions) -> Option<Question> {
    let mut raw = RawFields::default();
    let mut current: Option<Field> = None;

    for line in text.lines().skip(1) {
        let line = line.trim_end();

        if line.trim() == "---" {
            current = None;
            continue;
        }

        if let Some(caps) = FROM_TO_RE.captures(line) {
            raw.asked = Some((caps[1].to_string(), caps[2].to_string()));
            current = None;
            continue;
        }

        if line.starts_with("**From:**") {
            // Present but unparseable; must not leak into a continuation.
            current = None;
            continue;
        }

        if let Some(caps) = LABEL_RE.captures(line) {
            let value = caps[2].to_string();
            let field = match &caps[1] {
                "Status" => {
                    raw.status = Some(value);
                    current = None;
                    continue;
                }
                "Question" => Field::Question,
                "Context" => Field::Context,
                _ => Field::Answer,
            };
            *raw.slot(field) = Some(value);
            current = Some(field);
            continue;
        }

        if let Some(field) = current {
            if let Some(value) = raw.slot(field) {
                value.push('\n');
                value.push_str(line);
            }
        }
    }

    let Some((asked_by, asked_to)) = raw.asked else {
        debug!(id = %block.id, "skipping ledger block without From/To line");
        return None;
    };

    let status = raw
        .status
        .as_deref()
        .and_then(|s| STATUS_RE.captures(s))
        .and_then(|caps| QuestionStatus::from_glyph(&caps[1]))
        .unwrap_or(QuestionStatus::Open);

    let placeholder = opts.placeholder_for(&asked_to);
    let (answer_body, answered_by, answered_at) = match raw.answer {
        Some(answer) => split_answer(&answer, &placeholder),
        None => (None, None, None),
    };

    Some(Question {
        id: block.id.clone(),
        asked_by,
        asked_to,
        status,
        title: block.title.to_string(),
        body: raw.question.map(|q| q.trim().to_string()).unwrap_or_default(),
        context: raw
            .context
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()),
        answer_body,
        answered_by,
        answered_at,
    })
}

/// Separate the answered-by annotation from the answer text and map the
/// waiting placeholder to `None`.
fn split_answer(
    answer: &str,
    placeholder: &str,
) -> (Option<String>, Option<String>, Option<NaiveDate>) {
    let (by, at) = match ANSWERED_RE.captures(answer) {
        Some(caps) => (
            Some(caps[1].to_string()),
            NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").ok(),
        ),
        None => (None, None),
    };

    let text = ANSWERED_RE.replace(answer, "");
    let text = text.trim();

    if text.is_empty() || text == placeholder {
        (None, by, at)
    } else {
        (Some(text.to_string()), by, at)
    }
}

// ---------------------------------------------------------------------------
// Selection helpers
// ---------------------------------------------------------------------------

/// Open questions addressed to `team` that still wait for an answer.
pub fn inbox<'a>(questions: &'a [Question], team: &str) -> Vec<&'a Question> {
    questions
        .iter()
        .filter(|q| q.asked_to == team && q.is_awaiting_answer())
        .collect()
}

/// Answered questions that `team` asked. An Answered status over a
/// placeholder answer does not count.
pub fn awaiting_review<'a>(questions: &'a [Question], team: &str) -> Vec<&'a Question> {
    questions
        .iter()
        .filter(|q| {
            q.asked_by == team && q.status == QuestionStatus::Answered && q.answer_body.is_some()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/ledger/{name}"))
            .expect("read ledger fixture")
    }

    #[test]
    fn parses_all_statuses() {
        let questions = parse(&fixture("basic.md"));
        let ids: Vec<_> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["Q-001", "Q-002", "Q-003", "Q-004"]);

        let statuses: Vec<_> = questions.iter().map(|q| q.status).collect();
        assert_eq!(
            statuses,
            vec![
                QuestionStatus::Open,
                QuestionStatus::Answered,
                QuestionStatus::Blocked,
                QuestionStatus::Closed,
            ]
        );
    }

    #[test]
    fn reads_fields_of_open_question() {
        let questions = parse(&fixture("basic.md"));
        let q = &questions[0];
        assert_eq!(q.asked_by, "nexus");
        assert_eq!(q.asked_to, "de");
        assert_eq!(q.title, "Which partition key does the events table use?");
        assert_eq!(
            q.body,
            "We are planning the backfill job and need to know how the\nevents table is partitioned."
        );
        assert_eq!(
            q.context.as_deref(),
            Some("Backfill covers 2024-01 through 2024-06.")
        );
        assert_eq!(q.answer_body, None);
        assert!(q.is_awaiting_answer());
    }

    #[test]
    fn reads_answer_annotation() {
        let questions = parse(&fixture("basic.md"));
        let q = &questions[1];
        assert_eq!(
            q.answer_body.as_deref(),
            Some("Yes, 50 requests per second per tenant. Batch endpoints count once per batch.")
        );
        assert_eq!(q.answered_by.as_deref(), Some("nexus"));
        assert_eq!(q.answered_at, NaiveDate::from_ymd_opt(2026, 9, 30));
    }

    #[test]
    fn drops_malformed_blocks_silently() {
        // 3 well-formed blocks (Q-010, Q-013, the id-less draft) and 3 malformed ones.
        let questions = parse(&fixture("malformed.md"));
        let ids: Vec<_> = questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["Q-010", "Q-013", "Q-000"]);
    }

    #[test]
    fn labeled_lines_in_any_order() {
        let questions = parse(&fixture("malformed.md"));
        let q = questions.iter().find(|q| q.id == "Q-013").unwrap();
        assert_eq!(q.asked_by, "nexus");
        assert_eq!(q.asked_to, "platform");
        assert_eq!(q.body, "Lines in a different order.");
        assert_eq!(q.answer_body, None);
    }

    #[test]
    fn header_without_digits_falls_back_to_000() {
        // Known edge case: the fallback is a fixed placeholder, not the
        // block's position in the document.
        let md = "### [Draft] A\n**From:** a → **To:** b\n\n### [Q-] B\n**From:** a → **To:** b\n";
        let questions = parse(md);
        assert_eq!(questions.len(), 2);
        assert!(questions.iter().all(|q| q.id == "Q-000"));
    }

    #[test]
    fn placeholder_is_team_specific() {
        // A placeholder naming another team is a real answer.
        let md = "### [Q-7] T\n**From:** a → **To:** de\n**Answer:** _Waiting for NEXUS response_\n";
        let q = &parse(md)[0];
        assert_eq!(q.answer_body.as_deref(), Some("_Waiting for NEXUS response_"));
    }

    #[test]
    fn placeholder_means_unanswered_regardless_of_status() {
        let md = "### [Q-8] T\n**From:** a → **To:** de\n**Status:** 🟢 Answered\n**Answer:** _Waiting for DE response_\n";
        let q = &parse(md)[0];
        assert_eq!(q.status, QuestionStatus::Answered);
        assert_eq!(q.answer_body, None);
    }

    #[test]
    fn placeholder_override() {
        let md = "### [Q-9] T\n**From:** a → **To:** de\n**Answer:** _pending_\n";
        let opts = ParseOptions::default().with_placeholder("de", "_pending_");
        assert_eq!(parse_with(md, &opts)[0].answer_body, None);
        assert_eq!(parse(md)[0].answer_body.as_deref(), Some("_pending_"));
    }

    #[test]
    fn missing_status_defaults_to_open() {
        let md = "### [Q-5] T\n**From:** a → **To:** b\n**Question:** q\n";
        assert_eq!(parse(md)[0].status, QuestionStatus::Open);
    }

    #[test]
    fn selection_helpers() {
        let questions = parse(&fixture("basic.md"));

        let de_inbox: Vec<_> = inbox(&questions, "de").iter().map(|q| q.id.clone()).collect();
        assert_eq!(de_inbox, vec!["Q-001"]);

        // Q-003 is addressed to platform but blocked.
        assert!(inbox(&questions, "platform").is_empty());

        let de_review: Vec<_> = awaiting_review(&questions, "de")
            .iter()
            .map(|q| q.id.clone())
            .collect();
        assert_eq!(de_review, vec!["Q-002"]);
    }

    #[test]
    fn answered_status_with_placeholder_is_not_reviewable() {
        let md = "### [Q-5] T\n**From:** de → **To:** nexus\n**Status:** 🟢 Answered\n**Answer:** _Waiting for NEXUS response_\n";
        let questions = parse(md);
        assert_eq!(questions[0].status, QuestionStatus::Answered);
        assert!(awaiting_review(&questions, "de").is_empty());
    }

    #[test]
    fn status_line_ends_continuation() {
        let md = "### [Q-6] T\n**From:** a → **To:** b\n**Question:** first\nsecond\n**Status:** 🔴 Blocked\nstray\n";
        let q = &parse(md)[0];
        assert_eq!(q.body, "first\nsecond");
        assert_eq!(q.status, QuestionStatus::Blocked);
    }

    #[test]
    fn empty_document() {
        assert!(parse("").is_empty());
        assert!(parse("# Cross-Team Questions\n\nNothing yet.\n").is_empty());
    }
}
