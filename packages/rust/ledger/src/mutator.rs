//! In-place answer application for a single ledger entry.
//!
//! Only the block whose header id matches is touched. Inside it, the Answer
//! line's waiting placeholder is replaced with the answer text plus an
//! `_Answered by <team> on <date>_` annotation, and a Status value starting
//! with the 🟡 glyph becomes `🟢 Answered`. Every byte outside that block is copied through.
//!
//! A second application with the same id changes nothing: the placeholder the
//! edit anchors on is gone after the first one.

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::parser::{LABEL_RE, QuestionStatus, split_blocks, waiting_placeholder};

/// One answer to write into the ledger.
#[derive(Debug, Clone)]
pub struct AnswerMutation<'a> {
    id: &'a str,
    answer: &'a str,
    answered_by: &'a str,
    answered_on: NaiveDate,
    placeholder: Option<&'a str>,
}

impl<'a> AnswerMutation<'a> {
    /// Answer question `id` as team `answered_by`, dated today (UTC).
    pub fn new(id: &'a str, answer: &'a str, answered_by: &'a str) -> Self {
        Self {
            id,
            answer,
            answered_by,
            answered_on: Utc::now().date_naive(),
            placeholder: None,
        }
    }

    /// Date written into the annotation.
    pub fn on(mut self, date: NaiveDate) -> Self {
        self.answered_on = date;
        self
    }

    /// Anchor on a custom placeholder instead of `_Waiting for <TEAM> response_`.
    pub fn placeholder(mut self, placeholder: &'a str) -> Self {
        self.placeholder = Some(placeholder);
        self
    }

    /// Apply to `markdown`. Returns the input unchanged when the block is
    /// missing or no longer carries the placeholder.
    pub fn apply(&self, markdown: &str) -> String {
        let Some(block) = split_blocks(markdown).into_iter().find(|b| b.id == self.id) else {
            debug!(id = self.id, "no ledger block with this id");
            return markdown.to_string();
        };

        let text = &markdown[block.start..block.end];
        let Some(rewritten) = self.rewrite_block(text) else {
            debug!(id = self.id, "answer placeholder not found, leaving block as is");
            return markdown.to_string();
        };

        let mut out = String::with_capacity(markdown.len() + self.answer.len() + 64);
        out.push_str(&markdown[..block.start]);
        out.push_str(&rewritten);
        out.push_str(&markdown[block.end..]);
        out
    }

    fn rewrite_block(&self, text: &str) -> Option<String> {
        let placeholder = match self.placeholder {
            Some(p) => p.to_string(),
            None => waiting_placeholder(&asked_to(text)?),
        };

        let is_waiting_answer = |line: &str| {
            LABEL_RE
                .captures(line)
                .is_some_and(|caps| &caps[1] == "Answer" && caps[2] == *placeholder)
        };

        if !text.split_inclusive('\n').any(|l| is_waiting_answer(trim_eol(l))) {
            return None;
        }

        let mut out = String::with_capacity(text.len() + self.answer.len() + 64);
        let mut answered = false;

        for line in text.split_inclusive('\n') {
            let content = trim_eol(line);
            let eol = &line[content.len()..];

            if !answered && is_waiting_answer(content) {
                answered = true;
                out.push_str(&format!(
                    "**Answer:** {}\n\n_Answered by {} on {}_",
                    sanitize_answer(self.answer),
                    self.answered_by,
                    self.answered_on.format("%Y-%m-%d"),
                ));
                out.push_str(eol);
                continue;
            }

            if let Some(flipped) = flip_status(content) {
                out.push_str(&flipped);
                out.push_str(eol);
                continue;
            }

            out.push_str(line);
        }

        Some(out)
    }
}

/// Apply `answer` to question `id`, annotated as answered by `answered_by` today.
pub fn apply(markdown: &str, id: &str, answer: &str, answered_by: &str) -> String {
    AnswerMutation::new(id, answer, answered_by).apply(markdown)
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

/// The To team of a block, read the same way the parser does.
fn asked_to(block: &str) -> Option<String> {
    crate::parser::parse(block).into_iter().next().map(|q| q.asked_to)
}

fn flip_status(line: &str) -> Option<String> {
    let caps = LABEL_RE.captures(line)?;
    if &caps[1] != "Status" {
        return None;
    }
    let value = caps.get(2)?;
    if !value.as_str().starts_with(QuestionStatus::Open.glyph()) {
        return None;
    }
    Some(format!("{}{}", &line[..value.start()], QuestionStatus::Answered))
}

/// Escape answer lines that the parser would otherwise read as structure
/// (entry headers, labeled lines, block rules).
fn sanitize_answer(answer: &str) -> String {
    answer
        .trim()
        .lines()
        .map(|line| {
            let trimmed = line.trim();
            if trimmed.starts_with("###")
                || trimmed == "---"
                || trimmed.starts_with("**From:**")
                || LABEL_RE.is_match(trimmed)
            {
                format!("\\{trimmed}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const SCENARIO: &str = "### [Q-001] Partition key?\n\
**From:** nexus → **To:** de\n\
**Status:** 🟡 Open\n\
**Question:** How is the events table partitioned?\n\
**Answer:** _Waiting for DE response_\n";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("../../../fixtures/ledger/{name}"))
            .expect("read ledger fixture")
    }

    #[test]
    fn answers_and_flips_status() {
        let out = AnswerMutation::new("Q-001", "By event_date.", "de")
            .on(date())
            .apply(SCENARIO);

        assert!(out.contains("**Status:** 🟢 Answered"));
        assert!(out.contains("**Answer:** By event_date.\n\n_Answered by de on 2026-10-19_\n"));

        let q = &parse(&out)[0];
        assert_eq!(q.status, QuestionStatus::Answered);
        assert_eq!(q.answer_body.as_deref(), Some("By event_date."));
        assert_eq!(q.answered_by.as_deref(), Some("de"));
        assert_eq!(q.answered_at, Some(date()));
    }

    #[test]
    fn other_blocks_are_byte_identical() {
        let ledger = fixture("basic.md");
        let out = AnswerMutation::new("Q-001", "X", "de").on(date()).apply(&ledger);

        let header_2 = ledger.find("### [Q-002]").unwrap();
        let out_header_2 = out.find("### [Q-002]").unwrap();
        assert_eq!(&ledger[header_2..], &out[out_header_2..]);

        let header_1 = ledger.find("### [Q-001]").unwrap();
        assert_eq!(&ledger[..header_1], &out[..header_1]);

        let q = parse(&out).into_iter().find(|q| q.id == "Q-001").unwrap();
        assert_eq!(q.answer_body.as_deref(), Some("X"));
        assert_eq!(q.status, QuestionStatus::Answered);
    }

    #[test]
    fn second_application_is_a_no_op() {
        let once = apply(SCENARIO, "Q-001", "first", "de");
        let twice = apply(&once, "Q-001", "second", "de");
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_id_is_a_no_op() {
        assert_eq!(apply(SCENARIO, "Q-999", "x", "de"), SCENARIO);
    }

    #[test]
    fn only_blocks_with_placeholder_are_rewritten() {
        let ledger = fixture("basic.md");
        // Q-003 still waits for PLATFORM; Q-002 was answered long ago.
        let out = apply(&ledger, "Q-003", "dropped", "platform");
        assert_ne!(out, ledger);
        assert_eq!(apply(&ledger, "Q-002", "again", "nexus"), ledger);
    }

    #[test]
    fn blocked_status_is_left_alone() {
        let ledger = fixture("basic.md");
        let out = AnswerMutation::new("Q-003", "Answer", "platform")
            .on(date())
            .apply(&ledger);
        let q = parse(&out).into_iter().find(|q| q.id == "Q-003").unwrap();
        assert_eq!(q.status, QuestionStatus::Blocked);
        assert_eq!(q.answer_body.as_deref(), Some("Answer"));
    }

    #[test]
    fn dollar_signs_survive() {
        let out = apply(SCENARIO, "Q-001", "costs $1 per $2", "de");
        assert!(out.contains("costs $1 per $2"));
    }

    #[test]
    fn structural_lines_in_answer_are_escaped() {
        let answer = "Intro\n### [Q-900] fake\n**Status:** 🟢 Answered\n---\nOutro";
        let out = apply(SCENARIO, "Q-001", answer, "de");
        let questions = parse(&out);
        assert_eq!(questions.len(), 1);
        let body = questions[0].answer_body.as_deref().unwrap();
        assert!(body.starts_with("Intro"));
        assert!(body.ends_with("Outro"));
    }

    #[test]
    fn custom_placeholder() {
        let md = "### [Q-4] T\n**From:** a → **To:** de\n**Status:** 🟡 Open\n**Answer:** _pending_\n";
        assert_eq!(apply(md, "Q-4", "x", "de"), md);

        let out = AnswerMutation::new("Q-4", "x", "de")
            .placeholder("_pending_")
            .apply(md);
        assert!(out.contains("🟢 Answered"));
    }

    #[test]
    fn status_is_matched_by_glyph() {
        let md = SCENARIO.replace("🟡 Open", "🟡Open");
        assert_eq!(parse(&md)[0].status, QuestionStatus::Open);

        let out = AnswerMutation::new("Q-001", "x", "de").on(date()).apply(&md);
        assert!(out.contains("**Status:** 🟢 Answered\n"));
        let q = &parse(&out)[0];
        assert_eq!(q.status, QuestionStatus::Answered);
        assert_eq!(q.answer_body.as_deref(), Some("x"));
    }

    #[test]
    fn crlf_line_endings_are_preserved() {
        let md = SCENARIO.replace('\n', "\r\n");
        let out = AnswerMutation::new("Q-001", "yes", "de").on(date()).apply(&md);
        assert!(out.contains("**Status:** 🟢 Answered\r\n"));
        assert!(out.contains("_Answered by de on 2026-10-19_\r\n"));
    }
}
