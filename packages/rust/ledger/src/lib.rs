//! Ledger document handling: parse the cross-team question ledger, answer a
//! single entry in place, and grow the append-only logs derived from it.

mod accumulator;
mod mutator;
mod parser;

pub use accumulator::{
    DocumentAccumulator, DocumentTemplate, INSIGHTS_TEMPLATE, UPDATES_TEMPLATE, entry_ids,
    has_entry,
};
pub use mutator::{AnswerMutation, apply};
pub use parser::{
    ParseOptions, Question, QuestionStatus, awaiting_review, inbox, parse, parse_with,
    waiting_placeholder,
};
