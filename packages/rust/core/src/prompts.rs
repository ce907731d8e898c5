//! Prompt text for each pipeline phase.

use ledgersync_ledger::Question;
use ledgersync_shared::TeamConfig;

/// Ask the answering service to answer a question addressed to `team`.
pub fn answer(team: &TeamConfig, question: &Question) -> String {
    let mut prompt = format!(
        "You are answering on behalf of the {name} team ({id}).\n\
         Team {from} asked the following question in the cross-team ledger.\n\n\
         Title: {title}\n\nQuestion:\n{body}\n",
        name = team.display_name(),
        id = team.id,
        from = question.asked_by,
        title = question.title,
        body = question.body,
    );
    if let Some(context) = &question.context {
        prompt.push_str(&format!("\nContext:\n{context}\n"));
    }
    prompt.push_str(
        "\nAnswer concisely and concretely, using only what the loaded team \
         documentation supports. Say so plainly if the answer is unknown.",
    );
    prompt
}

/// Ask for actionable insights from an answer another team gave to `team`.
pub fn review(team: &TeamConfig, question: &Question) -> String {
    format!(
        "The {name} team asked team {to}:\n\n{title}\n{body}\n\n\
         They answered:\n{answer}\n\n\
         Extract the actionable insights for the {name} team as a short \
         bullet list. Mention follow-up questions if any remain.",
        name = team.display_name(),
        to = question.asked_to,
        title = question.title,
        body = question.body,
        answer = question.answer_body.as_deref().unwrap_or(""),
    )
}

/// Ask about upstream guidance changes relevant to `team`.
pub fn check_updates(team: &TeamConfig) -> String {
    format!(
        "Review the loaded upstream documentation for changes in guidance \
         that affect the {name} team ({id}): new conventions, deprecations, \
         changed interfaces or deadlines. List each change with its impact. \
         Reply with \"nothing relevant\" if there is none.",
        name = team.display_name(),
        id = team.id,
    )
}

/// Ask for a prioritized plan for the team's next working session.
pub fn plan(team: &TeamConfig, open_questions: &[&Question]) -> String {
    let mut prompt = format!(
        "Write a prioritized plan for the {name} team's next working session \
         as a numbered Markdown list.\n",
        name = team.display_name(),
    );
    if open_questions.is_empty() {
        prompt.push_str("\nThere are no open cross-team questions involving the team.\n");
    } else {
        prompt.push_str("\nOpen cross-team questions involving the team:\n");
        for q in open_questions {
            prompt.push_str(&format!(
                "- [{}] {} ({} → {}, {})\n",
                q.id,
                q.title,
                q.asked_by,
                q.asked_to,
                q.status.label()
            ));
        }
    }
    prompt
}

/// Ask whether the README is still accurate.
pub fn readme_audit(team: &TeamConfig, readme: Option<&str>, no_changes_phrase: &str) -> String {
    let current = readme.unwrap_or("(the repository has no README yet)");
    format!(
        "Audit the README of the {name} team's repository against the loaded \
         documentation.\n\nREADME:\n{current}\n\n\
         If it is accurate, reply with exactly \"{no_changes_phrase}\". \
         Otherwise list the sections that need changes.",
        name = team.display_name(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgersync_ledger::parse;

    const LEDGER: &str = "### [Q-7] Retention?\n\
**From:** nexus → **To:** de\n\
**Status:** 🟡 Open\n\
**Question:** How long are raw events kept?\n\
**Context:** GDPR review next week.\n\
**Answer:** _Waiting for DE response_\n";

    #[test]
    fn answer_prompt_carries_question_and_context() {
        let team = TeamConfig::new("de", "acme", "data-eng");
        let q = &parse(LEDGER)[0];
        let prompt = answer(&team, q);
        assert!(prompt.contains("How long are raw events kept?"));
        assert!(prompt.contains("GDPR review next week."));
        assert!(prompt.contains("Team nexus asked"));
    }

    #[test]
    fn readme_prompt_names_the_phrase() {
        let team = TeamConfig::new("de", "acme", "data-eng");
        let prompt = readme_audit(&team, None, "no changes needed");
        assert!(prompt.contains("\"no changes needed\""));
        assert!(prompt.contains("no README yet"));
    }

    #[test]
    fn plan_lists_open_questions() {
        let team = TeamConfig::new("de", "acme", "data-eng");
        let questions = parse(LEDGER);
        let refs: Vec<&Question> = questions.iter().collect();
        assert!(plan(&team, &refs).contains("[Q-7] Retention?"));
        assert!(plan(&team, &[]).contains("no open cross-team questions"));
    }
}
