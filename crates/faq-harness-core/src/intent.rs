//! Turn intent classification.
//!
//! Maps raw user text onto the closed set of intents the router acts on.
//! The heuristic lives here alone so it can be swapped for a stricter
//! parser without touching the routing logic.
//!
//! | Rule | Intent |
//! |------|--------|
//! | text contains `escalate` or `human` (any case, substring) | [`Intent::Escalate`] |
//! | `yes` appears as a word and `no` does not | [`Intent::Affirm`] |
//! | `no` appears as a word and `yes` does not | [`Intent::Deny`] |
//! | anything else, including both | [`Intent::Other`] |

/// What a turn asks the system to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Affirm,
    Deny,
    Escalate,
    Other,
}

const ESCALATION_KEYWORDS: &[&str] = &["escalate", "human"];
const AFFIRM_WORD: &str = "yes";
const DENY_WORD: &str = "no";

/// Whether the text asks for a human, regardless of conversation state.
pub fn wants_escalation(text: &str) -> bool {
    let lower = text.to_lowercase();
    ESCALATION_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Classify a turn's text.
///
/// Yes/no are matched as whole words so "know" or "nothing" never count as
/// a refusal.
pub fn classify_intent(text: &str) -> Intent {
    if wants_escalation(text) {
        return Intent::Escalate;
    }

    let lower = text.to_lowercase();
    let mut affirm = false;
    let mut deny = false;
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        match word {
            AFFIRM_WORD => affirm = true,
            DENY_WORD => deny = true,
            _ => {}
        }
    }

    match (affirm, deny) {
        (true, false) => Intent::Affirm,
        (false, true) => Intent::Deny,
        _ => Intent::Other,
    }
}
