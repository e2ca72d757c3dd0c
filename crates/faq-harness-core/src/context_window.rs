//! Bounded conversation history for the generation step.
//!
//! History size is measured on its transcript rendering
//! (`Human: …\nAI: …` per turn, joined by newlines) using a
//! characters-per-token proxy. When the transcript is over budget the
//! oldest turns are dropped first.
//!
//! The newest turn is always kept, even if it alone exceeds the budget, so
//! [`trim`] never returns an empty window for a non-empty history.

use crate::models::Turn;

/// Default history budget, in approximate tokens.
pub const DEFAULT_BUDGET_TOKENS: usize = 8000;

/// Budget settings for [`trim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    pub budget_tokens: usize,
    pub chars_per_token: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            budget_tokens: DEFAULT_BUDGET_TOKENS,
            chars_per_token: crate::chunk::CHARS_PER_TOKEN,
        }
    }
}

impl ContextBudget {
    pub fn max_chars(&self) -> usize {
        self.budget_tokens.saturating_mul(self.chars_per_token)
    }
}

/// Render a history as a transcript.
pub fn render_transcript(history: &[Turn]) -> String {
    history
        .iter()
        .map(render_turn)
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_turn(turn: &Turn) -> String {
    format!("Human: {}\nAI: {}", turn.input, turn.output)
}

fn rendered_len(turn: &Turn) -> usize {
    "Human: \nAI: ".chars().count() + turn.input.chars().count() + turn.output.chars().count()
}

/// Keep the longest suffix of `history` whose transcript fits the budget.
///
/// Returns the history unchanged when it already fits. The most recent
/// turn is always part of the result.
pub fn trim(history: &[Turn], budget: ContextBudget) -> Vec<Turn> {
    let max_chars = budget.max_chars();

    let mut total = 0usize;
    let mut keep = 0usize;
    for turn in history.iter().rev() {
        let separator = if keep == 0 { 0 } else { 1 };
        let next = total + separator + rendered_len(turn);
        if next > max_chars && keep > 0 {
            break;
        }
        total = next;
        keep += 1;
    }

    history[history.len() - keep..].to_vec()
}
