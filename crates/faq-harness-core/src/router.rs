//! Turn router: the per-turn decision pipeline.
//!
//! Each user turn goes through retrieval, a confidence/consent gate, an
//! optional generation step, and an optional human handoff. The only state
//! carried between turns is the [`ConsentState`] of the last persisted
//! turn, so a turn is fully determined by `(input, history, capabilities)`.
//!
//! ```text
//!                     "escalate"/"human" ─────────────▶ handoff
//!   Normal ──retrieve──┬─ usable chunks ──────────────▶ "From A, B: …"   (Normal)
//!                      └─ none / unavailable ────────▶ consent prompt  (Awaiting)
//!   Awaiting ──────────┬─ yes ── retrieve + generate ─▶ answer          (Normal)
//!                      ├─ no ─────────────────────────▶ handoff         (Normal)
//!                      └─ other ──────────────────────▶ re-prompt       (Awaiting)
//! ```
//!
//! [`TurnRouter::handle_turn`] never fails: retrieval and generation errors
//! are turned into valid turns so the next turn always works.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::attribution::{self, Attribution, DEFAULT_SNIPPET_CHARS};
use crate::context_window::{self, ContextBudget};
use crate::intent::{classify_intent, Intent};
use crate::models::{ConsentState, DocumentId, RetrievedChunk, Turn, TurnOutcome};
use crate::traits::{DocumentCatalog, Escalator, Generator, Retrieval, Retriever};

/// Reply when no FAQ matched; asks for generation consent.
pub const NO_FAQ_PROMPT: &str =
    "No relevant FAQ found. Do you want me to generate an answer using LLM?";

/// Reply to anything other than yes/no while awaiting consent.
pub const CONSENT_REPROMPT: &str =
    "Please answer \"yes\" or \"no\". Do you want me to generate an answer using LLM?";

/// Default system instructions for the generation step.
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are a customer support AI. \
Use the FAQ context below when it is relevant to the question. \
If it is missing or unrelated, answer from your own knowledge and say so. \
Keep answers short and practical.";

/// Default number of chunks retrieved per turn.
pub const DEFAULT_TOP_K: usize = 2;

/// Router tuning, passed at construction.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub top_k: usize,
    /// Per-chunk character budget in direct answers.
    pub snippet_chars: usize,
    /// Chunks scoring below this do not count as an FAQ match.
    pub min_score: Option<f32>,
    pub context: ContextBudget,
    pub system_instructions: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
            min_score: None,
            context: ContextBudget::default(),
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
        }
    }
}

/// The capabilities a router works with.
#[derive(Clone)]
pub struct Capabilities {
    pub retriever: Arc<dyn Retriever>,
    pub generator: Arc<dyn Generator>,
    pub escalator: Arc<dyn Escalator>,
    pub catalog: Arc<dyn DocumentCatalog>,
}

/// Routes conversation turns.
pub struct TurnRouter {
    config: RouterConfig,
    caps: Capabilities,
}

/// A reply before it is recorded.
struct Reply {
    output: String,
    document_ids: Vec<DocumentId>,
    state: ConsentState,
}

impl Reply {
    fn normal(output: String, document_ids: Vec<DocumentId>) -> Self {
        Self {
            output,
            document_ids,
            state: ConsentState::Normal,
        }
    }

    fn awaiting(output: &str, question: &str) -> Self {
        Self {
            output: output.to_string(),
            document_ids: Vec::new(),
            state: ConsentState::AwaitingGenerationConsent {
                question: question.to_string(),
            },
        }
    }
}

impl TurnRouter {
    pub fn new(config: RouterConfig, caps: Capabilities) -> Self {
        Self { config, caps }
    }

    /// Route one turn given the conversation's recent history (oldest
    /// first). The session state is taken from the last turn.
    pub async fn handle_turn(&self, input: &str, history: Vec<Turn>) -> TurnOutcome {
        let state = history
            .last()
            .map(|t| t.state.clone())
            .unwrap_or_default();
        let intent = classify_intent(input);
        debug!(state = state.label(), ?intent, "routing turn");

        let reply = match (intent, state) {
            (Intent::Escalate, _) => self.escalate(input).await,
            (_, ConsentState::Normal) => self.answer_from_faq(input).await,
            (Intent::Affirm, ConsentState::AwaitingGenerationConsent { question }) => {
                self.generate(&question, &history).await
            }
            (Intent::Deny, ConsentState::AwaitingGenerationConsent { question }) => {
                self.escalate(&question).await
            }
            (Intent::Other, ConsentState::AwaitingGenerationConsent { question }) => {
                Reply::awaiting(CONSENT_REPROMPT, &question)
            }
        };

        let turn = Turn::new(input, reply.output.clone(), reply.document_ids, reply.state);
        let attributed_document_ids = turn.document_ids.clone();
        let state = turn.state.clone();
        let mut updated_history = history;
        updated_history.push(turn);

        TurnOutcome {
            output: reply.output,
            updated_history,
            attributed_document_ids,
            state,
        }
    }

    async fn escalate(&self, input: &str) -> Reply {
        info!("escalating turn to human support");
        Reply::normal(self.caps.escalator.handoff(input).await, Vec::new())
    }

    async fn answer_from_faq(&self, input: &str) -> Reply {
        let hits = match self.retrieve(input).await {
            Some(hits) => hits,
            None => return Reply::awaiting(NO_FAQ_PROMPT, input),
        };

        let usable: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|h| !h.text.trim().is_empty())
            .filter(|h| self.config.min_score.map_or(true, |min| h.score >= min))
            .collect();
        if usable.is_empty() {
            info!("no usable FAQ chunks; asking for generation consent");
            return Reply::awaiting(NO_FAQ_PROMPT, input);
        }

        let attribution = self.attribute(&usable).await;
        info!(
            chunks = usable.len(),
            documents = ?attribution.document_ids,
            "answering from FAQ"
        );
        let output = attribution::render_answer(&attribution, &usable, self.config.snippet_chars);
        Reply::normal(output, attribution.document_ids)
    }

    async fn generate(&self, question: &str, history: &[Turn]) -> Reply {
        let hits: Vec<RetrievedChunk> = self
            .retrieve(question)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|h| !h.text.trim().is_empty())
            .collect();
        let attribution = if hits.is_empty() {
            Attribution::default()
        } else {
            self.attribute(&hits).await
        };
        let context = attribution::render_context(&attribution, &hits);
        let trimmed = context_window::trim(history, self.config.context);

        match self
            .caps
            .generator
            .complete(&self.config.system_instructions, &context, &trimmed, question)
            .await
        {
            Ok(answer) => {
                info!(documents = ?attribution.document_ids, "generated answer");
                Reply::normal(answer, attribution.document_ids)
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                Reply::normal(format!("Error: {}", e), Vec::new())
            }
        }
    }

    /// `None` means retrieval is unavailable or failed.
    async fn retrieve(&self, query: &str) -> Option<Vec<RetrievedChunk>> {
        match self.caps.retriever.retrieve(query, self.config.top_k).await {
            Ok(Retrieval::Hits(hits)) => Some(hits),
            Ok(Retrieval::Unavailable(reason)) => {
                info!(%reason, "retrieval unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                None
            }
        }
    }

    async fn attribute(&self, hits: &[RetrievedChunk]) -> Attribution {
        let ids = attribution::unique_document_ids(hits);
        let names = match self.caps.catalog.document_names(&ids).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "document name lookup failed");
                HashMap::new()
            }
        };
        attribution::attribute(hits, &names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const HANDOFF: &str = "Query escalated to human support. You'll be contacted soon.";

    struct FixedRetriever(Retrieval);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, k: usize) -> Result<Retrieval> {
            Ok(match &self.0 {
                Retrieval::Hits(h) => Retrieval::Hits(h.iter().take(k).cloned().collect()),
                other => other.clone(),
            })
        }
    }

    struct FailingRetriever;

    #[async_trait]
    impl Retriever for FailingRetriever {
        async fn retrieve(&self, _query: &str, _k: usize) -> Result<Retrieval> {
            bail!("index exploded")
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        fail: bool,
        calls: Mutex<Vec<(String, usize, String)>>,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        async fn complete(
            &self,
            _system: &str,
            context: &str,
            history: &[Turn],
            user_input: &str,
        ) -> Result<String> {
            self.calls.lock().unwrap().push((
                context.to_string(),
                history.len(),
                user_input.to_string(),
            ));
            if self.fail {
                bail!("generation failed");
            }
            Ok(format!("generated: {}", user_input))
        }
    }

    struct FixedEscalator;

    #[async_trait]
    impl Escalator for FixedEscalator {
        async fn handoff(&self, _user_input: &str) -> String {
            HANDOFF.to_string()
        }
    }

    struct Names;

    #[async_trait]
    impl DocumentCatalog for Names {
        async fn list_active(&self) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }
        async fn document_names(
            &self,
            ids: &[DocumentId],
        ) -> Result<HashMap<DocumentId, String>> {
            Ok(ids
                .iter()
                .filter(|id| **id < 3)
                .map(|id| (*id, ["", "A", "B"][*id as usize].to_string()))
                .collect())
        }
    }

    fn hit(doc: DocumentId, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            text: text.to_string(),
            document_id: doc,
            score,
        }
    }

    fn router_with(
        retriever: Arc<dyn Retriever>,
        generator: Arc<RecordingGenerator>,
        config: RouterConfig,
    ) -> TurnRouter {
        TurnRouter::new(
            config,
            Capabilities {
                retriever,
                generator,
                escalator: Arc::new(FixedEscalator),
                catalog: Arc::new(Names),
            },
        )
    }

    fn router(retrieval: Retrieval, generator: Arc<RecordingGenerator>) -> TurnRouter {
        router_with(
            Arc::new(FixedRetriever(retrieval)),
            generator,
            RouterConfig::default(),
        )
    }

    fn awaiting(question: &str) -> Vec<Turn> {
        vec![Turn::new(
            question,
            NO_FAQ_PROMPT,
            vec![],
            ConsentState::AwaitingGenerationConsent {
                question: question.to_string(),
            },
        )]
    }

    #[tokio::test]
    async fn test_faq_answer_is_attributed_and_truncated() {
        let long = "z".repeat(1000);
        let r = router(
            Retrieval::Hits(vec![hit(1, "Refunds take 5 days.", 0.9), hit(2, &long, 0.8)]),
            Arc::default(),
        );
        let out = r.handle_turn("how do refunds work?", vec![]).await;
        assert!(out.output.starts_with("From A, B:"));
        assert_eq!(out.attributed_document_ids, vec![1, 2]);
        assert_eq!(out.state, ConsentState::Normal);
        let body = out.output.trim_start_matches("From A, B:\n\n");
        for chunk in body.split("\n\n") {
            assert!(chunk.chars().count() <= 303);
        }
        assert_eq!(out.updated_history.len(), 1);
        assert_eq!(out.turn().unwrap().document_ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unavailable_index_asks_for_consent() {
        let r = router(Retrieval::Unavailable("no active documents".into()), Arc::default());
        let out = r.handle_turn("what is the return policy?", vec![]).await;
        assert_eq!(out.output, NO_FAQ_PROMPT);
        assert!(out.attributed_document_ids.is_empty());
        assert_eq!(
            out.state,
            ConsentState::AwaitingGenerationConsent {
                question: "what is the return policy?".into()
            }
        );
    }

    #[tokio::test]
    async fn test_zero_hits_asks_for_consent() {
        let r = router(Retrieval::Hits(vec![hit(1, "   ", 0.9)]), Arc::default());
        let out = r.handle_turn("anything?", vec![]).await;
        assert_eq!(out.output, NO_FAQ_PROMPT);
        assert!(out.state.is_awaiting());
    }

    #[tokio::test]
    async fn test_retrieval_error_is_treated_as_unavailable() {
        let r = router_with(Arc::new(FailingRetriever), Arc::default(), RouterConfig::default());
        let out = r.handle_turn("hello", vec![]).await;
        assert_eq!(out.output, NO_FAQ_PROMPT);
        assert!(out.state.is_awaiting());
    }

    #[tokio::test]
    async fn test_escalation_override_in_any_state() {
        let r = router(Retrieval::Hits(vec![hit(1, "x", 1.0)]), Arc::default());
        for history in [vec![], awaiting("q")] {
            let out = r.handle_turn("escalate now", history).await;
            assert_eq!(out.output, HANDOFF);
            assert!(out.attributed_document_ids.is_empty());
            assert_eq!(out.state, ConsentState::Normal);
        }
    }

    #[tokio::test]
    async fn test_ambiguous_consent_reprompts() {
        let generator = Arc::new(RecordingGenerator::default());
        let r = router(Retrieval::Hits(vec![]), generator.clone());
        let out = r.handle_turn("maybe", awaiting("refund?")).await;
        assert_eq!(out.output, CONSENT_REPROMPT);
        assert_eq!(
            out.state,
            ConsentState::AwaitingGenerationConsent {
                question: "refund?".into()
            }
        );
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_yes_invokes_generation_with_context() {
        let generator = Arc::new(RecordingGenerator::default());
        let r = router(
            Retrieval::Hits(vec![hit(2, "Shipping is free.", 0.1)]),
            generator.clone(),
        );
        let out = r.handle_turn("yes", awaiting("shipping cost?")).await;
        assert_eq!(out.output, "generated: shipping cost?");
        assert_eq!(out.state, ConsentState::Normal);
        assert_eq!(out.attributed_document_ids, vec![2]);

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].0.starts_with("From B:"));
        assert_eq!(calls[0].1, 1);
        assert_eq!(calls[0].2, "shipping cost?");
    }

    #[tokio::test]
    async fn test_yes_without_index_generates_without_context() {
        let generator = Arc::new(RecordingGenerator::default());
        let r = router(Retrieval::Unavailable("none".into()), generator.clone());
        let out = r.handle_turn("Yes please", awaiting("q")).await;
        assert_eq!(out.state, ConsentState::Normal);
        assert!(out.attributed_document_ids.is_empty());
        assert_eq!(generator.calls.lock().unwrap()[0].0, "");
    }

    #[tokio::test]
    async fn test_no_escalates() {
        let generator = Arc::new(RecordingGenerator::default());
        let r = router(Retrieval::Hits(vec![]), generator.clone());
        let out = r.handle_turn("no", awaiting("q")).await;
        assert_eq!(out.output, HANDOFF);
        assert_eq!(out.state, ConsentState::Normal);
        assert!(generator.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_is_absorbed() {
        let generator = Arc::new(RecordingGenerator {
            fail: true,
            ..Default::default()
        });
        let r = router(Retrieval::Hits(vec![hit(1, "FAQ text", 0.9)]), generator);
        let out = r.handle_turn("yes", awaiting("q")).await;
        assert!(out.output.starts_with("Error: "));
        assert_eq!(out.state, ConsentState::Normal);
        assert!(out.attributed_document_ids.is_empty());

        let next = r.handle_turn("refunds?", out.updated_history).await;
        assert!(next.output.starts_with("From A:"));
        assert_eq!(next.updated_history.len(), 3);
    }

    #[tokio::test]
    async fn test_min_score_gate_then_yes_uses_low_score_context() {
        let generator = Arc::new(RecordingGenerator::default());
        let config = RouterConfig {
            min_score: Some(0.5),
            ..RouterConfig::default()
        };
        let r = router_with(
            Arc::new(FixedRetriever(Retrieval::Hits(vec![hit(1, "weak match", 0.2)]))),
            generator.clone(),
            config,
        );
        let first = r.handle_turn("obscure question", vec![]).await;
        assert_eq!(first.output, NO_FAQ_PROMPT);

        let second = r.handle_turn("yes", first.updated_history).await;
        assert_eq!(second.attributed_document_ids, vec![1]);
        assert!(generator.calls.lock().unwrap()[0].0.contains("weak match"));
    }

    #[tokio::test]
    async fn test_top_k_bounds_retrieval() {
        let hits = (0..5).map(|i| hit(1, &format!("chunk {}", i), 1.0)).collect();
        let r = router(Retrieval::Hits(hits), Arc::default());
        let out = r.handle_turn("q", vec![]).await;
        assert_eq!(out.output.matches("chunk ").count(), DEFAULT_TOP_K);
    }
}
