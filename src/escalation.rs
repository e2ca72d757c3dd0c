use async_trait::async_trait;
use tracing::info;

use faq_harness_core::traits::Escalator;

/// Acknowledgment returned for every handoff.
pub const HANDOFF_ACK: &str = "Query escalated to human support. You'll be contacted soon.";

/// Records the handoff in the log. A ticketing integration would replace
/// this.
pub struct LoggingEscalator;

#[async_trait]
impl Escalator for LoggingEscalator {
    async fn handoff(&self, user_input: &str) -> String {
        info!(input_chars = user_input.chars().count(), "handoff to human support");
        HANDOFF_ACK.to_string()
    }
}
