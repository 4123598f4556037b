use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::{ConversationContext, GeneratedResponse, GenerationError, ResponseGenerator};

/// Generator that repeats the user's words back
#[derive(Debug, Clone, Default)]
pub struct EchoGenerator {
    latency: Duration,
}

impl EchoGenerator {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(
        &self,
        context: &ConversationContext,
        transcript: &str,
    ) -> Result<GeneratedResponse, GenerationError> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Err(GenerationError::Failed("empty transcript".to_string()));
        }

        tokio::time::sleep(self.latency).await;

        let turn = context.recent_turns.len() + 1;
        debug!(session_id = %context.session_id, turn, "echo response");

        let mut suggestions = vec!["Tell me more".to_string()];
        if turn > 1 {
            suggestions.push("Summarize our conversation".to_string());
        }

        Ok(GeneratedResponse {
            text: format!("You said: {transcript}"),
            suggestions,
            artifact: None,
            notes: Some(format!("turn {turn}")),
        })
    }
}
