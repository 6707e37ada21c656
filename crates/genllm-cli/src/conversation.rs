//! REPL conversation state

use genllm_core::{ChatAgent, Message, ModelReply};

/// Pruned history carried between REPL turns
#[derive(Debug, Default)]
pub struct Conversation {
    history: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Send one user turn
    ///
    /// History is replaced only when the call succeeds; a failed turn leaves
    /// it as it was.
    pub async fn send(&mut self, agent: &dyn ChatAgent, input: &str) -> genllm_core::Result<ModelReply> {
        let response = agent.chat(self.history.clone(), input).await?;
        self.history = response.history;
        Ok(response.last_response)
    }
}
