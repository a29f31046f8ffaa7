use crate::llm::Message;

/// Sliding conversation window.
///
/// The system prompt is held apart from the history so trimming never
/// drops it; only the most recent `max_messages` user/assistant messages
/// are kept.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,
    messages: Vec<Message>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
            max_messages: max_messages.max(1),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Forgets the history, keeping the system prompt.
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}
