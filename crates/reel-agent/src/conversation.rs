//! Conversation state for one run

use reel_ai::{Message, Usage};

/// Ordered, append-only message history plus accumulated usage.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    /// Total usage across all model turns
    pub total_usage: Usage,
}

impl Conversation {
    /// Start a conversation from the initial user instruction
    pub fn new(initial: Message) -> Self {
        Self {
            messages: vec![initial],
            total_usage: Usage::default(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}
