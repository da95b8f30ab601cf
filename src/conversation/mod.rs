// Conversation log for the interactive chat loop
// Display only: answers never see earlier turns

#[cfg(test)]
mod tests;

use chrono::{DateTime, Local};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::answer::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

impl Message {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Local::now(),
        }
    }

    /// Label shown before the message in the terminal
    #[inline]
    pub const fn speaker(&self) -> &'static str {
        match self.role {
            Role::User => "You",
            Role::Assistant => "Chatbot",
            Role::System => "System",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push_user(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new(Role::User, content))
    }

    #[inline]
    pub fn push_assistant(&mut self, content: impl Into<String>) -> &Message {
        self.push(Message::new(Role::Assistant, content))
    }

    #[inline]
    pub fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drop a trailing user message that never got an answer
    #[inline]
    pub fn discard_unanswered(&mut self) -> Option<Message> {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// One `[HH:MM:SS] Speaker: content` line per message
    #[inline]
    pub fn render_history(&self) -> String {
        self.messages
            .iter()
            .map(|m| {
                format!(
                    "[{}] {}: {}",
                    m.timestamp.format("%H:%M:%S"),
                    m.speaker(),
                    m.content
                )
            })
            .join("\n")
    }
}
