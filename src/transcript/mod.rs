// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Linear message transcript shared by the live and history paths

pub mod message;
pub mod reconstruct;

pub use message::{
    form_raw_text, select_raw_text, DisplayContent, Message, Role, Turn, PENDING_TEXT,
    UNFILLED_TEXT,
};
pub use reconstruct::{
    parse_form_content, parse_records, reconstruct, sort_records, strip_cites, summarize,
    HistoryBlock, HistoryRecord, HistorySummary, HISTORY_FORM_TITLE,
};

/// Ordered messages with unique ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == id)
    }

    /// Append a message, replacing any existing message with the same id
    pub fn push(&mut self, message: Message) {
        match self.get_mut(&message.id) {
            Some(existing) => *existing = message,
            None => self.messages.push(message),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages.clear();
        for message in messages {
            self.push(message);
        }
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Request history: finished, non-empty, non-system messages in order
    pub fn turns(&self) -> Vec<Turn> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System && !m.loading && !m.raw_text.is_empty())
            .map(|m| Turn {
                role: m.role,
                content: m.raw_text.clone(),
            })
            .collect()
    }
}
