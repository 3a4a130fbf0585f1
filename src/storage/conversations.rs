// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Conversation index and active conversation id

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::transcript::HistorySummary;

use super::store::{get_typed, set_typed, KeyValueStore};

pub const CONVERSATION_ID_KEY: &str = "parley.conversation_id";
pub const CONVERSATIONS_KEY: &str = "parley.conversations";

/// Return the stored conversation id, creating and storing one if absent
pub fn load_or_create_conversation_id(store: &mut dyn KeyValueStore) -> Result<String> {
    if let Some(id) = get_typed::<String>(store, CONVERSATION_ID_KEY).filter(|id| !id.is_empty()) {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    persist_conversation_id(store, &id)?;
    Ok(id)
}

pub fn persist_conversation_id(store: &mut dyn KeyValueStore, id: &str) -> Result<()> {
    set_typed(store, CONVERSATION_ID_KEY, &id)
}

/// One entry of the conversation index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time: Option<String>,
}

impl ConversationSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            last_message: None,
            last_time: None,
        }
    }

    /// Time of last activity: `last_time` when it parses, else creation
    pub fn activity(&self) -> DateTime<Utc> {
        self.last_time
            .as_deref()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map_or(self.created_at, |t| t.with_timezone(&Utc))
    }
}

/// Known conversations, most recently active first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationIndex {
    items: Vec<ConversationSummary>,
}

impl ConversationIndex {
    /// Read the index; a missing or malformed entry reads as empty
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut index = Self {
            items: get_typed(store, CONVERSATIONS_KEY).unwrap_or_default(),
        };
        index.sort();
        index
    }

    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        set_typed(store, CONVERSATIONS_KEY, &self.items)
    }

    pub fn items(&self) -> &[ConversationSummary] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add `id` if it is not indexed yet. Returns whether it was added.
    pub fn ensure(&mut self, id: &str) -> bool {
        if id.is_empty() || self.get(id).is_some() {
            return false;
        }
        self.items.push(ConversationSummary::new(id));
        self.sort();
        true
    }

    /// Record what a loaded history page says about an indexed conversation.
    ///
    /// Fields the summary lacks keep their previous values.
    pub fn touch(&mut self, id: &str, summary: &HistorySummary) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if let Some(message) = &summary.last_user_message {
            item.last_message = Some(message.clone());
        }
        if let Some(time) = &summary.last_time {
            item.last_time = Some(time.clone());
        }
        self.sort();
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() < before
    }

    /// Remove several ids; returns how many were indexed
    pub fn remove_many(&mut self, ids: &[String]) -> usize {
        let before = self.items.len();
        self.items.retain(|item| !ids.contains(&item.id));
        before - self.items.len()
    }

    fn sort(&mut self) {
        self.items.sort_by_key(|item| std::cmp::Reverse(item.activity()));
    }
}
