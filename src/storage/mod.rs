// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Local persistence
//!
//! The active conversation id, the conversation index and the user profile,
//! all kept in a [`KeyValueStore`].

pub mod conversations;
pub mod store;

pub use conversations::{
    load_or_create_conversation_id, persist_conversation_id, ConversationIndex,
    ConversationSummary, CONVERSATIONS_KEY, CONVERSATION_ID_KEY,
};
pub use store::{get_typed, set_typed, JsonFileStore, KeyValueStore, MemoryStore};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const PROFILE_KEY: &str = "parley.profile";

/// Basic facts about the user, collected before the first question
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub age: String,
}

impl Profile {
    pub fn read(store: &dyn KeyValueStore) -> Option<Self> {
        get_typed(store, PROFILE_KEY)
    }

    pub fn write(&self, store: &mut dyn KeyValueStore) -> Result<()> {
        set_typed(store, PROFILE_KEY, self)
    }

    pub fn clear(store: &mut dyn KeyValueStore) -> Result<()> {
        store.remove(PROFILE_KEY)?;
        Ok(())
    }

    /// Both fields filled in
    pub fn is_complete(&self) -> bool {
        !self.gender.trim().is_empty() && !self.age.trim().is_empty()
    }

    /// Build a profile from typed answers.
    ///
    /// Gender accepts `男`/`女` or their menu numbers `1`/`2`; non-digits are
    /// dropped from the age. Returns `None` unless both fields survive.
    pub fn from_input(gender: &str, age: &str) -> Option<Self> {
        let gender = match gender.trim() {
            "1" | "男" => "男",
            "2" | "女" => "女",
            _ => return None,
        };
        let age: String = age.chars().filter(char::is_ascii_digit).collect();
        let profile = Self {
            gender: gender.to_string(),
            age,
        };
        profile.is_complete().then_some(profile)
    }
}
