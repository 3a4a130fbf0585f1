// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Transcript message types

use serde::{Deserialize, Serialize};

use crate::followup::FollowUpSnapshot;
use crate::interactive::{AnsweredPrompt, SelectOption};

/// Text shown while an answer has not started arriving
pub const PENDING_TEXT: &str = "正在思考中...";

/// Value shown for a form field that was left empty
pub const UNFILLED_TEXT: &str = "未填";

/// Speaker of a turn or message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Map a role as stored by the service. Unknown values are users.
    pub fn from_wire(role: &str) -> Self {
        match role {
            "assistant" | "AI" => Role::Assistant,
            "system" | "System" => Role::System,
            _ => Role::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One role-tagged entry of the request history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What a message shows, independent of how it is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayContent {
    /// Waiting for the first forwarded delta
    Pending,
    Text(String),
    /// A select prompt with the chosen value marked
    Select {
        description: String,
        options: Vec<SelectOption>,
        selected: Option<String>,
    },
    /// Label and value pairs of a submitted form
    Form {
        title: Option<String>,
        fields: Vec<(String, String)>,
    },
    /// Nothing to show; used for follow-up snapshots
    Empty,
}

/// One entry of the rendered transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub display: DisplayContent,
    /// Plain text form, also what is sent back as history
    pub raw_text: String,
    pub loading: bool,
    pub follow_up: Option<FollowUpSnapshot>,
}

impl Message {
    pub fn text(id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            role,
            display: DisplayContent::Text(text.clone()),
            raw_text: text,
            loading: false,
            follow_up: None,
        }
    }

    /// Assistant placeholder for an answer that is still streaming
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            display: DisplayContent::Pending,
            raw_text: String::new(),
            loading: true,
            follow_up: None,
        }
    }

    /// Frozen follow-up batch with the answers given so far
    pub fn follow_up(id: impl Into<String>, snapshot: FollowUpSnapshot) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            display: DisplayContent::Empty,
            raw_text: snapshot.answer_list(),
            loading: false,
            follow_up: Some(snapshot),
        }
    }

    /// Form summary built from key and value pairs
    pub fn form(
        id: impl Into<String>,
        role: Role,
        title: Option<String>,
        fields: Vec<(String, String)>,
        raw_pairs: &[(String, String)],
    ) -> Self {
        Self {
            id: id.into(),
            role,
            display: DisplayContent::Form { title, fields },
            raw_text: form_raw_text(raw_pairs),
            loading: false,
            follow_up: None,
        }
    }

    /// Record of an answered prompt
    pub fn answered_log(id: impl Into<String>, answered: &AnsweredPrompt) -> Self {
        match answered {
            AnsweredPrompt::Select {
                description,
                options,
                selected,
            } => Self {
                id: id.into(),
                role: Role::Assistant,
                display: DisplayContent::Select {
                    description: description.clone(),
                    options: options.clone(),
                    selected: Some(selected.value.clone()),
                },
                raw_text: select_raw_text(description, Some(&selected.value)),
                loading: false,
                follow_up: None,
            },
            AnsweredPrompt::Form {
                description,
                fields,
                values,
            } => {
                let shown = fields
                    .iter()
                    .map(|field| {
                        let value = values
                            .iter()
                            .find(|(k, _)| *k == field.key)
                            .map_or(UNFILLED_TEXT, |(_, v)| v.as_str());
                        (field.display_label().to_string(), value.to_string())
                    })
                    .collect();
                Self::form(
                    id,
                    Role::Assistant,
                    Some(description.clone()),
                    shown,
                    values,
                )
            }
        }
    }

    /// Replace the content with final text and stop loading
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.display = DisplayContent::Text(text.clone());
        self.raw_text = text;
        self.loading = false;
    }

    /// Text for plain-text rendering
    pub fn display_text(&self) -> String {
        match &self.display {
            DisplayContent::Pending => PENDING_TEXT.to_string(),
            DisplayContent::Text(text) => text.clone(),
            DisplayContent::Select {
                description,
                options,
                selected,
            } => {
                let marked: Vec<String> = options
                    .iter()
                    .map(|o| {
                        if selected.as_deref() == Some(o.value.as_str()) {
                            format!("[{}]", o.value)
                        } else {
                            o.value.clone()
                        }
                    })
                    .collect();
                format!("{}\n{}", description, marked.join(" "))
            }
            DisplayContent::Form { title, fields } => {
                let mut lines: Vec<String> = title.iter().cloned().collect();
                lines.extend(fields.iter().map(|(label, value)| format!("{label}：{value}")));
                lines.join("\n")
            }
            DisplayContent::Empty => self.raw_text.clone(),
        }
    }
}

/// `key：value` pairs joined by `，`
pub fn form_raw_text(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{key}：{value}"))
        .collect::<Vec<_>>()
        .join("，")
}

/// `description：selected`, or just the description when nothing was chosen
pub fn select_raw_text(description: &str, selected: Option<&str>) -> String {
    match selected {
        Some(value) => format!("{description}：{value}"),
        None => description.to_string(),
    }
}
