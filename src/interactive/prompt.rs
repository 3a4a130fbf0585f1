// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Interactive prompt types and payload parsing

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Description shown for a select prompt that has none
pub const DEFAULT_SELECT_DESCRIPTION: &str = "请选择一个选项";

/// Description shown for a form prompt that has none
pub const DEFAULT_FORM_DESCRIPTION: &str = "请填写信息";

/// Which kind of input the paused workflow is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromptKind {
    /// Forced choice among options
    UserSelect,
    /// Structured form input
    UserInput,
}

/// One choice of a select prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub key: String,
    pub value: String,
}

/// One allowed value of a form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChoice {
    #[serde(default)]
    pub label: String,
    pub value: String,
}

/// One field of a form prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Allowed values; empty means free text
    #[serde(default, rename = "list")]
    pub choices: Vec<FieldChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl FormField {
    /// Label to show, falling back to the key
    pub fn display_label(&self) -> &str {
        if self.label.is_empty() {
            &self.key
        } else {
            &self.label
        }
    }

    /// Pre-filled value: `defaultValue`, then `value`. Empty strings count as unset.
    pub fn prefill(&self) -> Option<&str> {
        self.default_value
            .as_deref()
            .filter(|v| !v.is_empty())
            .or_else(|| self.value.as_deref().filter(|v| !v.is_empty()))
    }

    /// Whether `value` is acceptable for this field
    pub fn accepts(&self, value: &str) -> bool {
        self.choices.is_empty() || self.choices.iter().any(|c| c.value == value)
    }
}

/// Opaque workflow-graph state threaded through to the resume request.
///
/// Only `chatId`, `responseChatItemId` and `messages` are ever overridden;
/// every other key is sent back exactly as the service produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState(Map<String, Value>);

impl WorkflowState {
    /// Wrap a payload if it is a JSON object
    pub fn from_payload(payload: &Value) -> Option<Self> {
        payload.as_object().cloned().map(Self)
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.0.get("chatId").and_then(Value::as_str)
    }

    pub fn response_chat_item_id(&self) -> Option<&str> {
        self.0.get("responseChatItemId").and_then(Value::as_str)
    }

    /// Set a string field if the state does not already carry a string there
    pub fn fill_missing(&mut self, key: &str, value: Option<&str>) {
        if self.0.get(key).and_then(Value::as_str).is_some() {
            return;
        }
        if let Some(value) = value {
            self.0.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Correlation identifiers captured when a prompt was issued
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResumeContext {
    pub chat_id: Option<String>,
    pub response_chat_item_id: Option<String>,
    pub workflow_state: Option<WorkflowState>,
}

/// A paused workflow's question to the user
#[derive(Debug, Clone, PartialEq)]
pub struct InteractivePrompt {
    pub kind: PromptKind,
    pub description: String,
    pub options: Vec<SelectOption>,
    pub form_fields: Vec<FormField>,
    /// The prompt payload as received; echoed back on resume
    pub payload: Value,
    pub resume: ResumeContext,
}

impl InteractivePrompt {
    /// Recognize a prompt payload.
    ///
    /// Returns `None` unless it is a `userSelect` with at least one option or
    /// a `userInput` with at least one form field.
    pub fn from_payload(payload: Value, resume: ResumeContext) -> Option<Self> {
        let kind = match payload.get("type").and_then(Value::as_str)? {
            "userSelect" => PromptKind::UserSelect,
            "userInput" => PromptKind::UserInput,
            _ => return None,
        };
        let params = payload.get("params");
        let description = params
            .and_then(|p| p.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string);

        match kind {
            PromptKind::UserSelect => {
                let options = parse_list::<SelectOption>(params, "userSelectOptions");
                if options.is_empty() {
                    return None;
                }
                Some(Self {
                    kind,
                    description: description
                        .unwrap_or_else(|| DEFAULT_SELECT_DESCRIPTION.to_string()),
                    options,
                    form_fields: Vec::new(),
                    payload,
                    resume,
                })
            }
            PromptKind::UserInput => {
                let form_fields = parse_list::<FormField>(params, "inputForm");
                if form_fields.is_empty() {
                    return None;
                }
                Some(Self {
                    kind,
                    description: description
                        .unwrap_or_else(|| DEFAULT_FORM_DESCRIPTION.to_string()),
                    options: Vec::new(),
                    form_fields,
                    payload,
                    resume,
                })
            }
        }
    }

    /// Find an option by key, falling back to its value
    pub fn find_option(&self, selection: &str) -> Option<&SelectOption> {
        self.options
            .iter()
            .find(|o| o.key == selection)
            .or_else(|| self.options.iter().find(|o| o.value == selection))
    }

    /// Pre-filled form values in field order
    pub fn form_defaults(&self) -> Vec<(String, String)> {
        self.form_fields
            .iter()
            .filter_map(|f| f.prefill().map(|v| (f.key.clone(), v.to_string())))
            .collect()
    }
}

/// Parse `params[key]` as a list, skipping entries that do not fit `T`
fn parse_list<T: serde::de::DeserializeOwned>(params: Option<&Value>, key: &str) -> Vec<T> {
    params
        .and_then(|p| p.get(key))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}
