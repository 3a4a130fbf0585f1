// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Pause/resume state for interactive prompts
//!
//! The machine is either idle or awaiting an answer to exactly one prompt.
//! Answering validates the input against the prompt, resolves the
//! correlation identifiers the service needs to reattach the answer to the
//! paused node, and hands back a [`ResumeRequest`].

use serde_json::{json, Map, Value};

use crate::error::{ParleyError, Result};
use crate::protocol::is_workflow_graph;

use super::prompt::{
    FormField, InteractivePrompt, PromptKind, ResumeContext, SelectOption, WorkflowState,
};

/// Most recently observed correlation identifiers for a conversation
#[derive(Debug, Clone, Default)]
pub struct Correlation {
    chat_id: Option<String>,
    response_chat_item_id: Option<String>,
    workflow_state: Option<WorkflowState>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record identifiers carried by a service event payload
    pub fn observe(&mut self, payload: &Value) {
        if let Some(id) = payload.get("responseChatItemId").and_then(Value::as_str) {
            self.response_chat_item_id = Some(id.to_string());
        }
        if let Some(id) = payload.get("chatId").and_then(Value::as_str) {
            self.chat_id = Some(id.to_string());
        }
        if is_workflow_graph(payload) {
            if let Some(mut state) = WorkflowState::from_payload(payload) {
                state.fill_missing("chatId", self.chat_id.as_deref());
                state.fill_missing(
                    "responseChatItemId",
                    self.response_chat_item_id.as_deref(),
                );
                tracing::debug!(
                    target: "parley.interactive",
                    chat_id = ?state.chat_id(),
                    "Cached workflow state"
                );
                self.workflow_state = Some(state);
            }
        }
    }

    /// Snapshot to attach to a newly issued prompt
    pub fn resume_context(&self) -> ResumeContext {
        ResumeContext {
            chat_id: self.chat_id.clone(),
            response_chat_item_id: self.response_chat_item_id.clone(),
            workflow_state: self.workflow_state.clone(),
        }
    }

    pub fn chat_id(&self) -> Option<&str> {
        self.chat_id.as_deref()
    }

    pub fn response_chat_item_id(&self) -> Option<&str> {
        self.response_chat_item_id.as_deref()
    }

    pub fn workflow_state(&self) -> Option<&WorkflowState> {
        self.workflow_state.as_ref()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The user's answer to a pending prompt
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveAnswer {
    /// Option key (or value) of a select prompt
    Select(String),
    /// Field key to value pairs of a form prompt; unset fields keep their prefill
    Form(Vec<(String, String)>),
}

/// What was answered, for logging into the transcript
#[derive(Debug, Clone, PartialEq)]
pub enum AnsweredPrompt {
    Select {
        description: String,
        options: Vec<SelectOption>,
        selected: SelectOption,
    },
    Form {
        description: String,
        fields: Vec<FormField>,
        values: Vec<(String, String)>,
    },
}

/// Everything needed to resume a paused workflow
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeRequest {
    /// Turn content sent as the single request message
    pub content: String,
    pub chat_id: String,
    pub response_chat_item_id: Option<String>,
    pub workflow_state: Option<WorkflowState>,
    /// Prompt payload with the user's answer attached
    pub interactive: Value,
    pub answered: AnsweredPrompt,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum PromptState {
    #[default]
    Idle,
    AwaitingAnswer(Box<InteractivePrompt>),
}

/// Tracks the single pending prompt of a session
#[derive(Debug, Clone, Default)]
pub struct InteractiveMachine {
    state: PromptState,
}

impl InteractiveMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PromptState {
        &self.state
    }

    pub fn pending(&self) -> Option<&InteractivePrompt> {
        match &self.state {
            PromptState::AwaitingAnswer(prompt) => Some(prompt),
            PromptState::Idle => None,
        }
    }

    pub fn is_awaiting(&self) -> bool {
        self.pending().is_some()
    }

    /// Handle an interactive event. Unrecognized payloads leave the state unchanged.
    pub fn on_interactive(
        &mut self,
        payload: Value,
        correlation: &Correlation,
    ) -> Option<&InteractivePrompt> {
        let prompt = InteractivePrompt::from_payload(payload, correlation.resume_context())?;
        tracing::debug!(
            target: "parley.interactive",
            kind = ?prompt.kind,
            options = prompt.options.len(),
            fields = prompt.form_fields.len(),
            "Workflow paused on prompt"
        );
        self.state = PromptState::AwaitingAnswer(Box::new(prompt));
        self.pending()
    }

    /// Drop any pending prompt
    pub fn abandon(&mut self) -> Option<InteractivePrompt> {
        match std::mem::take(&mut self.state) {
            PromptState::AwaitingAnswer(prompt) => Some(*prompt),
            PromptState::Idle => None,
        }
    }

    /// Answer the pending prompt.
    ///
    /// On a validation failure the prompt stays pending.
    pub fn answer(
        &mut self,
        answer: InteractiveAnswer,
        correlation: &Correlation,
        session_id: &str,
        response_chat_item_id: Option<&str>,
    ) -> Result<ResumeRequest> {
        let prompt = self
            .pending()
            .ok_or_else(|| ParleyError::Precondition("no interactive prompt pending".to_string()))?;

        let (content, attachment, answered) = match (prompt.kind, answer) {
            (PromptKind::UserSelect, InteractiveAnswer::Select(selection)) => {
                let selected = prompt.find_option(&selection).cloned().ok_or_else(|| {
                    ParleyError::Precondition(format!("unknown option: {selection}"))
                })?;
                let attachment = (
                    "userSelect",
                    json!({"key": selected.key, "value": selected.value}),
                );
                let answered = AnsweredPrompt::Select {
                    description: prompt.description.clone(),
                    options: prompt.options.clone(),
                    selected: selected.clone(),
                };
                (selected.value, attachment, answered)
            }
            (PromptKind::UserInput, InteractiveAnswer::Form(input)) => {
                let values = resolve_form_values(&prompt.form_fields, &prompt.form_defaults(), input)?;
                let map: Map<String, Value> = values
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                let content = serde_json::to_string(&map)?;
                let answered = AnsweredPrompt::Form {
                    description: prompt.description.clone(),
                    fields: prompt.form_fields.clone(),
                    values,
                };
                (content, ("userInputForm", Value::Object(map)), answered)
            }
            (PromptKind::UserSelect, InteractiveAnswer::Form(_)) => {
                return Err(ParleyError::Precondition(
                    "pending prompt expects a selection".to_string(),
                ))
            }
            (PromptKind::UserInput, InteractiveAnswer::Select(_)) => {
                return Err(ParleyError::Precondition(
                    "pending prompt expects form input".to_string(),
                ))
            }
        };

        let base = prompt
            .resume
            .workflow_state
            .clone()
            .or_else(|| correlation.workflow_state().cloned());

        let response_chat_item_id = response_chat_item_id
            .map(str::to_string)
            .or_else(|| prompt.resume.response_chat_item_id.clone())
            .or_else(|| {
                base.as_ref()
                    .and_then(|s| s.response_chat_item_id())
                    .map(str::to_string)
            })
            .or_else(|| correlation.response_chat_item_id().map(str::to_string));

        let chat_id = base
            .as_ref()
            .and_then(|s| s.chat_id())
            .or_else(|| correlation.chat_id())
            .unwrap_or(session_id)
            .to_string();

        let mut interactive = match &prompt.payload {
            Value::Object(obj) => obj.clone(),
            _ => Map::new(),
        };
        interactive.insert(attachment.0.to_string(), attachment.1);

        self.state = PromptState::Idle;

        Ok(ResumeRequest {
            content,
            chat_id,
            response_chat_item_id,
            workflow_state: base,
            interactive: Value::Object(interactive),
            answered,
        })
    }
}

/// Merge user input over prefilled values and validate against the fields
fn resolve_form_values(
    fields: &[FormField],
    defaults: &[(String, String)],
    input: Vec<(String, String)>,
) -> Result<Vec<(String, String)>> {
    let mut merged: Vec<(String, String)> = defaults.to_vec();

    for (key, value) in input {
        let field = fields
            .iter()
            .find(|f| f.key == key)
            .ok_or_else(|| ParleyError::Precondition(format!("unknown form field: {key}")))?;
        if !value.is_empty() && !field.accepts(&value) {
            return Err(ParleyError::Precondition(format!(
                "{} does not accept {value}",
                field.display_label()
            )));
        }
        merged.retain(|(k, _)| *k != key);
        merged.push((key, value));
    }

    let mut values = Vec::new();
    for field in fields {
        let value = merged
            .iter()
            .find(|(k, _)| *k == field.key)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty());
        match value {
            Some(value) => values.push((field.key.clone(), value)),
            None if field.required => {
                return Err(ParleyError::Precondition(format!(
                    "required field missing: {}",
                    field.display_label()
                )))
            }
            None => {}
        }
    }
    Ok(values)
}
