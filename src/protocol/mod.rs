// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Wire protocol for the streaming chat service
//!
//! The service answers a turn with a server-sent-event style body: `event:`
//! lines name the payloads that follow, `data:` lines carry one JSON payload
//! each, and `data: [DONE]` ends the answer. [`StreamDecoder`] turns raw
//! bytes into [`ProtocolEvent`]s and [`RenderGate`] decides whether the
//! accumulated answer is safe to show while it is still arriving.

pub mod decoder;
pub mod suppression;

pub use decoder::StreamDecoder;
pub use suppression::RenderGate;

use serde_json::Value;

/// Event name that carries an interactive sub-prompt
pub const INTERACTIVE_EVENT: &str = "interactive";

/// Event name for answer deltas (also the default when no name is given)
pub const ANSWER_EVENT: &str = "answer";

/// Payload that ends the answer stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded event from the answer stream
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// A non-empty piece of answer text
    Delta(String),
    /// The workflow paused on a prompt.
    ///
    /// `envelope` holds the other fields of a wrapped `{"interactive": ..}`
    /// payload, such as `chatId`; it is `None` when the prompt came bare.
    Interactive {
        prompt: Value,
        envelope: Option<Value>,
    },
    /// Any other named event, surfaced as-is
    Generic { name: String, payload: Value },
    /// The `[DONE]` sentinel
    Done,
}

/// Pull the answer text out of an answer payload.
///
/// Checks `choices[0].delta.content`, `choices[0].message.content`,
/// `data.answer` and `answer` in that order. The first string found wins,
/// even when empty.
pub fn extract_delta(payload: &Value) -> Option<&str> {
    let first_choice = payload.get("choices").and_then(|c| c.get(0));

    first_choice
        .and_then(|c| c.pointer("/delta/content"))
        .and_then(Value::as_str)
        .or_else(|| {
            first_choice
                .and_then(|c| c.pointer("/message/content"))
                .and_then(Value::as_str)
        })
        .or_else(|| payload.pointer("/data/answer").and_then(Value::as_str))
        .or_else(|| payload.get("answer").and_then(Value::as_str))
}

/// Whether a payload describes the running workflow graph.
///
/// Such payloads carry `nodes`, `edges` and `chatId` and are cached as the
/// state needed to resume a paused workflow.
pub fn is_workflow_graph(payload: &Value) -> bool {
    payload.as_object().is_some_and(|obj| {
        obj.contains_key("nodes") && obj.contains_key("edges") && obj.contains_key("chatId")
    })
}
