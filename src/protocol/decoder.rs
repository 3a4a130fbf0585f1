// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Incremental decoder for the answer stream
//!
//! Chunks may split anywhere, including inside a UTF-8 code point, so the
//! decoder buffers raw bytes and only decodes complete lines.

use serde_json::Value;

use super::{extract_delta, ProtocolEvent, ANSWER_EVENT, DONE_SENTINEL, INTERACTIVE_EVENT};

/// Turns raw response bytes into [`ProtocolEvent`]s
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes of the trailing, not yet terminated line
    buffer: Vec<u8>,
    /// Name set by the last `event:` line, cleared by a blank line
    event_name: Option<String>,
    /// Set once `[DONE]` has been seen; later input is ignored
    finished: bool,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been decoded
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one chunk and return the events completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.extend_from_slice(chunk);

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();

            if let Some(event) = self.decode_line(&text) {
                events.push(event);
            }
            if self.finished {
                self.buffer.clear();
                break;
            }
        }

        events
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        if self.finished || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }

        let rest = std::mem::take(&mut self.buffer);
        let text = String::from_utf8_lossy(&rest).into_owned();
        self.decode_line(&text).into_iter().collect()
    }

    fn decode_line(&mut self, line: &str) -> Option<ProtocolEvent> {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            self.event_name = None;
            return None;
        }

        if let Some(name) = trimmed.strip_prefix("event:") {
            let name = name.trim();
            self.event_name = (!name.is_empty()).then(|| name.to_string());
            return None;
        }

        let data = trimmed.strip_prefix("data:")?.trim();

        if data == DONE_SENTINEL {
            self.finished = true;
            return Some(ProtocolEvent::Done);
        }

        let payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(
                    target: "parley.protocol.decoder",
                    error = %e,
                    event = self.event_name.as_deref().unwrap_or(ANSWER_EVENT),
                    "Skipping malformed payload"
                );
                return None;
            }
        };

        self.classify(payload)
    }

    fn classify(&self, payload: Value) -> Option<ProtocolEvent> {
        match self.event_name.as_deref() {
            Some(INTERACTIVE_EVENT) => {
                let (prompt, envelope) = match payload {
                    Value::Object(mut obj)
                        if obj.get("interactive").is_some_and(|v| !v.is_null()) =>
                    {
                        let prompt = obj.remove("interactive").unwrap_or(Value::Null);
                        (prompt, Some(Value::Object(obj)))
                    }
                    other => (other, None),
                };
                Some(ProtocolEvent::Interactive { prompt, envelope })
            }
            None | Some(ANSWER_EVENT) => extract_delta(&payload)
                .filter(|delta| !delta.is_empty())
                .map(|delta| ProtocolEvent::Delta(delta.to_string())),
            Some(name) => Some(ProtocolEvent::Generic {
                name: name.to_string(),
                payload,
            }),
        }
    }
}
