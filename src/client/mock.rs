// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Mock chat backend for testing
//!
//! Replays scripted stream bodies and records every request so tests can
//! drive a session without a network.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, ParleyError, Result};
use crate::transcript::{parse_records, HistoryRecord};

use super::backend::{records_list, ByteStream, ChatBackend, ChatRequest, RecordsQuery};

/// A scripted reply to one chat request
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Deliver these chunks, then end the body
    Chunks(Vec<Vec<u8>>),
    /// Deliver these chunks, then never finish
    Stall(Vec<Vec<u8>>),
    /// Fail the request with a server error
    Error { status: u16, message: String },
}

impl MockReply {
    /// Body made of SSE lines, delivered as one chunk
    pub fn sse(lines: &[&str]) -> Self {
        let mut body = lines.join("\n");
        body.push('\n');
        MockReply::Chunks(vec![body.into_bytes()])
    }

    /// Streaming answer built from text deltas, terminated by `[DONE]`
    pub fn answer(deltas: &[&str]) -> Self {
        let mut lines: Vec<String> = deltas
            .iter()
            .map(|d| {
                format!(
                    "data: {}",
                    serde_json::json!({"choices": [{"delta": {"content": d}}]})
                )
            })
            .collect();
        lines.push("data: [DONE]".to_string());
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        Self::sse(&refs)
    }
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<MockReply>,
    requests: Vec<Value>,
    records: Vec<Value>,
    record_queries: Vec<RecordsQuery>,
    deleted: Vec<Vec<String>>,
}

/// A mock chat backend for testing
#[derive(Clone)]
pub struct MockBackend {
    app_id: String,
    configured: bool,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            app_id: "mock-app".to_string(),
            configured: true,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A backend that reports missing configuration
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Queue a reply for the next chat request
    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn push_reply(&self, reply: MockReply) {
        if let Ok(mut state) = self.state.lock() {
            state.replies.push_back(reply);
        }
    }

    /// Set the raw items returned by history fetches
    pub fn with_records(self, records: Vec<Value>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.records = records;
        }
        self
    }

    /// Request bodies sent so far
    pub fn requests(&self) -> Vec<Value> {
        self.state
            .lock()
            .map(|s| s.requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().map(|s| s.requests.len()).unwrap_or(0)
    }

    pub fn record_queries(&self) -> Vec<RecordsQuery> {
        self.state
            .lock()
            .map(|s| s.record_queries.clone())
            .unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<Vec<String>> {
        self.state
            .lock()
            .map(|s| s.deleted.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| ParleyError::Api(ApiError::Network("mock state poisoned".to_string())))
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(ParleyError::Config("mock backend is not configured".to_string()))
        }
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream> {
        let body = request.to_body(&self.app_id)?;
        let reply = {
            let mut state = self.lock()?;
            state.requests.push(body);
            state.replies.pop_front()
        };

        match reply {
            Some(MockReply::Chunks(chunks)) => Ok(Box::pin(stream::iter(
                chunks.into_iter().map(Ok::<Vec<u8>, ParleyError>),
            ))),
            Some(MockReply::Stall(chunks)) => {
                let head = stream::iter(chunks.into_iter().map(Ok::<Vec<u8>, ParleyError>));
                Ok(Box::pin(head.chain(stream::pending())))
            }
            Some(MockReply::Error { status, message }) => {
                Err(ApiError::ServerError { status, message }.into())
            }
            None => Ok(Box::pin(stream::empty::<Result<Vec<u8>>>())),
        }
    }

    async fn fetch_records(&self, query: &RecordsQuery) -> Result<Vec<HistoryRecord>> {
        let mut state = self.lock()?;
        state.record_queries.push(query.clone());
        let response = serde_json::json!({"data": {"list": state.records.clone()}});
        Ok(parse_records(records_list(&response)))
    }

    async fn delete_chats(&self, chat_ids: &[String]) -> Result<()> {
        self.lock()?.deleted.push(chat_ids.to_vec());
        Ok(())
    }
}
