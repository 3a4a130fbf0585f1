// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Chat service backend trait and request types

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::pin::Pin;

use crate::error::Result;
use crate::interactive::{ResumeRequest, WorkflowState};
use crate::transcript::{HistoryRecord, Turn};

/// Raw response body chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Default number of records fetched per history page
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Single message sent when resuming a paused workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailMessage {
    pub data_id: String,
    #[serde(rename = "hideInUI")]
    pub hide_in_ui: bool,
    pub role: String,
    pub content: String,
}

impl DetailMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            data_id: uuid::Uuid::new_v4().to_string(),
            hide_in_ui: false,
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// The `messages` field of a chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestMessages {
    /// Full turn history for a new turn
    History(Vec<Turn>),
    /// One detail message answering an interactive prompt
    Detail(DetailMessage),
}

/// One streaming chat turn submission
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub chat_id: String,
    pub messages: RequestMessages,
    /// Cached workflow graph, spread into the body as-is
    pub workflow_state: Option<WorkflowState>,
    pub interactive: Option<Value>,
    pub response_chat_item_id: Option<String>,
}

impl ChatRequest {
    /// A new turn carrying the given history
    pub fn new(chat_id: impl Into<String>, turns: Vec<Turn>) -> Self {
        Self {
            chat_id: chat_id.into(),
            messages: RequestMessages::History(turns),
            workflow_state: None,
            interactive: None,
            response_chat_item_id: None,
        }
    }

    /// A resumption of a paused workflow
    pub fn resume(request: ResumeRequest) -> Self {
        Self {
            chat_id: request.chat_id,
            messages: RequestMessages::Detail(DetailMessage::user(request.content)),
            workflow_state: request.workflow_state,
            interactive: Some(request.interactive),
            response_chat_item_id: request.response_chat_item_id,
        }
    }

    /// JSON body for `/api/v1/chat/completions`
    pub fn to_body(&self, app_id: &str) -> Result<Value> {
        let mut body: Map<String, Value> = self
            .workflow_state
            .clone()
            .map(WorkflowState::into_map)
            .unwrap_or_default();

        let messages = match &self.messages {
            RequestMessages::History(turns) => serde_json::to_value(turns)?,
            RequestMessages::Detail(message) => serde_json::to_value([message])?,
        };

        body.insert("appId".to_string(), json!(app_id));
        body.insert("chatId".to_string(), json!(self.chat_id));
        body.insert("messages".to_string(), messages);
        body.insert("stream".to_string(), json!(true));
        body.insert("detail".to_string(), json!(true));
        body.insert("retainDatasetCite".to_string(), json!(false));
        if let Some(interactive) = &self.interactive {
            body.insert("interactive".to_string(), interactive.clone());
        }
        if let Some(id) = &self.response_chat_item_id {
            body.insert("responseChatItemId".to_string(), json!(id));
        }

        Ok(Value::Object(body))
    }
}

/// Parameters of one history page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordsQuery {
    pub chat_id: String,
    /// Record id to page from; empty for the latest page
    pub initial_id: String,
    pub page_size: u32,
}

impl RecordsQuery {
    pub fn latest(chat_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            chat_id: chat_id.into(),
            initial_id: String::new(),
            page_size,
        }
    }

    /// JSON body for `/api/core/chat/getRecords_v2`
    pub fn to_body(&self, app_id: &str) -> Value {
        json!({
            "initialId": self.initial_id,
            "pageSize": self.page_size,
            "chatId": self.chat_id,
            "appId": app_id,
            "retainDatasetCite": false,
        })
    }
}

/// Records list from a history response: `data.list`, then `list`
pub fn records_list(response: &Value) -> &[Value] {
    response
        .pointer("/data/list")
        .and_then(Value::as_array)
        .or_else(|| response.get("list").and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Remote chat service operations
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Application identifier requests are made under
    fn app_id(&self) -> &str;

    /// Fail with a configuration error if the backend cannot make requests
    fn ensure_configured(&self) -> Result<()> {
        Ok(())
    }

    /// Submit a turn and return the streaming response body
    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream>;

    /// Fetch one page of stored records
    async fn fetch_records(&self, query: &RecordsQuery) -> Result<Vec<HistoryRecord>>;

    /// Delete conversations by id
    async fn delete_chats(&self, chat_ids: &[String]) -> Result<()>;
}
