// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! HTTP implementation of the chat backend

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::{ApiError, ParleyError, Result};
use crate::transcript::{parse_records, HistoryRecord};

use super::backend::{records_list, ByteStream, ChatBackend, ChatRequest, RecordsQuery};

const COMPLETIONS_PATH: &str = "/api/v1/chat/completions";
const RECORDS_PATH: &str = "/api/core/chat/getRecords_v2";
const BATCH_DELETE_PATH: &str = "/api/core/chat/history/batchDelete";

/// Chat service reached over HTTP
pub struct HttpBackend {
    client: Client,
    base_url: Option<String>,
    app_id: Option<String>,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Create a backend. Missing values surface as configuration errors on use.
    pub fn new(base_url: Option<String>, app_id: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
            app_id,
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    /// Create from settings, resolving env vars
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.get_base_url(),
            settings.get_app_id(),
            settings.get_api_key(),
        )
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        let base = self
            .base_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ParleyError::Config("service base URL is not set".to_string()))?;
        Ok(format!("{base}{path}"))
    }

    fn require_app_id(&self) -> Result<&str> {
        self.app_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ParleyError::Config("app identifier is not set".to_string()))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint(path)?;
        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        tracing::debug!(target: "parley.client", %url, "POST");
        let response = req.json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(
                target: "parley.client",
                status = status.as_u16(),
                %url,
                "Request failed"
            );
            return Err(error_from_status(status.as_u16(), &text));
        }
        Ok(response)
    }
}

/// Build the error for a non-success response
fn error_from_status(status: u16, body: &str) -> ParleyError {
    let message = if body.trim().is_empty() {
        format!("request failed: {status}")
    } else {
        body.to_string()
    };
    ApiError::ServerError { status, message }.into()
}

#[async_trait]
impl ChatBackend for HttpBackend {
    fn app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or_default()
    }

    fn ensure_configured(&self) -> Result<()> {
        self.endpoint("")?;
        self.require_app_id()?;
        Ok(())
    }

    async fn stream_chat(&self, request: &ChatRequest) -> Result<ByteStream> {
        let body = request.to_body(self.require_app_id()?)?;
        let response = self.post(COMPLETIONS_PATH, &body).await?;

        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ParleyError::Api(ApiError::StreamError(e.to_string())))
        });
        Ok(Box::pin(stream))
    }

    async fn fetch_records(&self, query: &RecordsQuery) -> Result<Vec<HistoryRecord>> {
        let body = query.to_body(self.require_app_id()?);
        let response = self.post(RECORDS_PATH, &body).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;

        let records = parse_records(records_list(&value));
        tracing::debug!(
            target: "parley.client",
            chat_id = %query.chat_id,
            records = records.len(),
            "Fetched records"
        );
        Ok(records)
    }

    async fn delete_chats(&self, chat_ids: &[String]) -> Result<()> {
        let body = json!({
            "appId": self.require_app_id()?,
            "chatIds": chat_ids,
        });
        self.post(BATCH_DELETE_PATH, &body).await?;
        Ok(())
    }
}
