// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Speech collaborators
//!
//! Text-to-speech and speech-to-text behind small traits, with HTTP
//! implementations for DashScope-style endpoints.

pub mod asr;
pub mod tts;

pub use asr::{resolve_format, AudioInput, DashScopeTranscriber, Transcriber};
pub use tts::{CachedSynthesizer, DashScopeSynthesizer, Synthesizer};

use reqwest::Client;
use serde_json::Value;

use crate::error::{ParleyError, Result};

/// Synthesized audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioClip {
    /// Audio hosted by the service
    Url(String),
    /// Inline audio
    Bytes { mime: String, data: Vec<u8> },
}

impl AudioClip {
    /// File extension matching the clip's format
    pub fn extension(&self) -> &'static str {
        match self {
            AudioClip::Bytes { mime, .. } if mime == "audio/mpeg" => "mp3",
            _ => "wav",
        }
    }
}

/// Connection details shared by the speech clients
#[derive(Debug, Clone)]
struct SpeechEndpoint {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SpeechEndpoint {
    fn new(base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ParleyError::Config("speech API key is not set".to_string()))?;
        let url = format!("{}{path}", self.base_url);

        tracing::debug!(target: "parley.speech", %url, "POST");
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {key}"))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ParleyError::Speech(if text.trim().is_empty() {
                format!("request failed: {}", status.as_u16())
            } else {
                text
            }));
        }

        response
            .json()
            .await
            .map_err(|e| ParleyError::Decode(format!("speech response: {e}")))
    }
}

/// The object carrying results: `output`, else `data`, else the whole response
fn output_node(response: &Value) -> &Value {
    ["output", "data"]
        .iter()
        .filter_map(|key| response.get(*key))
        .find(|node| !node.is_null())
        .unwrap_or(response)
}

/// First non-empty string among the candidates
fn first_text<'a>(candidates: impl IntoIterator<Item = Option<&'a Value>>) -> Option<&'a str> {
    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .find(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_output_node_fallbacks() {
        let response = json!({"output": {"text": "a"}});
        assert_eq!(output_node(&response), &json!({"text": "a"}));

        let response = json!({"output": null, "data": {"text": "b"}});
        assert_eq!(output_node(&response), &json!({"text": "b"}));

        let response = json!({"text": "c"});
        assert_eq!(output_node(&response), &response);
    }

    #[test]
    fn test_clip_extension() {
        let clip = AudioClip::Bytes {
            mime: "audio/mpeg".to_string(),
            data: vec![],
        };
        assert_eq!(clip.extension(), "mp3");
        assert_eq!(AudioClip::Url("u".to_string()).extension(), "wav");
    }
}
