// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Speech-to-text

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::path::Path;

use crate::config::Settings;
use crate::error::{ParleyError, Result};

use super::{first_text, output_node, SpeechEndpoint};

const RECOGNITION_PATH: &str = "/api/v1/services/audio/asr";

/// Recorded audio with its container format (`wav`, `webm`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub data: Vec<u8>,
    pub format: String,
}

impl AudioInput {
    pub fn new(data: Vec<u8>, format: impl Into<String>) -> Self {
        Self {
            data,
            format: format.into(),
        }
    }

    /// Read a file, taking the format from `format` or the file extension
    pub fn from_path(path: &Path, format: Option<&str>) -> Result<Self> {
        let data = std::fs::read(path)?;
        let hint = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Ok(Self::new(data, resolve_format(format, hint)))
    }
}

/// Pick the format: explicit value, else one recognized in the mime/extension hint
pub fn resolve_format(explicit: Option<&str>, hint: &str) -> String {
    if let Some(format) = explicit.filter(|f| !f.is_empty()) {
        return format.to_string();
    }
    ["webm", "ogg", "wav"]
        .into_iter()
        .find(|known| hint.contains(known))
        .unwrap_or("audio")
        .to_string()
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioInput) -> Result<String>;
}

/// DashScope recognition
#[derive(Debug, Clone)]
pub struct DashScopeTranscriber {
    endpoint: SpeechEndpoint,
    model: String,
    language: String,
    sample_rate: u32,
}

impl DashScopeTranscriber {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        language: impl Into<String>,
        sample_rate: u32,
    ) -> Self {
        Self {
            endpoint: SpeechEndpoint::new(base_url, api_key),
            model: model.into(),
            language: language.into(),
            sample_rate,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let speech = &settings.speech;
        Self::new(
            &speech.base_url,
            settings.get_speech_api_key(),
            speech.asr_model.clone(),
            speech.asr_language.clone(),
            speech.sample_rate,
        )
    }

    fn request_body(&self, audio: &AudioInput) -> Value {
        json!({
            "model": self.model,
            "input": {
                "audio": base64::engine::general_purpose::STANDARD.encode(&audio.data),
            },
            "parameters": {
                "sample_rate": self.sample_rate,
                "format": audio.format,
                "language": self.language,
            },
        })
    }
}

#[async_trait]
impl Transcriber for DashScopeTranscriber {
    async fn transcribe(&self, audio: &AudioInput) -> Result<String> {
        let response = self
            .endpoint
            .post(RECOGNITION_PATH, &self.request_body(audio))
            .await?;
        let text = parse_transcription(&response)?;
        tracing::debug!(target: "parley.speech", chars = text.chars().count(), "Transcribed");
        Ok(text)
    }
}

/// Find the recognized text in a response
pub fn parse_transcription(response: &Value) -> Result<String> {
    let output = output_node(response);
    first_text(
        ["text", "result", "sentence", "transcription"]
            .into_iter()
            .map(|key| output.get(key)),
    )
    .map(str::to_string)
    .ok_or_else(|| ParleyError::Decode("no text in recognition response".to_string()))
}
