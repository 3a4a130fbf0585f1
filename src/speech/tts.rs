// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Text-to-speech

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::config::Settings;
use crate::error::{ParleyError, Result};

use super::{first_text, output_node, AudioClip, SpeechEndpoint};

const SYNTHESIS_PATH: &str = "/api/v1/services/aigc/multimodal-generation/generation";

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioClip>;
}

/// DashScope multimodal-generation synthesis
#[derive(Debug, Clone)]
pub struct DashScopeSynthesizer {
    endpoint: SpeechEndpoint,
    model: String,
    voice: String,
    language: String,
}

impl DashScopeSynthesizer {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: SpeechEndpoint::new(base_url, api_key),
            model: model.into(),
            voice: voice.into(),
            language: language.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let speech = &settings.speech;
        Self::new(
            &speech.base_url,
            settings.get_speech_api_key(),
            speech.tts_model.clone(),
            speech.voice.clone(),
            speech.tts_language.clone(),
        )
    }

    fn request_body(&self, text: &str) -> Value {
        json!({
            "model": self.model,
            "input": {
                "text": text,
                "voice": self.voice,
                "language_type": self.language,
            },
        })
    }
}

#[async_trait]
impl Synthesizer for DashScopeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        let response = self
            .endpoint
            .post(SYNTHESIS_PATH, &self.request_body(text))
            .await?;
        parse_synthesis(&response)
    }
}

/// Find the audio in a synthesis response. A URL wins over inline data.
pub fn parse_synthesis(response: &Value) -> Result<AudioClip> {
    let output = output_node(response);
    let audio = output.get("audio");

    let url = first_text([
        audio.and_then(|a| a.get("url")),
        output.get("audio_url"),
        output.get("audioUrl"),
        response.get("audio_url"),
    ]);
    if let Some(url) = url {
        return Ok(AudioClip::Url(url.to_string()));
    }

    let encoded = first_text([
        audio.and_then(|a| a.get("data")),
        audio,
        output.get("audio_base64"),
        output.pointer("/choices/0/audio"),
        output.pointer("/data/0/audio"),
    ])
    .ok_or_else(|| ParleyError::Decode("no audio in synthesis response".to_string()))?;

    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ParleyError::Decode(format!("invalid audio payload: {e}")))?;
    let mime = match output.get("audio_format").and_then(Value::as_str) {
        Some("mp3") => "audio/mpeg",
        _ => "audio/wav",
    };
    Ok(AudioClip::Bytes {
        mime: mime.to_string(),
        data,
    })
}

/// Memoizes clips per text; failures are not cached
pub struct CachedSynthesizer<S> {
    inner: S,
    cache: Mutex<HashMap<String, AudioClip>>,
}

impl<S: Synthesizer> CachedSynthesizer<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.cache.lock().await.len()
    }

    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

#[async_trait]
impl<S: Synthesizer> Synthesizer for CachedSynthesizer<S> {
    async fn synthesize(&self, text: &str) -> Result<AudioClip> {
        if let Some(clip) = self.cache.lock().await.get(text) {
            return Ok(clip.clone());
        }
        let clip = self.inner.synthesize(text).await?;
        self.cache
            .lock()
            .await
            .insert(text.to_string(), clip.clone());
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_parse_url_wins() {
        let response = json!({
            "output": {"audio": {"url": "https://cdn/a.wav", "data": "AAAA"}}
        });
        assert_eq!(
            parse_synthesis(&response).unwrap(),
            AudioClip::Url("https://cdn/a.wav".to_string())
        );
    }

    #[test]
    fn test_parse_inline_shapes() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"RIFF");
        let shapes = [
            json!({"output": {"audio": {"data": encoded}}}),
            json!({"output": {"audio": encoded}}),
            json!({"data": {"audio_base64": encoded}}),
            json!({"output": {"choices": [{"audio": encoded}]}}),
            json!({"output": {"data": [{"audio": encoded}]}}),
        ];
        for response in shapes {
            let clip = parse_synthesis(&response).unwrap();
            assert_eq!(
                clip,
                AudioClip::Bytes {
                    mime: "audio/wav".to_string(),
                    data: b"RIFF".to_vec()
                },
                "shape {response}"
            );
        }
    }

    #[test]
    fn test_parse_mp3_format() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"ID3");
        let response = json!({"output": {"audio": encoded, "audio_format": "mp3"}});
        match parse_synthesis(&response).unwrap() {
            AudioClip::Bytes { mime, .. } => assert_eq!(mime, "audio/mpeg"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_missing_audio() {
        let err = parse_synthesis(&json!({"output": {}})).unwrap_err();
        assert!(matches!(err, ParleyError::Decode(_)));
    }

    #[test]
    fn test_request_body() {
        let tts = DashScopeSynthesizer::new("https://x/", Some("k".into()), "m", "Cherry", "Chinese");
        let body = tts.request_body("你好");
        assert_eq!(body["model"], "m");
        assert_eq!(body["input"]["voice"], "Cherry");
        assert_eq!(body["input"]["language_type"], "Chinese");
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl Synthesizer for Counting {
        async fn synthesize(&self, text: &str) -> Result<AudioClip> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(AudioClip::Url(format!("https://cdn/{text}")))
        }
    }

    #[tokio::test]
    async fn test_cache_hits_once_per_text() {
        let cached = CachedSynthesizer::new(Counting(AtomicUsize::new(0)));
        cached.synthesize("a").await.unwrap();
        cached.synthesize("a").await.unwrap();
        cached.synthesize("b").await.unwrap();
        assert_eq!(cached.inner.0.load(Ordering::SeqCst), 2);
        assert_eq!(cached.len().await, 2);
    }
}
