// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Settings management for Parley
//!
//! Handles loading and saving settings from ~/.parley/settings.json

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod io;
mod validation;

/// Main settings structure, stored in ~/.parley/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Remote chat service endpoint and identifiers
    #[serde(default)]
    pub service: ServiceConfig,

    /// Streaming render behaviour
    #[serde(default)]
    pub stream: StreamConfig,

    /// History fetch settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Speech synthesis and transcription
    #[serde(default)]
    pub speech: SpeechConfig,

    /// Local key-value store
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Remote chat service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the chat service (trailing slashes are ignored)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Environment variable name for the base URL
    #[serde(default = "default_base_url_env")]
    pub base_url_env: String,

    /// Application identifier the workflow is published under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Environment variable name for the app identifier
    #[serde(default = "default_app_id_env")]
    pub app_id_env: String,

    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

/// Streaming render-suppression thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Characters of leading text after which the render decision is locked
    #[serde(default = "default_preview_threshold_chars")]
    pub preview_threshold_chars: usize,

    /// Leading markers that withhold deltas until the answer is complete
    #[serde(default = "default_suppress_prefixes")]
    pub suppress_prefixes: Vec<String>,
}

/// History fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Records fetched per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Speech collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// API key (if stored directly, not recommended)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_speech_api_key_env")]
    pub api_key_env: String,

    /// Base URL of the speech service
    #[serde(default = "default_speech_base_url")]
    pub base_url: String,

    /// Synthesis model
    #[serde(default = "default_tts_model")]
    pub tts_model: String,

    /// Synthesis voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// Synthesis language
    #[serde(default = "default_tts_language")]
    pub tts_language: String,

    /// Transcription model
    #[serde(default = "default_asr_model")]
    pub asr_model: String,

    /// Transcription language
    #[serde(default = "default_asr_language")]
    pub asr_language: String,

    /// Transcription sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

/// Local key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Store file (defaults to ~/.parley/store.json)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// Default value functions
fn default_base_url_env() -> String {
    "PARLEY_BASE_URL".to_string()
}

fn default_app_id_env() -> String {
    "PARLEY_APP_ID".to_string()
}

fn default_api_key_env() -> String {
    "PARLEY_API_KEY".to_string()
}

fn default_preview_threshold_chars() -> usize {
    12
}

fn default_suppress_prefixes() -> Vec<String> {
    vec!["{".to_string(), "```json".to_string()]
}

fn default_page_size() -> u32 {
    10
}

fn default_speech_api_key_env() -> String {
    "DASHSCOPE_API_KEY".to_string()
}

fn default_speech_base_url() -> String {
    "https://dashscope.aliyuncs.com".to_string()
}

fn default_tts_model() -> String {
    "qwen3-tts-flash".to_string()
}

fn default_voice() -> String {
    "Cherry".to_string()
}

fn default_tts_language() -> String {
    "Chinese".to_string()
}

fn default_asr_model() -> String {
    "paraformer-realtime-v2".to_string()
}

fn default_asr_language() -> String {
    "zh".to_string()
}

fn default_sample_rate() -> u32 {
    16000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            base_url_env: default_base_url_env(),
            app_id: None,
            app_id_env: default_app_id_env(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            preview_threshold_chars: default_preview_threshold_chars(),
            suppress_prefixes: default_suppress_prefixes(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: default_speech_api_key_env(),
            base_url: default_speech_base_url(),
            tts_model: default_tts_model(),
            voice: default_voice(),
            tts_language: default_tts_language(),
            asr_model: default_asr_model(),
            asr_language: default_asr_language(),
            sample_rate: default_sample_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert!(config.base_url.is_none());
        assert!(config.app_id.is_none());
        assert_eq!(config.api_key_env, "PARLEY_API_KEY");
        assert_eq!(config.app_id_env, "PARLEY_APP_ID");
    }

    #[test]
    fn test_stream_config_default() {
        let config = StreamConfig::default();
        assert_eq!(config.preview_threshold_chars, 12);
        assert_eq!(config.suppress_prefixes, vec!["{", "```json"]);
    }

    #[test]
    fn test_speech_config_default() {
        let config = SpeechConfig::default();
        assert_eq!(config.voice, "Cherry");
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.asr_language, "zh");
    }

    #[test]
    fn test_settings_load_from_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nonexistent.json");

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.history.page_size, 10);
    }

    #[test]
    fn test_settings_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"service": {"app_id": "app-1"}}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.service.app_id.as_deref(), Some("app-1"));
        assert_eq!(settings.service.api_key_env, "PARLEY_API_KEY");
        assert_eq!(settings.stream.preview_threshold_chars, 12);
    }

    #[test]
    fn test_settings_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let mut settings = Settings::default();
        settings.service.base_url = Some("http://localhost:3000".to_string());
        settings.stream.preview_threshold_chars = 20;

        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(
            loaded.service.base_url.as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(loaded.stream.preview_threshold_chars, 20);
    }

    #[test]
    fn test_settings_save_preserves_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, r#"{"ui": {"theme": "dark"}}"#).unwrap();

        Settings::default().save_to(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ui"]["theme"], "dark");
        assert!(raw["service"].is_object());
    }

    #[test]
    fn test_storage_path_override() {
        let mut settings = Settings::default();
        settings.storage.path = Some(PathBuf::from("/tmp/parley-store.json"));
        assert_eq!(
            settings.storage_path(),
            PathBuf::from("/tmp/parley-store.json")
        );
    }
}
