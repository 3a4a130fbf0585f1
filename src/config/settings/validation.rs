// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

use crate::error::{ParleyError, Result};

use super::Settings;

/// Read `env_name`, falling back to the configured value. Blank values count as absent.
fn env_or(env_name: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(env_name)
        .ok()
        .or_else(|| configured.cloned())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl Settings {
    /// Get the service base URL, checking env var first. Trailing slashes are stripped.
    pub fn get_base_url(&self) -> Option<String> {
        // Priority: env var > config file.
        env_or(
            &self.service.base_url_env,
            self.service.base_url.as_ref(),
        )
        .map(|url| url.trim_end_matches('/').to_string())
        .filter(|url| !url.is_empty())
    }

    /// Get the app identifier, checking env var first.
    pub fn get_app_id(&self) -> Option<String> {
        env_or(&self.service.app_id_env, self.service.app_id.as_ref())
    }

    /// Get the service API key, checking env var first.
    pub fn get_api_key(&self) -> Option<String> {
        env_or(&self.service.api_key_env, self.service.api_key.as_ref())
    }

    /// Get the speech API key, checking env var first.
    pub fn get_speech_api_key(&self) -> Option<String> {
        env_or(&self.speech.api_key_env, self.speech.api_key.as_ref())
    }

    /// Resolve `(base_url, app_id)` or explain what is missing.
    pub fn require_service(&self) -> Result<(String, String)> {
        let base_url = self.get_base_url().ok_or_else(|| {
            ParleyError::Config(format!(
                "No service base URL found. Set {} or service.base_url in settings.",
                self.service.base_url_env
            ))
        })?;
        let app_id = self.get_app_id().ok_or_else(|| {
            ParleyError::Config(format!(
                "No app identifier found. Set {} or service.app_id in settings.",
                self.service.app_id_env
            ))
        })?;
        Ok((base_url, app_id))
    }

    /// Check the stream thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        if self.stream.preview_threshold_chars == 0 {
            return Err(ParleyError::Config(
                "stream.preview_threshold_chars must be greater than zero".to_string(),
            ));
        }
        if self.history.page_size == 0 {
            return Err(ParleyError::Config(
                "history.page_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Read one setting by its dotted key. Unset optional values read as empty.
    pub fn get_key(&self, key: &str) -> Result<String> {
        let value = match key {
            "service.base_url" => self.service.base_url.clone().unwrap_or_default(),
            "service.app_id" => self.service.app_id.clone().unwrap_or_default(),
            "stream.preview_threshold_chars" => self.stream.preview_threshold_chars.to_string(),
            "history.page_size" => self.history.page_size.to_string(),
            "speech.base_url" => self.speech.base_url.clone(),
            "speech.voice" => self.speech.voice.clone(),
            "storage.path" => self
                .storage
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => return Err(ParleyError::Config(format!("Unknown setting: {key}"))),
        };
        Ok(value)
    }

    /// Update one setting by its dotted key. An empty value clears optional settings.
    ///
    /// Leaves `self` untouched when the result would not validate.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        let optional = |value: &str| (!value.trim().is_empty()).then(|| value.trim().to_string());
        match key {
            "service.base_url" => updated.service.base_url = optional(value),
            "service.app_id" => updated.service.app_id = optional(value),
            "stream.preview_threshold_chars" => {
                updated.stream.preview_threshold_chars = value.trim().parse().map_err(|_| {
                    ParleyError::Config(format!("Invalid number for {key}: {value}"))
                })?;
            }
            "history.page_size" => {
                updated.history.page_size = value.trim().parse().map_err(|_| {
                    ParleyError::Config(format!("Invalid number for {key}: {value}"))
                })?;
            }
            "speech.base_url" => updated.speech.base_url = value.trim().to_string(),
            "speech.voice" => updated.speech.voice = value.trim().to_string(),
            "storage.path" => updated.storage.path = optional(value).map(Into::into),
            _ => return Err(ParleyError::Config(format!("Unknown setting: {key}"))),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
