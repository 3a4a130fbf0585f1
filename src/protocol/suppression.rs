// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Render-suppression for answers that start out as structured JSON
//!
//! Answers that carry machine-readable content (for example a follow-up
//! batch) should not flash half-parsed JSON at the reader. The gate looks at
//! the leading text of the accumulated answer and decides once per turn.

use crate::config::StreamConfig;

/// Per-turn decision on whether to forward deltas while streaming
#[derive(Debug, Clone)]
pub struct RenderGate {
    threshold_chars: usize,
    suppress_prefixes: Vec<String>,
    suppressed: bool,
    decided: bool,
}

impl RenderGate {
    pub fn new(threshold_chars: usize, suppress_prefixes: Vec<String>) -> Self {
        Self {
            threshold_chars,
            suppress_prefixes,
            suppressed: false,
            decided: false,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.preview_threshold_chars,
            config.suppress_prefixes.clone(),
        )
    }

    /// Observe the full accumulated answer; returns whether to forward it.
    pub fn observe(&mut self, full: &str) -> bool {
        if !self.decided {
            let preview = full.trim_start();
            if self
                .suppress_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && preview.starts_with(prefix.as_str()))
            {
                self.suppressed = true;
            }
            if preview.chars().count() > self.threshold_chars || preview.contains('\n') {
                self.decided = true;
            }
        }
        !self.suppressed
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    pub fn is_decided(&self) -> bool {
        self.decided
    }
}

impl Default for RenderGate {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}
