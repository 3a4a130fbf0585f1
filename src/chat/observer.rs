// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Callbacks invoked while a turn streams

use serde_json::Value;

use crate::error::Result;
use crate::interactive::InteractivePrompt;

/// Receives streaming progress for one turn.
///
/// Callbacks run synchronously as chunks are decoded. Returning an error
/// aborts the turn.
pub trait TurnObserver: Send {
    /// Forwarded answer text; `full` is everything received so far
    fn on_delta(&mut self, _delta: &str, _full: &str) -> Result<()> {
        Ok(())
    }

    /// The workflow paused on a prompt
    fn on_interactive(&mut self, _prompt: &InteractivePrompt) -> Result<()> {
        Ok(())
    }

    /// A named service event other than answer text
    fn on_event(&mut self, _name: &str, _payload: &Value) -> Result<()> {
        Ok(())
    }
}

/// Observer that ignores everything
pub struct NoopTurnObserver;

impl TurnObserver for NoopTurnObserver {}

/// Observer that records what it saw; handy in tests and for batch callers
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub deltas: Vec<(String, String)>,
    pub prompts: Vec<InteractivePrompt>,
    pub events: Vec<(String, Value)>,
}

impl TurnObserver for RecordingObserver {
    fn on_delta(&mut self, delta: &str, full: &str) -> Result<()> {
        self.deltas.push((delta.to_string(), full.to_string()));
        Ok(())
    }

    fn on_interactive(&mut self, prompt: &InteractivePrompt) -> Result<()> {
        self.prompts.push(prompt.clone());
        Ok(())
    }

    fn on_event(&mut self, name: &str, payload: &Value) -> Result<()> {
        self.events.push((name.to_string(), payload.clone()));
        Ok(())
    }
}
