// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Shared handle to a chat session
//!
//! At most one streaming operation runs per session. A second send while one
//! is in flight is rejected with [`ParleyError::SendInFlight`] instead of
//! queueing behind it.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::error::{ParleyError, Result};
use crate::interactive::InteractiveAnswer;
use crate::transcript::Transcript;

use super::observer::TurnObserver;
use super::session::{ChatSession, FollowUpProgress, SendOptions, SendOutcome};

/// Cloneable handle for driving one session from several tasks
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<ChatSession>>,
}

impl SessionHandle {
    pub fn new(session: ChatSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn claim(&self) -> Result<MutexGuard<'_, ChatSession>> {
        self.inner.try_lock().map_err(|_| ParleyError::SendInFlight)
    }

    pub async fn send(
        &self,
        text: &str,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<SendOutcome> {
        self.claim()?.send(text, options, observer).await
    }

    pub async fn answer_interactive(
        &self,
        answer: InteractiveAnswer,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<SendOutcome> {
        self.claim()?
            .answer_interactive(answer, options, observer)
            .await
    }

    pub async fn answer_follow_up(
        &self,
        answer: &str,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<FollowUpProgress> {
        self.claim()?
            .answer_follow_up(answer, options, observer)
            .await
    }

    /// Whether a streaming operation currently holds the session
    pub fn is_busy(&self) -> bool {
        self.inner.try_lock().is_err()
    }

    /// Snapshot of the transcript, waiting for any in-flight turn
    pub async fn transcript(&self) -> Transcript {
        self.inner.lock().await.transcript().clone()
    }

    /// Exclusive access for non-streaming operations
    pub async fn lock(&self) -> MutexGuard<'_, ChatSession> {
        self.inner.lock().await
    }
}
