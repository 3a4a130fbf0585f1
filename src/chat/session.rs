// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Chat session controller
//!
//! Owns the transcript and every piece of per-conversation state: the
//! correlation identifiers observed on the stream, the pending interactive
//! prompt and the follow-up carousel. All service calls go through the
//! [`ChatBackend`] it was built with.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::client::{ChatBackend, ChatRequest, RecordsQuery, DEFAULT_PAGE_SIZE};
use crate::config::{Settings, StreamConfig};
use crate::error::{ApiError, ParleyError, Result};
use crate::followup::{extract_follow_ups, summary_turn, CarouselStep, FollowUpCarousel};
use crate::interactive::{Correlation, InteractiveAnswer, InteractiveMachine, InteractivePrompt};
use crate::protocol::{ProtocolEvent, RenderGate, StreamDecoder};
use crate::transcript::{
    reconstruct, sort_records, summarize, HistorySummary, Message, Role, Transcript, Turn,
};

use super::observer::TurnObserver;

/// What happens to the placeholder when a send is cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Keep the text received so far (remove the placeholder if there is none)
    #[default]
    Finalize,
    /// Remove the placeholder
    Remove,
}

/// Per-call options for operations that stream a turn
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub cancel: Option<CancellationToken>,
    pub cancel_policy: CancelPolicy,
    /// Explicit `responseChatItemId` for a resume; wins over captured ids
    pub response_chat_item_id: Option<String>,
}

impl SendOptions {
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = policy;
        self
    }

    pub fn with_response_chat_item_id(mut self, id: impl Into<String>) -> Self {
        self.response_chat_item_id = Some(id.into());
        self
    }
}

/// How a streamed turn ended
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Plain answer, now the final text of the assistant message
    Answer(String),
    /// The workflow paused and waits for [`ChatSession::answer_interactive`]
    Interactive(InteractivePrompt),
    /// A follow-up batch waits for [`ChatSession::answer_follow_up`]
    FollowUps { count: usize },
    /// Cancelled by the caller; carries the text received before cancellation
    Cancelled { partial: String },
}

/// Result of answering one follow-up question
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUpProgress {
    /// Recorded locally; `index` is the next question
    Advanced { index: usize, total: usize },
    /// Last answer given; the summary turn was sent
    Submitted(SendOutcome),
}

/// Mutable state of the turn currently streaming
#[derive(Debug)]
pub struct TurnContext {
    pub full_answer: String,
    pub gate: RenderGate,
    pub placeholder_id: String,
    pub received_bytes: usize,
    pub prompt_issued: bool,
}

impl TurnContext {
    pub fn new(gate: RenderGate, placeholder_id: String) -> Self {
        Self {
            full_answer: String::new(),
            gate,
            placeholder_id,
            received_bytes: 0,
            prompt_issued: false,
        }
    }
}

enum StreamEnd {
    Completed,
    Cancelled,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One conversation with the chat service
pub struct ChatSession {
    backend: Arc<dyn ChatBackend>,
    stream_config: StreamConfig,
    page_size: u32,
    conversation_id: String,
    transcript: Transcript,
    correlation: Correlation,
    interactive: InteractiveMachine,
    follow_ups: Option<FollowUpCarousel>,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, conversation_id: impl Into<String>) -> Self {
        Self {
            backend,
            stream_config: StreamConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
            conversation_id: conversation_id.into(),
            transcript: Transcript::new(),
            correlation: Correlation::new(),
            interactive: InteractiveMachine::new(),
            follow_ups: None,
        }
    }

    /// Build a session using the stream and history settings
    pub fn from_settings(
        backend: Arc<dyn ChatBackend>,
        settings: &Settings,
        conversation_id: impl Into<String>,
    ) -> Self {
        Self::new(backend, conversation_id)
            .with_stream_config(settings.stream.clone())
            .with_page_size(settings.history.page_size)
    }

    pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
        self.stream_config = config;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[Message] {
        self.transcript.messages()
    }

    pub fn pending_prompt(&self) -> Option<&InteractivePrompt> {
        self.interactive.pending()
    }

    pub fn follow_ups(&self) -> Option<&FollowUpCarousel> {
        self.follow_ups.as_ref()
    }

    pub fn correlation(&self) -> &Correlation {
        &self.correlation
    }

    /// Send a user turn with the full transcript as history.
    ///
    /// Any pending prompt or follow-up batch is abandoned.
    pub async fn send(
        &mut self,
        text: &str,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<SendOutcome> {
        let content = text.trim();
        if content.is_empty() {
            return Err(ParleyError::Precondition("message is empty".to_string()));
        }
        self.backend.ensure_configured()?;

        if let Some(prompt) = self.interactive.abandon() {
            tracing::debug!(
                target: "parley.chat.session",
                kind = ?prompt.kind,
                "Abandoned pending prompt"
            );
        }
        self.follow_ups = None;

        self.transcript
            .push(Message::text(new_id(), Role::User, content));
        let request = ChatRequest::new(self.request_chat_id(), self.transcript.turns());
        self.run_turn(request, options, observer).await
    }

    /// Answer the pending interactive prompt and resume the workflow
    pub async fn answer_interactive(
        &mut self,
        answer: InteractiveAnswer,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<SendOutcome> {
        if !self.interactive.is_awaiting() {
            return Err(ParleyError::Precondition(
                "no interactive prompt pending".to_string(),
            ));
        }
        self.backend.ensure_configured()?;

        let resume = self.interactive.answer(
            answer,
            &self.correlation,
            &self.conversation_id,
            options.response_chat_item_id.as_deref(),
        )?;
        self.follow_ups = None;

        tracing::debug!(
            target: "parley.chat.session",
            chat_id = %resume.chat_id,
            response_chat_item_id = ?resume.response_chat_item_id,
            "Resuming workflow"
        );

        self.transcript
            .push(Message::answered_log(new_id(), &resume.answered));
        self.run_turn(ChatRequest::resume(resume), options, observer)
            .await
    }

    /// Answer the current follow-up question.
    ///
    /// Only the last answer makes a request: a summary turn sent without
    /// prior history.
    pub async fn answer_follow_up(
        &mut self,
        answer: &str,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<FollowUpProgress> {
        let carousel = self.follow_ups.as_mut().ok_or_else(|| {
            ParleyError::Precondition("no follow-up question pending".to_string())
        })?;
        if carousel.index() + 1 >= carousel.total() {
            self.backend.ensure_configured()?;
        }

        match carousel.answer(answer)? {
            CarouselStep::Advanced { index, total } => {
                Ok(FollowUpProgress::Advanced { index, total })
            }
            CarouselStep::Complete(snapshot) => {
                self.follow_ups = None;
                self.interactive.abandon();

                let content = summary_turn(&snapshot);
                self.transcript.push(Message::follow_up(new_id(), snapshot));
                self.transcript
                    .push(Message::text(new_id(), Role::User, content.clone()));

                let request = ChatRequest::new(self.request_chat_id(), vec![Turn::user(content)]);
                let outcome = self.run_turn(request, options, observer).await?;
                Ok(FollowUpProgress::Submitted(outcome))
            }
        }
    }

    /// Replace the transcript with the latest stored page of this conversation.
    ///
    /// An empty page leaves the transcript untouched.
    pub async fn load_history(&mut self) -> Result<HistorySummary> {
        self.backend.ensure_configured()?;

        let query = RecordsQuery::latest(self.conversation_id.clone(), self.page_size);
        let mut records = self.backend.fetch_records(&query).await?;
        if records.is_empty() {
            return Ok(HistorySummary::default());
        }

        sort_records(&mut records);
        let summary = summarize(&records);
        let messages = reconstruct(&records);

        self.interactive.abandon();
        self.follow_ups = None;
        self.transcript.replace_all(messages);

        tracing::info!(
            target: "parley.chat.session",
            conversation_id = %self.conversation_id,
            records = records.len(),
            messages = self.transcript.len(),
            "Loaded history"
        );
        Ok(summary)
    }

    /// Abandon pending prompt and follow-ups and clear the transcript
    pub fn reset(&mut self) {
        self.interactive.abandon();
        self.follow_ups = None;
        self.transcript.clear();
    }

    /// Start a fresh conversation under a new id
    pub fn new_conversation(&mut self) -> &str {
        self.switch_conversation(new_id());
        &self.conversation_id
    }

    /// Continue under another conversation id with clean state
    pub fn switch_conversation(&mut self, conversation_id: impl Into<String>) {
        self.reset();
        self.correlation.clear();
        self.conversation_id = conversation_id.into();
        tracing::debug!(
            target: "parley.chat.session",
            conversation_id = %self.conversation_id,
            "Switched conversation"
        );
    }

    /// Delete conversations on the service.
    ///
    /// Returns the new conversation id if the active one was deleted.
    pub async fn delete_conversations(&mut self, chat_ids: &[String]) -> Result<Option<String>> {
        if chat_ids.is_empty() {
            return Ok(None);
        }
        self.backend.ensure_configured()?;
        self.backend.delete_chats(chat_ids).await?;

        if chat_ids.iter().any(|id| *id == self.conversation_id) {
            Ok(Some(self.new_conversation().to_string()))
        } else {
            Ok(None)
        }
    }

    fn request_chat_id(&self) -> String {
        self.correlation
            .chat_id()
            .unwrap_or(&self.conversation_id)
            .to_string()
    }

    async fn run_turn(
        &mut self,
        request: ChatRequest,
        options: SendOptions,
        observer: &mut dyn TurnObserver,
    ) -> Result<SendOutcome> {
        let placeholder_id = new_id();
        self.transcript
            .push(Message::placeholder(placeholder_id.clone()));
        let mut ctx = TurnContext::new(
            RenderGate::from_config(&self.stream_config),
            placeholder_id,
        );

        match self
            .stream_turn(&request, &mut ctx, options.cancel.as_ref(), observer)
            .await
        {
            Ok(StreamEnd::Completed) => Ok(self.complete_turn(ctx)),
            Ok(StreamEnd::Cancelled) => {
                self.cancel_turn(&ctx, options.cancel_policy);
                tracing::info!(
                    target: "parley.chat.session",
                    received = ctx.full_answer.len(),
                    "Send cancelled"
                );
                Ok(SendOutcome::Cancelled {
                    partial: ctx.full_answer,
                })
            }
            Err(e) => {
                tracing::warn!(
                    target: "parley.chat.session",
                    error = %e,
                    "Turn failed"
                );
                if let Some(message) = self.transcript.get_mut(&ctx.placeholder_id) {
                    message.set_text(e.display_text());
                }
                Err(e)
            }
        }
    }

    async fn stream_turn(
        &mut self,
        request: &ChatRequest,
        ctx: &mut TurnContext,
        cancel: Option<&CancellationToken>,
        observer: &mut dyn TurnObserver,
    ) -> Result<StreamEnd> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Ok(StreamEnd::Cancelled);
        }

        let mut stream = self.backend.stream_chat(request).await?;
        let mut decoder = StreamDecoder::new();

        loop {
            let next = match cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => return Ok(StreamEnd::Cancelled),
                    chunk = stream.next() => chunk,
                },
                None => stream.next().await,
            };

            let (events, ended) = match next {
                Some(chunk) => {
                    let bytes = chunk?;
                    ctx.received_bytes += bytes.len();
                    (decoder.push(&bytes), false)
                }
                None => (decoder.finish(), true),
            };

            for event in events {
                if self.handle_event(event, ctx, observer)? {
                    return Ok(StreamEnd::Completed);
                }
            }

            if ended {
                break;
            }
        }

        if ctx.received_bytes == 0 {
            return Err(ApiError::EmptyBody.into());
        }
        Ok(StreamEnd::Completed)
    }

    /// Apply one event; returns true once the stream is done
    fn handle_event(
        &mut self,
        event: ProtocolEvent,
        ctx: &mut TurnContext,
        observer: &mut dyn TurnObserver,
    ) -> Result<bool> {
        match event {
            ProtocolEvent::Delta(delta) => {
                ctx.full_answer.push_str(&delta);
                if ctx.gate.observe(&ctx.full_answer) {
                    if let Some(message) = self.transcript.get_mut(&ctx.placeholder_id) {
                        message.set_text(ctx.full_answer.clone());
                    }
                    observer.on_delta(&delta, &ctx.full_answer)?;
                }
            }
            ProtocolEvent::Interactive {
                prompt: payload,
                envelope,
            } => {
                if let Some(envelope) = &envelope {
                    self.correlation.observe(envelope);
                }
                self.correlation.observe(&payload);
                if let Some(prompt) = self.interactive.on_interactive(payload, &self.correlation) {
                    ctx.prompt_issued = true;
                    observer.on_interactive(prompt)?;
                }
            }
            ProtocolEvent::Generic { name, payload } => {
                self.correlation.observe(&payload);
                observer.on_event(&name, &payload)?;
            }
            ProtocolEvent::Done => return Ok(true),
        }
        Ok(false)
    }

    fn complete_turn(&mut self, ctx: TurnContext) -> SendOutcome {
        let TurnContext {
            full_answer,
            gate,
            placeholder_id,
            prompt_issued,
            ..
        } = ctx;

        if prompt_issued {
            if let Some(prompt) = self.interactive.pending().cloned() {
                if full_answer.trim().is_empty() {
                    self.transcript.remove(&placeholder_id);
                } else if let Some(message) = self.transcript.get_mut(&placeholder_id) {
                    message.set_text(full_answer);
                }
                tracing::info!(
                    target: "parley.chat.session",
                    kind = ?prompt.kind,
                    "Turn paused on interactive prompt"
                );
                return SendOutcome::Interactive(prompt);
            }
        }

        if let Some(carousel) = extract_follow_ups(&full_answer).and_then(FollowUpCarousel::new) {
            self.transcript.remove(&placeholder_id);
            let count = carousel.total();
            self.follow_ups = Some(carousel);
            tracing::info!(
                target: "parley.chat.session",
                count,
                "Turn produced follow-up questions"
            );
            return SendOutcome::FollowUps { count };
        }

        if let Some(message) = self.transcript.get_mut(&placeholder_id) {
            message.set_text(full_answer.clone());
        }
        tracing::info!(
            target: "parley.chat.session",
            chars = full_answer.chars().count(),
            suppressed = gate.is_suppressed(),
            "Turn completed"
        );
        SendOutcome::Answer(full_answer)
    }

    fn cancel_turn(&mut self, ctx: &TurnContext, policy: CancelPolicy) {
        // A prompt issued mid-stream cannot be resumed reliably.
        if ctx.prompt_issued {
            self.interactive.abandon();
        }
        match policy {
            CancelPolicy::Finalize if !ctx.full_answer.is_empty() => {
                if let Some(message) = self.transcript.get_mut(&ctx.placeholder_id) {
                    message.set_text(ctx.full_answer.clone());
                }
            }
            _ => {
                self.transcript.remove(&ctx.placeholder_id);
            }
        }
    }
}
