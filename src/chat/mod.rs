// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Chat session management
//!
//! [`ChatSession`] drives turns against a [`crate::client::ChatBackend`]:
//! streaming answers, pausing on interactive prompts, collecting follow-up
//! answers and reloading stored history.

mod observer;
mod session;
mod shared;

pub use observer::{NoopTurnObserver, RecordingObserver, TurnObserver};
pub use session::{
    CancelPolicy, ChatSession, FollowUpProgress, SendOptions, SendOutcome, TurnContext,
};
pub use shared::SessionHandle;
