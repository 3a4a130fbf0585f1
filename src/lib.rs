// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Parley - streaming client engine for workflow chat services.
//!
//! This crate exposes the runtime used by the `parley` CLI (`src/main.rs`).
//!
//! Architecture highlights:
//! - `protocol`: SSE decoding into typed events and render suppression
//! - `interactive`: workflow prompts, correlation ids and resume requests
//! - `followup`: follow-up question batches and their summary turn
//! - `transcript`: messages, request history and reconstruction from stored records
//! - `client`: the `ChatBackend` seam with HTTP and mock implementations
//! - `chat`: the session controller tying the above together
//! - `storage`, `speech`: local persistence and speech collaborators

pub mod chat;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod followup;
pub mod interactive;
pub mod protocol;
pub mod speech;
pub mod storage;
pub mod transcript;
