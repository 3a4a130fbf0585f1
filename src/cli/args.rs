// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! CLI argument definitions using Clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parley - streaming workflow chat in your terminal
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version, about = "Streaming workflow chat in your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat (default when no command given)
    Chat(ChatArgs),

    /// Show the stored transcript of a conversation
    History(HistoryArgs),

    /// Delete conversations on the service
    Delete(DeleteArgs),

    /// Synthesize speech for a text
    Speak(SpeakArgs),

    /// Transcribe an audio file
    Transcribe(TranscribeArgs),

    /// Show or change settings
    Settings(SettingsArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Continue this conversation instead of the stored one
    #[arg(long)]
    pub conversation: Option<String>,

    /// Start a fresh conversation
    #[arg(long, conflicts_with = "conversation")]
    pub new: bool,

    /// Load the conversation's history before the first prompt
    #[arg(long)]
    pub resume: bool,
}

/// Arguments for the history subcommand
#[derive(clap::Args, Debug, Default)]
pub struct HistoryArgs {
    /// Conversation to show (defaults to the stored one)
    #[arg(long)]
    pub conversation: Option<String>,

    /// List known conversations instead
    #[arg(short, long)]
    pub list: bool,
}

/// Arguments for the delete subcommand
#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Conversation ids to delete
    #[arg(required = true)]
    pub ids: Vec<String>,
}

/// Arguments for the speak subcommand
#[derive(clap::Args, Debug)]
pub struct SpeakArgs {
    /// Text to synthesize
    pub text: String,

    /// Where to write inline audio (defaults to speech.<ext>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the transcribe subcommand
#[derive(clap::Args, Debug)]
pub struct TranscribeArgs {
    /// Audio file
    pub file: PathBuf,

    /// Audio format, if the extension does not say
    #[arg(long)]
    pub format: Option<String>,
}

/// Arguments for the settings subcommand
#[derive(clap::Args, Debug)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub command: Option<SettingsCommands>,
}

/// Settings subcommands
#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    /// Show current settings
    Show,

    /// Get a setting
    Get {
        /// Setting key (e.g., "service.app_id", "history.page_size")
        key: String,
    },

    /// Set a setting; an empty value clears optional ones
    Set {
        /// Setting key
        key: String,

        /// Value to set
        value: String,
    },
}
