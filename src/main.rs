// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Parley - streaming workflow chat in your terminal
//!
//! Entry point for the Parley CLI application.

use anyhow::Context;
use clap::Parser;

use parley::cli::{ChatArgs, Cli, Commands};
use parley::config::Settings;

#[path = "main/commands.rs"]
mod commands;
#[path = "main/repl.rs"]
mod repl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the session and protocol diagnostics. `RUST_LOG` still takes precedence.
    if cli.verbose > 0 {
        let level = if cli.verbose > 1 { "trace" } else { "debug" };
        for target in [
            "parley.chat.session",
            "parley.protocol.decoder",
            "parley.client",
            "parley.transcript",
            "parley.interactive",
            "parley.speech",
            "parley.storage",
        ] {
            if let Ok(parsed) = format!("{target}={level}").parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load().context("failed to load settings")?,
    };

    if let Some(Commands::Settings(args)) = cli.command {
        return commands::run_settings(args, settings, cli.config.as_deref());
    }
    settings.validate().context("invalid settings")?;

    match cli.command {
        None => repl::run_chat(ChatArgs::default(), settings).await?,
        Some(Commands::Chat(args)) => repl::run_chat(args, settings).await?,
        Some(Commands::History(args)) => commands::run_history(args, settings).await?,
        Some(Commands::Delete(args)) => commands::run_delete(args, settings).await?,
        Some(Commands::Speak(args)) => commands::run_speak(args, settings).await?,
        Some(Commands::Transcribe(args)) => commands::run_transcribe(args, settings).await?,
        Some(Commands::Settings(_)) => {}
    }

    Ok(())
}
