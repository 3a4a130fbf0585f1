// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! One-shot subcommands

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};

use parley::chat::ChatSession;
use parley::cli::{
    DeleteArgs, HistoryArgs, SettingsArgs, SettingsCommands, SpeakArgs, TranscribeArgs,
};
use parley::client::HttpBackend;
use parley::config::Settings;
use parley::speech::{
    AudioClip, AudioInput, DashScopeSynthesizer, DashScopeTranscriber, Synthesizer, Transcriber,
};
use parley::storage::{
    load_or_create_conversation_id, persist_conversation_id, ConversationIndex, JsonFileStore,
};
use parley::transcript::{Message, Role};

pub(super) fn open_store(settings: &Settings) -> anyhow::Result<JsonFileStore> {
    JsonFileStore::open_default(settings).context("failed to open local store")
}

/// Print one transcript message with a colored role prefix
pub(super) fn print_message(message: &Message) -> anyhow::Result<()> {
    let color = match message.role {
        Role::User => Color::Green,
        Role::Assistant => Color::Cyan,
        Role::System => Color::DarkGrey,
    };
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(color))?;
    print!("{}: ", message.role);
    stdout.execute(ResetColor)?;
    println!("{}", message.display_text());
    Ok(())
}

pub(super) async fn run_history(args: HistoryArgs, settings: Settings) -> anyhow::Result<()> {
    let mut store = open_store(&settings)?;

    if args.list {
        let index = ConversationIndex::load(&store);
        if index.is_empty() {
            println!("\nNo conversations yet.\n");
            return Ok(());
        }
        println!("\nConversations:\n");
        for (position, item) in index.items().iter().enumerate() {
            let label = item
                .last_message
                .clone()
                .unwrap_or_else(|| format!("会话 {}", index.len() - position));
            let when = item.activity().format("%Y-%m-%d %H:%M");
            println!("  {} | {} | {}", item.id, when, label);
        }
        println!();
        return Ok(());
    }

    let conversation_id = match args.conversation {
        Some(id) => id,
        None => load_or_create_conversation_id(&mut store)?,
    };
    let backend = Arc::new(HttpBackend::from_settings(&settings));
    let mut session = ChatSession::from_settings(backend, &settings, conversation_id.clone());
    let summary = session.load_history().await?;

    let mut index = ConversationIndex::load(&store);
    index.ensure(&conversation_id);
    index.touch(&conversation_id, &summary);
    index.save(&mut store)?;

    if session.messages().is_empty() {
        println!("No messages in {conversation_id}.");
    }
    for message in session.messages() {
        print_message(message)?;
    }
    Ok(())
}

pub(super) async fn run_delete(args: DeleteArgs, settings: Settings) -> anyhow::Result<()> {
    let mut store = open_store(&settings)?;
    let active = load_or_create_conversation_id(&mut store)?;
    let backend = Arc::new(HttpBackend::from_settings(&settings));
    let mut session = ChatSession::from_settings(backend, &settings, active);

    let rotated = session.delete_conversations(&args.ids).await?;

    let mut index = ConversationIndex::load(&store);
    let removed = index.remove_many(&args.ids);
    if let Some(new_id) = &rotated {
        persist_conversation_id(&mut store, new_id)?;
        index.ensure(new_id);
        println!("Active conversation deleted; now using {new_id}.");
    }
    index.save(&mut store)?;

    println!(
        "Deleted {} conversation(s), {} from the local index.",
        args.ids.len(),
        removed
    );
    Ok(())
}

pub(super) async fn run_speak(args: SpeakArgs, settings: Settings) -> anyhow::Result<()> {
    let synthesizer = DashScopeSynthesizer::from_settings(&settings);
    match synthesizer.synthesize(&args.text).await? {
        AudioClip::Url(url) => println!("{url}"),
        clip @ AudioClip::Bytes { .. } => {
            let path = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("speech.{}", clip.extension())));
            if let AudioClip::Bytes { data, .. } = clip {
                std::fs::write(&path, data)
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

pub(super) async fn run_transcribe(args: TranscribeArgs, settings: Settings) -> anyhow::Result<()> {
    let input = AudioInput::from_path(&args.file, args.format.as_deref())
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let transcriber = DashScopeTranscriber::from_settings(&settings);
    let text = transcriber.transcribe(&input).await?;
    println!("{text}");
    Ok(())
}

/// Run settings subcommands; `path` is the `--config` override, if any
pub(super) fn run_settings(
    args: SettingsArgs,
    mut settings: Settings,
    path: Option<&Path>,
) -> anyhow::Result<()> {
    match args.command {
        None | Some(SettingsCommands::Show) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Some(SettingsCommands::Get { key }) => {
            println!("{}", settings.get_key(&key)?);
        }
        Some(SettingsCommands::Set { key, value }) => {
            settings.set_key(&key, &value)?;
            match path {
                Some(path) => settings.save_to(path)?,
                None => settings.save()?,
            }
            println!("Setting '{key}' updated.");
        }
    }
    Ok(())
}
