// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Interactive chat loop

use std::io::{self, Write};
use std::sync::Arc;

use crossterm::{
    style::{Color, ResetColor, SetForegroundColor},
    ExecutableCommand,
};
use tokio_util::sync::CancellationToken;

use parley::chat::{ChatSession, FollowUpProgress, SendOptions, SendOutcome, TurnObserver};
use parley::cli::ChatArgs;
use parley::client::HttpBackend;
use parley::config::Settings;
use parley::error::ParleyError;
use parley::followup::FollowUpCarousel;
use parley::interactive::{InteractiveAnswer, InteractivePrompt, PromptKind};
use parley::storage::{
    load_or_create_conversation_id, persist_conversation_id, ConversationIndex, JsonFileStore,
    Profile,
};
use parley::transcript::HistorySummary;

use super::commands::{open_store, print_message};

/// Prints forwarded text as it arrives
#[derive(Default)]
struct PrintObserver {
    printed: usize,
}

impl PrintObserver {
    fn print_rest(&mut self, full: &str) {
        if let Some(rest) = full.get(self.printed..) {
            print!("{rest}");
            let _ = io::stdout().flush();
        }
        self.printed = full.len();
    }
}

impl TurnObserver for PrintObserver {
    // Text held back by suppression arrives with the first forwarded delta.
    fn on_delta(&mut self, _delta: &str, full: &str) -> parley::error::Result<()> {
        self.print_rest(full);
        Ok(())
    }
}

enum Step {
    Continue,
    Quit,
}

struct Repl {
    session: ChatSession,
    store: JsonFileStore,
    index: ConversationIndex,
}

pub(super) async fn run_chat(args: ChatArgs, settings: Settings) -> anyhow::Result<()> {
    let mut store = open_store(&settings)?;
    let conversation_id = if args.new {
        let id = uuid::Uuid::new_v4().to_string();
        persist_conversation_id(&mut store, &id)?;
        id
    } else if let Some(id) = args.conversation {
        persist_conversation_id(&mut store, &id)?;
        id
    } else {
        load_or_create_conversation_id(&mut store)?
    };

    let mut index = ConversationIndex::load(&store);
    index.ensure(&conversation_id);
    index.save(&mut store)?;

    let backend = Arc::new(HttpBackend::from_settings(&settings));
    let session = ChatSession::from_settings(backend, &settings, conversation_id);
    let mut repl = Repl {
        session,
        store,
        index,
    };

    print_welcome(&repl.session, &settings, &repl.store)?;
    if args.resume {
        repl.load_history().await?;
    }

    loop {
        let step = if let Some(prompt) = repl.session.pending_prompt().cloned() {
            repl.answer_prompt(&prompt).await?
        } else if let Some(carousel) = repl.session.follow_ups().cloned() {
            repl.answer_follow_up(&carousel).await?
        } else {
            repl.chat_turn().await?
        };
        if let Step::Quit = step {
            break;
        }
    }
    Ok(())
}

fn print_welcome(
    session: &ChatSession,
    settings: &Settings,
    store: &JsonFileStore,
) -> anyhow::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Cyan))?;
    println!("parley v{}", env!("CARGO_PKG_VERSION"));
    stdout.execute(ResetColor)?;
    println!("Conversation: {}", session.conversation_id());
    if let Some(profile) = Profile::read(store).filter(Profile::is_complete) {
        println!("Patient: {} {}岁", profile.gender, profile.age);
    }
    if let Err(e) = settings.require_service() {
        stdout.execute(SetForegroundColor(Color::Yellow))?;
        println!("{}", e.display_text());
        stdout.execute(ResetColor)?;
    }
    println!("Commands: /new  /history  /switch-patient  /quit\n");
    Ok(())
}

fn read_line(prompt: &str) -> anyhow::Result<Option<String>> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Green))?;
    print!("{prompt}");
    stdout.execute(ResetColor)?;
    stdout.flush()?;

    let mut input = String::new();
    if io::stdin().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn print_error(err: &ParleyError) -> anyhow::Result<()> {
    let mut stdout = io::stdout();
    stdout.execute(SetForegroundColor(Color::Red))?;
    println!("\n{}", err.display_text());
    stdout.execute(ResetColor)?;
    Ok(())
}

/// Cancellation token tripped by Ctrl-C for the duration of one turn
fn ctrl_c_token() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (token, watcher)
}

fn print_prompt(prompt: &InteractivePrompt) {
    println!("\n{}", prompt.description);
    match prompt.kind {
        PromptKind::UserSelect => {
            for (position, option) in prompt.options.iter().enumerate() {
                println!("  {}. {}", position + 1, option.value);
            }
        }
        PromptKind::UserInput => {}
    }
}

impl Repl {
    async fn chat_turn(&mut self) -> anyhow::Result<Step> {
        let Some(input) = read_line("you: ")? else {
            return Ok(Step::Quit);
        };
        match input.as_str() {
            "" => return Ok(Step::Continue),
            "/quit" | "/exit" => return Ok(Step::Quit),
            "/new" => {
                let id = self.session.new_conversation().to_string();
                persist_conversation_id(&mut self.store, &id)?;
                self.index.ensure(&id);
                self.index.save(&mut self.store)?;
                println!("Started conversation {id}\n");
                return Ok(Step::Continue);
            }
            "/history" => {
                self.load_history().await?;
                return Ok(Step::Continue);
            }
            "/switch-patient" => {
                Profile::clear(&mut self.store)?;
                return Ok(match self.collect_profile()? {
                    Some(_) => Step::Continue,
                    None => Step::Quit,
                });
            }
            _ => {}
        }

        if Profile::read(&self.store).filter(Profile::is_complete).is_none()
            && self.collect_profile()?.is_none()
        {
            return Ok(Step::Quit);
        }

        let (token, watcher) = ctrl_c_token();
        let mut observer = PrintObserver::default();
        let result = self
            .session
            .send(&input, SendOptions::default().with_cancel(token), &mut observer)
            .await;
        watcher.abort();

        self.record_activity(&input)?;
        self.report(result, &mut observer)?;
        Ok(Step::Continue)
    }

    async fn answer_prompt(&mut self, prompt: &InteractivePrompt) -> anyhow::Result<Step> {
        print_prompt(prompt);
        let answer = match prompt.kind {
            PromptKind::UserSelect => {
                let Some(input) = read_line("choose: ")? else {
                    return Ok(Step::Quit);
                };
                let selection = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| prompt.options.get(i))
                    .map_or(input.clone(), |option| option.key.clone());
                InteractiveAnswer::Select(selection)
            }
            PromptKind::UserInput => {
                let mut values = Vec::new();
                for field in &prompt.form_fields {
                    let mut label = field.display_label().to_string();
                    if !field.choices.is_empty() {
                        let choices: Vec<&str> =
                            field.choices.iter().map(|c| c.value.as_str()).collect();
                        label.push_str(&format!(" ({})", choices.join("/")));
                    }
                    if let Some(prefill) = field.prefill() {
                        label.push_str(&format!(" [{prefill}]"));
                    }
                    let Some(input) = read_line(&format!("{label}: "))? else {
                        return Ok(Step::Quit);
                    };
                    if !input.is_empty() {
                        values.push((field.key.clone(), input));
                    }
                }
                InteractiveAnswer::Form(values)
            }
        };

        let (token, watcher) = ctrl_c_token();
        let mut observer = PrintObserver::default();
        let result = self
            .session
            .answer_interactive(answer, SendOptions::default().with_cancel(token), &mut observer)
            .await;
        watcher.abort();

        if let Err(ParleyError::Precondition(reason)) = &result {
            println!("{reason}");
            return Ok(Step::Continue);
        }
        self.report(result, &mut observer)?;
        Ok(Step::Continue)
    }

    async fn answer_follow_up(&mut self, carousel: &FollowUpCarousel) -> anyhow::Result<Step> {
        let Some(question) = carousel.current() else {
            return Ok(Step::Continue);
        };
        println!(
            "\n({}/{}) {}",
            carousel.index() + 1,
            carousel.total(),
            question.question
        );
        for (position, option) in question.options.iter().enumerate() {
            println!("  {}. {}", position + 1, option);
        }

        let Some(input) = read_line("answer: ")? else {
            return Ok(Step::Quit);
        };
        let answer = input
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| question.options.get(i))
            .cloned()
            .unwrap_or(input);

        let (token, watcher) = ctrl_c_token();
        let mut observer = PrintObserver::default();
        let result = self
            .session
            .answer_follow_up(&answer, SendOptions::default().with_cancel(token), &mut observer)
            .await;
        watcher.abort();

        match result {
            Ok(FollowUpProgress::Advanced { .. }) => {}
            Ok(FollowUpProgress::Submitted(outcome)) => self.report(Ok(outcome), &mut observer)?,
            Err(ParleyError::Precondition(reason)) => println!("{reason}"),
            Err(e) => self.report(Err(e), &mut observer)?,
        }
        Ok(Step::Continue)
    }

    /// Ask for gender and age until both are valid, then store them
    fn collect_profile(&mut self) -> anyhow::Result<Option<Profile>> {
        println!("\n请先登记就诊人信息");
        loop {
            let Some(gender) = read_line("性别 (1. 男  2. 女): ")? else {
                return Ok(None);
            };
            let Some(age) = read_line("年龄: ")? else {
                return Ok(None);
            };
            match Profile::from_input(&gender, &age) {
                Some(profile) => {
                    profile.write(&mut self.store)?;
                    println!();
                    return Ok(Some(profile));
                }
                None => println!("请选择性别并填写年龄"),
            }
        }
    }

    async fn load_history(&mut self) -> anyhow::Result<()> {
        match self.session.load_history().await {
            Ok(summary) => {
                let id = self.session.conversation_id().to_string();
                self.index.ensure(&id);
                self.index.touch(&id, &summary);
                self.index.save(&mut self.store)?;
                for message in self.session.messages() {
                    print_message(message)?;
                }
                println!();
            }
            Err(e) => print_error(&e)?,
        }
        Ok(())
    }

    fn record_activity(&mut self, input: &str) -> anyhow::Result<()> {
        let id = self.session.conversation_id().to_string();
        self.index.ensure(&id);
        self.index.touch(
            &id,
            &HistorySummary {
                last_user_message: Some(input.to_string()),
                last_time: Some(chrono::Utc::now().to_rfc3339()),
            },
        );
        self.index.save(&mut self.store)?;
        Ok(())
    }

    fn report(
        &mut self,
        result: parley::error::Result<SendOutcome>,
        observer: &mut PrintObserver,
    ) -> anyhow::Result<()> {
        match result {
            Ok(SendOutcome::Answer(text)) => {
                observer.print_rest(&text);
                println!("\n");
            }
            Ok(SendOutcome::Interactive(_)) | Ok(SendOutcome::FollowUps { .. }) => println!(),
            Ok(SendOutcome::Cancelled { .. }) => println!("\n[cancelled]\n"),
            Err(e) => print_error(&e)?,
        }
        Ok(())
    }
}
