//! Interactive REPL — `margin chat`.
//!
//! Uses `rustyline` for readline-style editing with persistent history. The
//! conversation is resent on every turn; `/clear` starts a new one.

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use margin_core::config::Settings;
use margin_core::types::{Completion, Message};
use margin_providers::Transport;

use crate::ask;
use crate::helpers;
use crate::TargetArgs;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

const CLEAR_COMMAND: &str = "/clear";

/// Run the interactive REPL loop.
pub async fn run(settings: &Settings, target: &TargetArgs) -> Result<()> {
    let (spec, model) = ask::resolve_target(settings, target)?;
    let config = ask::build_config(settings, spec, &model, target);
    let transport = Transport::new(&settings.transport).context("failed to build HTTP client")?;

    helpers::print_banner(spec.display_name, &model);

    let mut editor = create_editor()?;
    let mut conversation = Conversation::default();

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => {
                // Ctrl-C — exit cleanly
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                // Ctrl-D — exit cleanly
                break;
            }
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye!");
            break;
        }

        let _ = editor.add_history_entry(&input);

        if trimmed.eq_ignore_ascii_case(CLEAR_COMMAND) {
            conversation.clear();
            println!("{}\n", "(conversation cleared)".dimmed());
            continue;
        }

        debug!(turns = conversation.len(), input = trimmed, "processing input");
        let messages = conversation.with_question(trimmed);

        match ask::answer(&messages, &config, &transport).await {
            Ok(completion) => conversation.record(trimmed, &completion),
            Err(e) => eprintln!("\n{} {e:#}\n", "Error:".red().bold()),
        }
    }

    save_history(&mut editor);

    Ok(())
}

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

/// Turns exchanged so far. Failed turns are not recorded.
#[derive(Debug, Default)]
struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    fn len(&self) -> usize {
        self.messages.len()
    }

    fn clear(&mut self) {
        self.messages.clear();
    }

    /// The history plus a new question, ready to send.
    fn with_question(&self, question: &str) -> Vec<Message> {
        let mut messages = self.messages.clone();
        messages.push(Message::user(question));
        messages
    }

    fn record(&mut self, question: &str, completion: &Completion) {
        self.messages.push(Message::user(question));
        self.messages.push(Message::assistant(completion.text.clone()));
    }
}

// ─────────────────────────────────────────────
// History
// ─────────────────────────────────────────────

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    // Load history from ~/.margin/history/cli_history
    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    margin_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
