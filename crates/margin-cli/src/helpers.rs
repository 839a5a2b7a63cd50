//! Shared CLI helpers — path expansion, answer printing, REPL banner.

use std::path::PathBuf;

use colored::Colorize;

use margin_core::types::Completion;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print the line that introduces an answer.
pub fn print_header() {
    println!();
    println!("{}", "Margin".cyan().bold());
}

/// Print a finished answer, reasoning first and dimmed.
pub fn print_completion(completion: &Completion) {
    print_header();
    if let Some(reasoning) = completion.reasoning.as_deref() {
        println!("{}", reasoning.trim().dimmed());
        println!();
    }
    if completion.text.trim().is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", completion.text);
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner(provider: &str, model: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Margin".cyan().bold(), version.dimmed());
    println!("{}", format!("{provider} · {model}").dimmed());
    println!(
        "{}",
        "Type a message, \"/clear\" to reset, or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print a "thinking" placeholder while a one-shot request is in flight.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
