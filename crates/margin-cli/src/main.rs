//! Margin CLI — entry point.
//!
//! # Commands
//!
//! - `margin ask [-p PROVIDER] [-m MODEL] [--stream] QUESTION` — one question, one answer
//! - `margin chat [-p PROVIDER] [-m MODEL]` — interactive conversation (REPL)
//! - `margin providers` — list providers and their key status

mod ask;
mod helpers;
mod repl;
mod status;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use margin_core::config::load_settings;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Margin — ask any LLM provider from the terminal
#[derive(Parser)]
#[command(name = "margin", version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to ~/.margin/config.json)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Provider selection shared by `ask` and `chat`.
#[derive(Args, Clone, Debug, Default)]
pub struct TargetArgs {
    /// Provider key (e.g. "groq"). Inferred from the model when omitted.
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model name. Falls back to settings, then the provider default.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Stream the answer as it is generated
    #[arg(long, default_value_t = false)]
    pub stream: bool,

    /// System prompt for this call
    #[arg(long)]
    pub system: Option<String>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        question: String,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Start an interactive conversation
    Chat {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Show providers, models and API key status
    Providers,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings_path = cli.config.as_deref().map(helpers::expand_tilde);

    match cli.command {
        Commands::Ask { question, target } => {
            init_logging(target.logs);
            let settings = load_settings(settings_path.as_deref());
            ask::run(&settings, &target, &question).await
        }
        Commands::Chat { target } => {
            init_logging(target.logs);
            let settings = load_settings(settings_path.as_deref());
            repl::run(&settings, &target).await
        }
        Commands::Providers => {
            let settings = load_settings(settings_path.as_deref());
            status::run(&settings, settings_path.as_deref())
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("margin=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
