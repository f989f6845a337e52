//! react: ask a question, let the model fetch pages until it can answer

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "react")]
#[command(about = "Answer questions with a fetch-capable reason + act loop", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer a question (the model may fetch web pages)
    Ask {
        /// The question to answer
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// API key for the chat-completion endpoint
        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// Maximum model calls (overrides config)
        #[arg(long)]
        max_turns: Option<usize>,

        /// Path to react.toml (default: search current directory and parents)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Print the transcript and outcome to stderr
        #[arg(long)]
        show_transcript: bool,
    },

    /// Fetch a URL and print its extracted text
    Fetch {
        url: String,

        /// Maximum characters to keep (overrides config)
        #[arg(long)]
        max_chars: Option<usize>,

        /// Path to react.toml
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a default react.toml
    Init {
        /// Output file path
        #[arg(short, long, default_value = "react.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Ask {
            question,
            api_key,
            model,
            max_turns,
            config,
            json,
            show_transcript,
        } => {
            let question = question.join(" ");
            commands::ask(commands::AskOptions {
                question: &question,
                api_key: &api_key,
                model,
                max_turns,
                config_path: config,
                json,
                show_transcript,
            })
            .await
        }
        Commands::Fetch {
            url,
            max_chars,
            config,
        } => commands::fetch(&url, max_chars, config).await,
        Commands::Init { output, force } => commands::init(&output, force),
    }
}
