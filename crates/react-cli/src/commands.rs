//! Command implementations

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use react_core::{build_loop, Config, Extractor, ReactState};
use tracing::debug;

// ANSI colors
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

pub struct AskOptions<'a> {
    pub question: &'a str,
    pub api_key: &'a str,
    pub model: Option<String>,
    pub max_turns: Option<usize>,
    pub config_path: Option<PathBuf>,
    pub json: bool,
    pub show_transcript: bool,
}

pub async fn ask(opts: AskOptions<'_>) -> Result<()> {
    let mut config = Config::load_or_default(opts.config_path.as_deref())?;
    if let Some(model) = opts.model {
        config.model.model = model;
    }
    if let Some(max_turns) = opts.max_turns {
        config.agent.max_turns = max_turns;
    }
    debug!(
        model = %config.model.model,
        max_turns = config.agent.max_turns,
        "Resolved config"
    );

    let agent = build_loop(opts.api_key, &config)?;
    let state = agent
        .run(opts.question)
        .await
        .context("Failed to get an answer from the model")?;

    if opts.show_transcript {
        print_transcript(&state);
    }

    let answer = state.answer();
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.answer);
    }

    Ok(())
}

pub async fn fetch(
    url: &str,
    max_chars: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path.as_deref())?;
    if let Some(max_chars) = max_chars {
        config.extract.max_chars = max_chars;
    }

    let extractor = Extractor::new(&config.extract, &config.http)?;
    let text = extractor.fetch_and_extract(url).await?;
    println!("{}", text);

    Ok(())
}

pub fn init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            output.display()
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    fs::write(output, Config::default_toml())
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());

    Ok(())
}

fn print_transcript(state: &ReactState) {
    for message in &state.messages {
        eprintln!("{}[{}]{}", CYAN, message.role, RESET);
        eprintln!("{}", message.content);
        eprintln!();
    }
    if let Some(ref outcome) = state.outcome {
        eprintln!("{}[outcome: {} after {} turn(s)]{}", DIM, outcome, state.turn, RESET);
    }
}
