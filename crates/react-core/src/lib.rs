//! react-core: a turn-bounded reason + act loop
//!
//! Provides:
//! - Configuration loading (react.toml)
//! - Chat-completion client for OpenAI-compatible endpoints
//! - The JSON step protocol spoken with the model
//! - Page fetching and HTML-to-text extraction
//! - The loop controller tying them together

pub mod agent;
pub mod config;
pub mod extract;
pub mod openai;
pub mod step;

use anyhow::Result;

pub use agent::{AgentConfig, Answer, Outcome, ReactLoop, ReactState};
pub use config::Config;
pub use extract::{Extractor, PageFetcher};
pub use openai::{ChatMessage, ChatModel, OpenAiClient, Role};
pub use step::{Decoded, Step};

/// Build the loop from `config` and answer one question.
///
/// The credential is only ever taken from `api_key`. A failed model call is
/// returned as `Err`; every other failure is reported through the answer text.
pub async fn run_react(question: &str, api_key: &str, config: &Config) -> Result<Answer> {
    let state = build_loop(api_key, config)?.run(question).await?;
    Ok(state.answer())
}

/// Construct the production loop (HTTP model client + HTTP extractor)
pub fn build_loop(api_key: &str, config: &Config) -> Result<ReactLoop<OpenAiClient, Extractor>> {
    let model = OpenAiClient::new(config.model.clone(), api_key, &config.http)?;
    let fetcher = Extractor::new(&config.extract, &config.http)?;
    Ok(ReactLoop::new(model, fetcher, config.agent_config()))
}
