//! Configuration management for react.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::agent::AgentConfig;

/// Name of the configuration file searched for in the current directory and parents
pub const CONFIG_FILE_NAME: &str = "react.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Chat-completion endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of the API, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Maximum number of model calls per question
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Characters of page text folded back into the transcript per observation
    #[serde(default = "default_observation_limit")]
    pub observation_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Characters kept from an extracted page
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout for model and fetch calls; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_turns() -> usize {
    3
}

fn default_observation_limit() -> usize {
    4000
}

fn default_max_chars() -> usize {
    8000
}

fn default_user_agent() -> String {
    format!("react-agent/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            observation_limit: default_observation_limit(),
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Request timeout, `None` when disabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    /// Load `explicit` if given, else react.toml from the current directory
    /// or its parents, else defaults.
    ///
    /// An explicit path that cannot be read or parsed is an error, and so is a
    /// discovered file that fails to parse.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => Self::load_or_default_from(std::env::current_dir()?),
        }
    }

    fn load_or_default_from(start: PathBuf) -> Result<Self> {
        match Self::find_config_path_from(start) {
            Ok(found) => {
                debug!(path = %found.display(), "Using config file");
                Self::load_from(found)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Find react.toml by searching `current` and its parents
    fn find_config_path_from(mut current: PathBuf) -> Result<PathBuf> {
        for _ in 0..10 {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(candidate);
            }
            if !current.pop() {
                break;
            }
        }

        anyhow::bail!("{} not found in current directory or parents", CONFIG_FILE_NAME)
    }

    /// Loop settings derived from the `[agent]` section
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig::default()
            .with_max_turns(self.agent.max_turns)
            .with_observation_limit(self.agent.observation_limit)
    }

    /// Commented template written by `react init`
    pub fn default_toml() -> String {
        let defaults = Self::default();
        format!(
            r#"# react agent configuration

[model]
# OpenAI-compatible base URL; requests go to <base_url>/chat/completions
base_url = "{base_url}"
model = "{model}"
temperature = {temperature:?}

[agent]
# Maximum model calls per question
max_turns = {max_turns}
# Characters of fetched text passed back to the model per observation
observation_limit = {observation_limit}

[extract]
# Characters kept from an extracted page
max_chars = {max_chars}
user_agent = "{user_agent}"

[http]
# Request timeout in seconds (0 = no timeout)
timeout_secs = {timeout_secs}
"#,
            base_url = defaults.model.base_url,
            model = defaults.model.model,
            temperature = defaults.model.temperature,
            max_turns = defaults.agent.max_turns,
            observation_limit = defaults.agent.observation_limit,
            max_chars = defaults.extract.max_chars,
            user_agent = defaults.extract.user_agent,
            timeout_secs = defaults.http.timeout_secs,
        )
    }
}
