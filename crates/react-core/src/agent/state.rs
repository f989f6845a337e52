//! Agent state management

use serde::{Deserialize, Serialize};

use crate::openai::ChatMessage;

/// Answer returned when the model reply is not JSON
pub const PARSE_FAILURE_ANSWER: &str = "(failed to parse the model output as JSON)";
/// Answer returned when the model reply is JSON but not a known step
pub const UNKNOWN_STEP_ANSWER: &str = "(the model returned an unrecognized step)";
/// Answer returned when no final step arrives within the turn budget
pub const TURN_LIMIT_ANSWER: &str = "(reached the turn limit without a final answer)";

/// Configuration for the loop
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model calls per question
    pub max_turns: usize,
    /// Characters of fetched text folded into the transcript per observation
    pub observation_limit: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 3,
            observation_limit: 4000,
        }
    }
}

impl AgentConfig {
    pub fn with_max_turns(mut self, max: usize) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_observation_limit(mut self, limit: usize) -> Self {
        self.observation_limit = limit;
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model returned a `final` step
    Final(String),
    /// The model reply was not JSON
    ParseFailure,
    /// The model reply was JSON but neither `final` nor a `fetch` action
    UnknownStep,
    /// The turn budget ran out
    TurnLimit,
}

impl Outcome {
    /// The answer string handed back to the caller
    pub fn answer(&self) -> &str {
        match self {
            Outcome::Final(answer) => answer,
            Outcome::ParseFailure => PARSE_FAILURE_ANSWER,
            Outcome::UnknownStep => UNKNOWN_STEP_ANSWER,
            Outcome::TurnLimit => TURN_LIMIT_ANSWER,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Final(_) => write!(f, "final"),
            Outcome::ParseFailure => write!(f, "parse_failure"),
            Outcome::UnknownStep => write!(f, "unknown_step"),
            Outcome::TurnLimit => write!(f, "turn_limit"),
        }
    }
}

/// The single value returned to callers of the loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
}

/// State of one invocation
#[derive(Debug, Clone, Default)]
pub struct ReactState {
    /// Transcript sent to the model, append-only
    pub messages: Vec<ChatMessage>,
    /// Model calls made so far
    pub turn: usize,
    /// Set once the run reaches a terminal state
    pub outcome: Option<Outcome>,
}

impl ReactState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn increment_turn(&mut self) {
        self.turn += 1;
    }

    pub fn finish(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Answer for the caller; an unfinished state reports the turn limit
    pub fn answer(&self) -> Answer {
        let answer = self
            .outcome
            .as_ref()
            .map_or(TURN_LIMIT_ANSWER, Outcome::answer);
        Answer {
            answer: answer.to_string(),
        }
    }
}
