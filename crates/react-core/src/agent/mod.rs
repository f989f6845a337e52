//! Turn-bounded reason + act loop
//!
//! Each turn sends the transcript to the model, decodes the reply as a
//! [`Step`](crate::step::Step) and either stops or fetches a page and feeds
//! the text back as an observation.

mod agent_loop;
mod state;

pub use agent_loop::ReactLoop;
pub use state::{
    AgentConfig, Answer, Outcome, ReactState, PARSE_FAILURE_ANSWER, TURN_LIMIT_ANSWER,
    UNKNOWN_STEP_ANSWER,
};
