//! Agent loop implementation

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::extract::{truncate_chars, PageFetcher};
use crate::openai::{ChatMessage, ChatModel};
use crate::step::{Decoded, Step, Tool};

use super::state::{AgentConfig, Outcome, ReactState};

/// The loop orchestrator
pub struct ReactLoop<M, F> {
    model: M,
    fetcher: F,
    config: AgentConfig,
}

impl<M: ChatModel, F: PageFetcher> ReactLoop<M, F> {
    pub fn new(model: M, fetcher: F, config: AgentConfig) -> Self {
        Self {
            model,
            fetcher,
            config,
        }
    }

    /// Answer `question`, calling the model at most `max_turns` times.
    ///
    /// Every model-behavior failure ends in an [`Outcome`]; only a failed
    /// model call is returned as `Err`.
    #[instrument(skip(self, question), fields(max_turns = self.config.max_turns))]
    pub async fn run(&self, question: &str) -> Result<ReactState> {
        info!(question_len = question.len(), "Starting react loop");
        let mut state = ReactState::new();

        state.add_message(ChatMessage::system(system_prompt(self.config.max_turns)));
        state.add_message(ChatMessage::user(question_prompt(question)));

        while !state.is_finished() && state.turn < self.config.max_turns {
            state.increment_turn();
            debug!(turn = state.turn, messages = state.messages.len(), "Calling model");

            let raw = self
                .model
                .complete(&state.messages)
                .await
                .with_context(|| format!("Model call failed on turn {}", state.turn))?;

            let step = match Step::decode(&raw) {
                Decoded::Step(step) => step,
                Decoded::Malformed(error) => {
                    warn!(turn = state.turn, %error, "Model output is not JSON");
                    state.finish(Outcome::ParseFailure);
                    break;
                }
                Decoded::Unrecognized(value) => {
                    warn!(turn = state.turn, step = %value, "Model returned an unrecognized step");
                    state.finish(Outcome::UnknownStep);
                    break;
                }
            };

            match &step {
                Step::Final(fin) => {
                    debug!(turn = state.turn, "Model returned final answer");
                    state.finish(Outcome::Final(fin.answer.clone()));
                }
                Step::Action(action) => match action.tool {
                    Tool::Fetch => {
                        let observation = self.observe(&action.args.url).await;
                        state.add_message(ChatMessage::assistant(step.to_canonical_json()));
                        state.add_message(ChatMessage::user(observation_prompt(
                            truncate_chars(&observation, self.config.observation_limit),
                        )));
                    }
                },
            }
        }

        let outcome = match state.outcome.clone() {
            Some(outcome) => outcome,
            None => {
                warn!(max_turns = self.config.max_turns, "Reached turn limit");
                state.finish(Outcome::TurnLimit);
                Outcome::TurnLimit
            }
        };

        info!(
            turns = state.turn,
            messages = state.messages.len(),
            outcome = %outcome,
            "React loop completed"
        );

        Ok(state)
    }

    /// Fetch `url` for the model; failures become an `ERROR:` observation
    async fn observe(&self, url: &str) -> String {
        debug!(url, "Fetching page");
        match self.fetcher.fetch_text(url).await {
            Ok(text) => {
                debug!(chars = text.chars().count(), "Fetched observation");
                text
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(url, error = %message, "Fetch failed");
                format!("ERROR: {}", message)
            }
        }
    }
}

fn system_prompt(max_turns: usize) -> String {
    format!(
        r#"You are an assistant that can use tools. Work in ReAct style.
Each turn, reply with strict JSON only (no extra characters or explanation).
The JSON must have one of these two shapes:

1) Take an action:
{{"type":"action","tool":"fetch","args":{{"url":"https://..."}},"thought":"brief reasoning"}}

2) Final answer:
{{"type":"final","answer":"your answer","thought":"optional"}}

Rules:
- Output nothing but valid JSON.
- If no URL is needed, give the final answer.
- You must reach "final" within {max_turns} turns."#
    )
}

fn question_prompt(question: &str) -> String {
    format!(
        "Question: {}\nIf needed, use the \"fetch\" tool to retrieve the page text, then answer.",
        question
    )
}

fn observation_prompt(observation: &str) -> String {
    format!(
        "Observation: {}\n\nReply with the final answer (JSON) next.",
        observation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::state::{PARSE_FAILURE_ANSWER, TURN_LIMIT_ANSWER, UNKNOWN_STEP_ANSWER};
    use crate::openai::Role;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays canned replies and records every transcript it receives
    struct ScriptedModel {
        replies: Mutex<VecDeque<Result<String, String>>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: &str) -> Self {
            Self {
                replies: Mutex::new(VecDeque::from([Err(error.to_string())])),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn transcript(&self, call: usize) -> Vec<ChatMessage> {
            self.seen.lock().unwrap()[call].clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Err(anyhow::anyhow!("script exhausted")),
            }
        }
    }

    /// Serves fixed pages; unknown URLs fail like a 404
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl StubFetcher {
        fn with_page(mut self, url: &str, text: &str) -> Self {
            self.pages.insert(url.to_string(), text.to_string());
            self
        }

        fn requested(&self) -> Vec<String> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch_text(&self, url: &str) -> Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            match self.pages.get(url) {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("fetch failed: 404"),
            }
        }
    }

    fn fetch_step(url: &str) -> String {
        format!(
            r#"{{"type":"action","tool":"fetch","args":{{"url":"{}"}},"thought":"read it"}}"#,
            url
        )
    }

    fn react(model: ScriptedModel, fetcher: StubFetcher) -> ReactLoop<ScriptedModel, StubFetcher> {
        ReactLoop::new(model, fetcher, AgentConfig::default())
    }

    #[tokio::test]
    async fn test_immediate_final_answer() {
        let agent = react(
            ScriptedModel::new(&[r#"{"type":"final","answer":"Paris"}"#]),
            StubFetcher::default(),
        );

        let state = agent.run("What is the capital of France?").await.unwrap();
        assert_eq!(state.answer().answer, "Paris");
        assert_eq!(state.outcome, Some(Outcome::Final("Paris".to_string())));
        assert_eq!(agent.model.calls(), 1);

        let first = agent.model.transcript(0);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].role, Role::System);
        assert!(first[0].content.contains("within 3 turns"));
        assert_eq!(first[1].role, Role::User);
        assert!(first[1].content.contains("What is the capital of France?"));
        assert!(first[1].content.contains("fetch"));
    }

    #[tokio::test]
    async fn test_final_answer_is_returned_verbatim() {
        let answer = "  Multi-line\nanswer with \"quotes\" and ユニコード  ";
        let reply =
            serde_json::json!({"type": "final", "answer": answer, "thought": "t"}).to_string();
        let agent = react(ScriptedModel::new(&[reply.as_str()]), StubFetcher::default());

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.answer().answer, answer);
    }

    #[tokio::test]
    async fn test_invalid_json_stops_after_one_turn() {
        let agent = react(
            ScriptedModel::new(&["The answer is Paris.", r#"{"type":"final","answer":"late"}"#]),
            StubFetcher::default(),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::ParseFailure));
        assert_eq!(state.answer().answer, PARSE_FAILURE_ANSWER);
        assert_eq!(state.turn, 1);
        assert_eq!(agent.model.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_then_final() {
        let url = "https://example.com/page";
        let agent = react(
            ScriptedModel::new(&[fetch_step(url).as_str(), r#"{"type":"final","answer":"42"}"#]),
            StubFetcher::default().with_page(url, "The answer is 42."),
        );

        let state = agent.run("What is the answer?").await.unwrap();
        assert_eq!(state.answer().answer, "42");
        assert_eq!(agent.model.calls(), 2);
        assert_eq!(agent.fetcher.requested(), vec![url.to_string()]);

        let second = agent.model.transcript(1);
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(
            second[2].content,
            concat!(
                r#"{"type":"action","tool":"fetch","#,
                r#""args":{"url":"https://example.com/page"},"thought":"read it"}"#
            )
        );
        assert_eq!(second[3].role, Role::User);
        assert!(second[3]
            .content
            .starts_with("Observation: The answer is 42.\n\n"));
    }

    #[tokio::test]
    async fn test_null_thought_still_fetches() {
        let url = "https://example.com/page";
        let action = serde_json::json!({
            "type": "action",
            "tool": "fetch",
            "args": {"url": url},
            "thought": null
        })
        .to_string();
        let agent = react(
            ScriptedModel::new(&[action.as_str(), r#"{"type":"final","answer":"42"}"#]),
            StubFetcher::default().with_page(url, "The answer is 42."),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.answer().answer, "42");
        assert_eq!(agent.fetcher.requested(), vec![url.to_string()]);
        assert!(agent.model.transcript(1)[2].content.ends_with(r#""thought":""}"#));
    }

    #[tokio::test]
    async fn test_fetch_failure_becomes_error_observation() {
        let url = "https://unreachable.example/missing";
        let agent = react(
            ScriptedModel::new(&[
                fetch_step(url).as_str(),
                r#"{"type":"final","answer":"could not read it"}"#,
            ]),
            StubFetcher::default(),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.answer().answer, "could not read it");
        assert_eq!(agent.model.calls(), 2);

        let second = agent.model.transcript(1);
        let observation = second[3]
            .content
            .strip_prefix("Observation: ")
            .unwrap();
        assert!(observation.starts_with("ERROR: fetch failed: 404"), "{observation}");
    }

    #[tokio::test]
    async fn test_unsupported_tool_is_unknown_step() {
        let agent = react(
            ScriptedModel::new(&[
                r#"{"type":"action","tool":"search","args":{"url":"https://a.test"}}"#,
                r#"{"type":"final","answer":"late"}"#,
            ]),
            StubFetcher::default(),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::UnknownStep));
        assert_eq!(state.answer().answer, UNKNOWN_STEP_ANSWER);
        assert_eq!(agent.model.calls(), 1);
        assert!(agent.fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_action_is_unknown_step() {
        let agent = react(
            ScriptedModel::new(&[r#"{"type":"action","tool":"fetch","thought":"forgot args"}"#]),
            StubFetcher::default(),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::UnknownStep));
        assert_eq!(agent.model.calls(), 1);
    }

    #[tokio::test]
    async fn test_turn_limit_caps_model_calls() {
        let url = "https://example.com/";
        let step = fetch_step(url);
        let agent = react(
            ScriptedModel::new(&[step.as_str(); 5]),
            StubFetcher::default().with_page(url, "loop"),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::TurnLimit));
        assert_eq!(state.answer().answer, TURN_LIMIT_ANSWER);
        assert_eq!(agent.model.calls(), 3);
        assert_eq!(agent.fetcher.requested().len(), 3);
        // system + question + 3 x (action, observation)
        assert_eq!(state.messages.len(), 8);
    }

    #[tokio::test]
    async fn test_custom_turn_budget() {
        let url = "https://example.com/";
        let step = fetch_step(url);
        let agent = ReactLoop::new(
            ScriptedModel::new(&[step.as_str(), step.as_str()]),
            StubFetcher::default().with_page(url, "text"),
            AgentConfig::default().with_max_turns(1),
        );

        let state = agent.run("q").await.unwrap();
        assert_eq!(state.outcome, Some(Outcome::TurnLimit));
        assert_eq!(agent.model.calls(), 1);
        assert!(agent.model.transcript(0)[0].content.contains("within 1 turns"));
    }

    #[tokio::test]
    async fn test_observation_is_truncated() {
        let url = "https://example.com/long";
        let page = "a".repeat(5000);
        let agent = react(
            ScriptedModel::new(&[fetch_step(url).as_str(), r#"{"type":"final","answer":"ok"}"#]),
            StubFetcher::default().with_page(url, &page),
        );

        agent.run("q").await.unwrap();

        let second = agent.model.transcript(1);
        let observation = second[3]
            .content
            .strip_prefix("Observation: ")
            .and_then(|s| s.split("\n\n").next())
            .unwrap();
        assert_eq!(observation.chars().count(), 4000);
    }

    #[tokio::test]
    async fn test_repeated_runs_are_identical() {
        let url = "https://example.com/page";
        let script = [fetch_step(url), r#"{"type":"final","answer":"same"}"#.to_string()];
        let script: Vec<&str> = script.iter().map(String::as_str).collect();

        let first = react(
            ScriptedModel::new(&script),
            StubFetcher::default().with_page(url, "content"),
        );
        let second = react(
            ScriptedModel::new(&script),
            StubFetcher::default().with_page(url, "content"),
        );

        let a = first.run("same question").await.unwrap();
        let b = second.run("same question").await.unwrap();
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.answer(), b.answer());
        assert_eq!(
            first.model.seen.lock().unwrap().clone(),
            second.model.seen.lock().unwrap().clone()
        );
    }

    #[tokio::test]
    async fn test_model_failure_propagates() {
        let agent = react(
            ScriptedModel::failing("model endpoint returned 500"),
            StubFetcher::default(),
        );

        let err = agent.run("q").await.unwrap_err();
        assert!(format!("{:#}", err).contains("model endpoint returned 500"));
        assert!(agent.fetcher.requested().is_empty());
    }

    #[tokio::test]
    async fn test_model_failure_on_second_turn_propagates() {
        let url = "https://example.com/";
        let agent = react(
            ScriptedModel::new(&[fetch_step(url).as_str()]),
            StubFetcher::default().with_page(url, "text"),
        );

        let err = agent.run("q").await.unwrap_err();
        assert!(err.to_string().contains("turn 2"), "{err}");
    }
}
