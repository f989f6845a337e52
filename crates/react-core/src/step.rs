//! Step protocol: the JSON decision the model returns each turn
//!
//! Wire shapes:
//! - `{"type":"action","tool":"fetch","args":{"url":"https://..."},"thought":"..."}`
//! - `{"type":"final","answer":"...","thought":"..."}`

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One decision unit returned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    Action(Action),
    Final(Final),
}

/// Request to run a tool before answering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool: Tool,
    pub args: FetchArgs,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub thought: String,
}

/// A missing or `null` rationale reads as empty
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Supported tools. Anything else fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Fetch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchArgs {
    pub url: String,
}

/// Terminal answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Final {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
}

/// Result of decoding one raw model reply
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A well-formed step
    Step(Step),
    /// Valid JSON that is not one of the two step shapes
    Unrecognized(Value),
    /// Not JSON at all
    Malformed(String),
}

impl Step {
    /// Decode a raw model reply.
    ///
    /// Non-JSON text and JSON of the wrong shape are kept apart so the caller
    /// can report them differently.
    pub fn decode(raw: &str) -> Decoded {
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => return Decoded::Malformed(e.to_string()),
        };

        match serde_json::from_value::<Step>(value.clone()) {
            Ok(step) => Decoded::Step(step),
            Err(_) => Decoded::Unrecognized(value),
        }
    }

    /// Canonical single-line JSON form, echoed back into the transcript
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
