//! Parsing of task proposal payloads.
//!
//! The task proposer designs new tasks for the collection pipeline; its
//! payload is `{"proposed_task": str, "steps": [str, ...], "criteria": str}`.
//! All three fields must be present and non-empty.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{decode_object, extract_fenced_payload, fence_payload, ParseResult};

/// A validated task proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProposal {
    /// The task an expert user might complete on the target site.
    pub proposed_task: String,

    /// Steps an expert user would follow; never empty.
    pub steps: Vec<String>,

    /// The required answer and how to decide the task was completed.
    pub criteria: String,
}

/// Parses a raw model response into a validated [`TaskProposal`].
pub fn parse_task_proposal(response: &str) -> ParseResult<TaskProposal> {
    let matched = match extract_fenced_payload(response) {
        Some(matched) => matched,
        None => return ParseResult::failed(response),
    };

    let payload = match decode_object(matched) {
        Some(payload) => payload,
        None => return ParseResult::failed(response),
    };

    let proposed_task = match payload.get("proposed_task").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return ParseResult::failed(response),
    };

    let steps = match payload.get("steps").and_then(Value::as_array) {
        Some(raw) if !raw.is_empty() => {
            let mut steps = Vec::with_capacity(raw.len());
            for step in raw {
                match step.as_str() {
                    Some(s) if !s.is_empty() => steps.push(s.to_string()),
                    _ => return ParseResult::failed(response),
                }
            }
            steps
        }
        _ => return ParseResult::failed(response),
    };

    let criteria = match payload.get("criteria").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => return ParseResult::failed(response),
    };

    ParseResult::Parsed {
        value: TaskProposal {
            proposed_task,
            steps,
            criteria,
        },
        response: response.to_string(),
        matched_response: matched.to_string(),
    }
}

/// Encodes a proposal back into the fenced wire form; inverse of parsing.
pub fn encode_task_proposal(proposal: &TaskProposal) -> String {
    fence_payload(&serde_json::to_string_pretty(proposal).expect("proposal serializes"))
}
