//! Resilient structured-output parsing for untrusted model responses.
//!
//! Models emit free text; the pipeline needs typed records. Every parser in
//! this module shares one algorithm: locate a single ```json fenced block,
//! decode it structurally, validate shape and types, and return either a
//! typed value or an explicit failure sentinel. Three payload families share
//! the algorithm: agent actions, task proposals, and judgments.
//!
//! Failure is always data, never an exception. "No block found", "malformed
//! payload", "missing field", and "wrong type" all collapse into one `Error`
//! status: each means untrusted text failed validation, and the caller's
//! remedy (retry, log, or terminate the episode) is the same regardless.

pub mod action;
pub mod judgment;
pub mod task;

use std::sync::OnceLock;

use regex::Regex;

pub use action::{parse_action, ActionKind, BrowserAction};
pub use judgment::{parse_judgment, JudgmentScores};
pub use task::{parse_task_proposal, TaskProposal};

/// The single collapsed failure signal for all parse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Error,
}

/// Outcome of parsing one model response into a typed value.
///
/// A `Parsed` value always carries the exact substring it was derived from,
/// for audit and reproducibility. A `Failed` value is returned, never
/// raised; callers treat it as an ordinary value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseResult<T> {
    Parsed {
        value: T,
        /// The complete raw response the value was parsed out of.
        response: String,
        /// Verbatim substring of `response` the value was decoded from.
        matched_response: String,
    },
    Failed {
        status: ParseStatus,
        /// The complete raw response that failed validation.
        response: String,
    },
}

impl<T> ParseResult<T> {
    /// Constructs the failure sentinel for a response.
    pub fn failed(response: impl Into<String>) -> Self {
        ParseResult::Failed {
            status: ParseStatus::Error,
            response: response.into(),
        }
    }

    /// Returns true if parsing produced a typed value.
    pub fn is_parsed(&self) -> bool {
        matches!(self, ParseResult::Parsed { .. })
    }

    /// Returns the typed value for the `Parsed` case.
    pub fn value(&self) -> Option<&T> {
        match self {
            ParseResult::Parsed { value, .. } => Some(value),
            ParseResult::Failed { .. } => None,
        }
    }

    /// Returns the matched payload substring for the `Parsed` case.
    pub fn matched_response(&self) -> Option<&str> {
        match self {
            ParseResult::Parsed {
                matched_response, ..
            } => Some(matched_response),
            ParseResult::Failed { .. } => None,
        }
    }

    /// Returns the raw response either case carries.
    pub fn response(&self) -> &str {
        match self {
            ParseResult::Parsed { response, .. } => response,
            ParseResult::Failed { response, .. } => response,
        }
    }
}

/// Pattern for a ```json fenced payload: everything between the first open
/// fence and the next close fence, DOTALL inside so multi-line payloads are
/// captured whole.
fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```json\n(.*?)\n```").expect("fence pattern is valid")
    })
}

/// Extracts the payload of the first ```json fenced block, verbatim.
pub(crate) fn extract_fenced_payload(response: &str) -> Option<&str> {
    fence_pattern()
        .captures(response)?
        .get(1)
        .map(|m| m.as_str())
}

/// Decodes a payload substring into a JSON object.
///
/// Non-object payloads (arrays, scalars) are rejected: all three payload
/// families are objects at the top level.
pub(crate) fn decode_object(payload: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Wraps a serialized payload in the fenced form the parsers expect.
///
/// Inverse of [`extract_fenced_payload`]: parsing the returned text yields
/// the payload back verbatim.
pub fn fence_payload(payload: &str) -> String {
    format!("```json\n{}\n```", payload)
}
