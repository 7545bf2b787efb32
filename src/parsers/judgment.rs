//! Parsing of judgment payloads.
//!
//! The evaluator scores a completed episode with up to three components:
//! `{"success": float, "efficiency": float, "self_correction": float}`. Each
//! component is independently optional; when present it must be numeric and
//! is clamped into `[0, 1]`. An absent component stays null, never zero.

use serde_json::{Map, Value};

use super::{decode_object, extract_fenced_payload, fence_payload, ParseResult};
use crate::trajectory::Judgment;

/// Component scores decoded from a judgment payload.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JudgmentScores {
    pub success: Option<f64>,
    pub efficiency: Option<f64>,
    pub self_correction: Option<f64>,
}

impl JudgmentScores {
    /// Attaches the raw/matched text to form a full [`Judgment`] record.
    pub fn into_judgment(self, response: String, matched_response: Option<String>) -> Judgment {
        Judgment {
            success: self.success,
            efficiency: self.efficiency,
            self_correction: self.self_correction,
            response,
            matched_response,
        }
    }
}

/// Parses a raw judge response into component scores.
///
/// Returns `Failed` when no fenced block exists, the payload is not an
/// object, or any present component is non-numeric.
pub fn parse_judgment(response: &str) -> ParseResult<JudgmentScores> {
    let matched = match extract_fenced_payload(response) {
        Some(matched) => matched,
        None => return ParseResult::failed(response),
    };

    let payload = match decode_object(matched) {
        Some(payload) => payload,
        None => return ParseResult::failed(response),
    };

    let success = match score_field(&payload, "success") {
        Ok(score) => score,
        Err(()) => return ParseResult::failed(response),
    };
    let efficiency = match score_field(&payload, "efficiency") {
        Ok(score) => score,
        Err(()) => return ParseResult::failed(response),
    };
    let self_correction = match score_field(&payload, "self_correction") {
        Ok(score) => score,
        Err(()) => return ParseResult::failed(response),
    };

    ParseResult::Parsed {
        value: JudgmentScores {
            success,
            efficiency,
            self_correction,
        },
        response: response.to_string(),
        matched_response: matched.to_string(),
    }
}

/// Reads one optional score, clamped to `[0, 1]`. Null and absent both mean
/// "not scored"; any other non-numeric value is a validation failure.
fn score_field(payload: &Map<String, Value>, key: &str) -> Result<Option<f64>, ()> {
    match payload.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(score) => Ok(Some(score.clamp(0.0, 1.0))),
            None => Err(()),
        },
        Some(_) => Err(()),
    }
}

/// Encodes scores back into the fenced wire form; inverse of parsing.
pub fn encode_judgment(scores: &JudgmentScores) -> String {
    let mut payload = Map::new();
    payload.insert(
        "success".to_string(),
        scores.success.map(Value::from).unwrap_or(Value::Null),
    );
    payload.insert(
        "efficiency".to_string(),
        scores.efficiency.map(Value::from).unwrap_or(Value::Null),
    );
    payload.insert(
        "self_correction".to_string(),
        scores
            .self_correction
            .map(Value::from)
            .unwrap_or(Value::Null),
    );

    fence_payload(&serde_json::to_string(&Value::Object(payload)).expect("payload serializes"))
}
