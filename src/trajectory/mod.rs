//! Trajectory data model for agent-environment episodes.
//!
//! An episode ("trajectory") is an ordered observation/action history plus a
//! final judgment. These records are what the pipeline persists per domain,
//! and what downstream training consumers read back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata keys retained inside each observation metadata entry.
///
/// Environment backends attach free-form per-element metadata; everything
/// outside this fixed set is dropped before the observation is recorded so
/// artifact size stays bounded.
pub const METADATA_KEYS: &[&str] = &[
    "backend_node_id",
    "bounding_client_rect",
    "computed_style",
    "scroll_left",
    "scroll_top",
    "editable_value",
];

/// Score keys a judgment carries.
pub const VALUE_KEYS: &[&str] = &["success", "efficiency", "self_correction"];

/// A single snapshot of the environment at one step of an episode.
///
/// Immutable once captured. The raw screenshot bytes are never serialized;
/// persistence externalizes them to `screenshot_path` so the on-disk record
/// stays small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Address the environment was at when the snapshot was taken.
    pub current_url: String,

    /// Text rendering of the page that the agent and judge consume.
    pub processed_text: String,

    /// Raw page markup, when the backend provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_html: Option<String>,

    /// Raw screenshot bytes. In-memory only; see `screenshot_path`.
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,

    /// Path the screenshot was externalized to, once persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,

    /// Per-element metadata, normalized to [`METADATA_KEYS`] before recording.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Observation {
    /// Restricts every metadata entry to the fixed [`METADATA_KEYS`] set.
    ///
    /// Keys absent from an entry are kept as explicit nulls so downstream
    /// consumers see a uniform shape.
    pub fn normalize_metadata(&mut self) {
        for (_, entry) in self.metadata.iter_mut() {
            let source = match entry.as_object() {
                Some(obj) => obj.clone(),
                None => continue,
            };

            let mut pruned = Map::new();
            for key in METADATA_KEYS {
                pruned.insert(
                    (*key).to_string(),
                    source.get(*key).cloned().unwrap_or(Value::Null),
                );
            }
            *entry = Value::Object(pruned);
        }
    }
}

/// A normalized operation derived from a validated agent decision.
///
/// The dotted path names an operation in the execution interface's
/// vocabulary, decoupled from the wire vocabulary the agent emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Dotted operation path, e.g. `page.locator.click` or `page.goto`.
    pub dotpath: String,

    /// Keyword arguments for the operation.
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(dotpath: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            dotpath: dotpath.into(),
            args,
        }
    }
}

/// One decision taken by the agent during an episode.
///
/// Carries the raw model text alongside the normalized operations so the
/// record stays auditable even when parsing failed (`matched_response` is
/// null and `function_calls` is empty in that case).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Normalized operations derived from the response; empty on parse failure.
    pub function_calls: Vec<FunctionCall>,

    /// The complete raw model response.
    pub response: String,

    /// Exact substring the payload was parsed from; null on parse failure.
    pub matched_response: Option<String>,
}

/// The evaluator's verdict over one completed episode.
///
/// Absent component scores are null, not zero: zero is a valid low score,
/// null means the judge did not produce that component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    pub success: Option<f64>,
    pub efficiency: Option<f64>,
    pub self_correction: Option<f64>,

    /// The complete raw judge response.
    pub response: String,

    /// Exact substring the scores were parsed from; null on parse failure.
    pub matched_response: Option<String>,
}

impl Judgment {
    /// A judgment with no component scores, carrying whatever raw response
    /// was available. Failed tasks still persist one of these so that the
    /// absence of a judgment artifact only ever means "not attempted".
    pub fn empty(response: impl Into<String>) -> Self {
        Self {
            success: None,
            efficiency: None,
            self_correction: None,
            response: response.into(),
            matched_response: None,
        }
    }
}

/// The artifact triple produced by one episode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryOutput {
    pub observations: Vec<Observation>,
    pub actions: Vec<ActionRecord>,
    pub judgment: Judgment,
}

/// Which field of each [`ActionRecord`] the judge reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentResponseKey {
    /// The complete raw response, including any prose around the payload.
    Response,

    /// Only the matched payload substring; null for unparsable decisions.
    MatchedResponse,
}

impl AgentResponseKey {
    /// Selects the configured field from an action record.
    pub fn select<'a>(&self, action: &'a ActionRecord) -> Option<&'a str> {
        match self {
            AgentResponseKey::Response => Some(action.response.as_str()),
            AgentResponseKey::MatchedResponse => action.matched_response.as_deref(),
        }
    }
}
