//! Parsing and normalization of agent action payloads.
//!
//! The wire schema is `{"action_key": str, "action_kwargs": object,
//! "target_element_id": int | null}`. Action kinds form a closed enumeration,
//! each carrying its own exact required-kwargs schema; the discriminator is
//! read first and dispatches the per-variant validation. Validated records
//! are normalized into dotted operation paths the execution interface
//! understands, decoupling the wire vocabulary from execution.

use serde_json::{Map, Value};

use super::{decode_object, extract_fenced_payload, fence_payload, ParseResult};
use crate::trajectory::FunctionCall;

/// The closed set of action kinds an agent may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Click,
    Hover,
    Scroll,
    Fill,
    Select,
    SetChecked,
    GoBack,
    Goto,
    Stop,
}

impl ActionKind {
    /// All kinds, in wire order.
    pub const ALL: &'static [ActionKind] = &[
        ActionKind::Click,
        ActionKind::Hover,
        ActionKind::Scroll,
        ActionKind::Fill,
        ActionKind::Select,
        ActionKind::SetChecked,
        ActionKind::GoBack,
        ActionKind::Goto,
        ActionKind::Stop,
    ];

    /// Resolves the wire discriminator into a kind.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "click" => Some(ActionKind::Click),
            "hover" => Some(ActionKind::Hover),
            "scroll" => Some(ActionKind::Scroll),
            "fill" => Some(ActionKind::Fill),
            "select" => Some(ActionKind::Select),
            "set_checked" => Some(ActionKind::SetChecked),
            "go_back" => Some(ActionKind::GoBack),
            "goto" => Some(ActionKind::Goto),
            "stop" => Some(ActionKind::Stop),
            _ => None,
        }
    }

    /// The wire discriminator for this kind.
    pub fn key(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Hover => "hover",
            ActionKind::Scroll => "scroll",
            ActionKind::Fill => "fill",
            ActionKind::Select => "select",
            ActionKind::SetChecked => "set_checked",
            ActionKind::GoBack => "go_back",
            ActionKind::Goto => "goto",
            ActionKind::Stop => "stop",
        }
    }

    /// The exact set of kwargs this kind requires. No more, no fewer.
    pub fn required_kwargs(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Click | ActionKind::Hover | ActionKind::GoBack => &[],
            ActionKind::Scroll => &["delta_x", "delta_y"],
            ActionKind::Fill => &["value"],
            ActionKind::Select => &["label"],
            ActionKind::SetChecked => &["checked"],
            ActionKind::Goto => &["url"],
            ActionKind::Stop => &["answer"],
        }
    }

    /// Whether this kind targets a specific page element.
    pub fn requires_element(&self) -> bool {
        matches!(
            self,
            ActionKind::Click
                | ActionKind::Hover
                | ActionKind::Fill
                | ActionKind::Select
                | ActionKind::SetChecked
        )
    }
}

/// A validated agent decision, carrying its normalized operations.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserAction {
    pub kind: ActionKind,
    pub kwargs: Map<String, Value>,
    pub target_element_id: Option<i64>,
    pub function_calls: Vec<FunctionCall>,
}

impl BrowserAction {
    /// Whether this decision is the explicit episode terminator.
    pub fn is_stop(&self) -> bool {
        self.kind == ActionKind::Stop
    }
}

/// Parses a raw model response into a validated [`BrowserAction`].
///
/// Returns `Failed` when no fenced block exists, the payload is not a JSON
/// object, the discriminator is unknown, the kwargs differ from the kind's
/// exact schema, any kwarg has the wrong type, or the element id is missing
/// where required.
pub fn parse_action(response: &str) -> ParseResult<BrowserAction> {
    let matched = match extract_fenced_payload(response) {
        Some(matched) => matched,
        None => return ParseResult::failed(response),
    };

    let payload = match decode_object(matched) {
        Some(payload) => payload,
        None => return ParseResult::failed(response),
    };

    let kind = match payload.get("action_key").and_then(Value::as_str) {
        Some(key) => match ActionKind::from_key(key) {
            Some(kind) => kind,
            None => return ParseResult::failed(response),
        },
        None => return ParseResult::failed(response),
    };

    let kwargs = match payload.get("action_kwargs").and_then(Value::as_object) {
        Some(kwargs) => kwargs.clone(),
        None => return ParseResult::failed(response),
    };

    let target_element_id = match payload.get("target_element_id") {
        Some(Value::Null) | None => None,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(id) => Some(id),
            None => return ParseResult::failed(response),
        },
        Some(_) => return ParseResult::failed(response),
    };

    if !validate_kwargs(kind, &kwargs) {
        return ParseResult::failed(response);
    }

    if kind.requires_element() && target_element_id.is_none() {
        return ParseResult::failed(response);
    }

    let function_calls = normalize(kind, &kwargs, target_element_id);

    ParseResult::Parsed {
        value: BrowserAction {
            kind,
            kwargs,
            target_element_id,
            function_calls,
        },
        response: response.to_string(),
        matched_response: matched.to_string(),
    }
}

/// Checks the kwargs object exactly matches the kind's schema, keys and types.
fn validate_kwargs(kind: ActionKind, kwargs: &Map<String, Value>) -> bool {
    let required = kind.required_kwargs();

    if kwargs.len() != required.len() {
        return false;
    }

    required.iter().all(|key| match kwargs.get(*key) {
        Some(value) => kwarg_type_ok(key, value),
        None => false,
    })
}

fn kwarg_type_ok(key: &str, value: &Value) -> bool {
    match key {
        "delta_x" | "delta_y" => value.is_number(),
        "checked" => value.is_boolean(),
        "value" | "label" | "url" | "answer" => value.is_string(),
        _ => false,
    }
}

/// Maps a validated record to normalized operation descriptors.
fn normalize(
    kind: ActionKind,
    kwargs: &Map<String, Value>,
    target_element_id: Option<i64>,
) -> Vec<FunctionCall> {
    let mut args = Map::new();

    if let Some(id) = target_element_id {
        if kind.requires_element() {
            args.insert("element_id".to_string(), Value::from(id));
        }
    }

    for key in kind.required_kwargs() {
        if let Some(value) = kwargs.get(*key) {
            args.insert((*key).to_string(), value.clone());
        }
    }

    let dotpath = match kind {
        ActionKind::Click => "page.locator.click",
        ActionKind::Hover => "page.locator.hover",
        ActionKind::Scroll => "page.mouse.wheel",
        ActionKind::Fill => "page.locator.fill",
        ActionKind::Select => "page.locator.select_option",
        ActionKind::SetChecked => "page.locator.set_checked",
        ActionKind::GoBack => "page.go_back",
        ActionKind::Goto => "page.goto",
        ActionKind::Stop => "stop",
    };

    vec![FunctionCall::new(dotpath, args)]
}

/// Encodes a validated action back into the fenced wire form.
///
/// Parsing the returned text yields an equal action; used for agent memory
/// replay and round-trip tests.
pub fn encode_action(action: &BrowserAction) -> String {
    let mut payload = Map::new();
    payload.insert(
        "action_key".to_string(),
        Value::String(action.kind.key().to_string()),
    );
    payload.insert(
        "action_kwargs".to_string(),
        Value::Object(action.kwargs.clone()),
    );
    payload.insert(
        "target_element_id".to_string(),
        action
            .target_element_id
            .map(Value::from)
            .unwrap_or(Value::Null),
    );

    fence_payload(&serde_json::to_string(&Value::Object(payload)).expect("payload serializes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(payload: &str) -> String {
        format!("I will click the login link.\n\n```json\n{}\n```", payload)
    }

    #[test]
    fn test_parse_click() {
        let response = wire(r#"{"action_key": "click", "action_kwargs": {}, "target_element_id": 5}"#);
        let result = parse_action(&response);

        let action = result.value().expect("should parse");
        assert_eq!(action.kind, ActionKind::Click);
        assert_eq!(action.target_element_id, Some(5));
        assert_eq!(action.function_calls.len(), 1);
        assert_eq!(action.function_calls[0].dotpath, "page.locator.click");
        assert_eq!(action.function_calls[0].args.get("element_id"), Some(&json!(5)));

        // The matched substring is verbatim from the response.
        let matched = result.matched_response().unwrap();
        assert!(response.contains(matched));
    }

    #[test]
    fn test_parse_scroll_requires_both_deltas() {
        let ok = wire(
            r#"{"action_key": "scroll", "action_kwargs": {"delta_x": 0, "delta_y": 500}, "target_element_id": null}"#,
        );
        let result = parse_action(&ok);
        let action = result.value().expect("should parse");
        assert_eq!(action.function_calls[0].dotpath, "page.mouse.wheel");
        assert_eq!(action.function_calls[0].args.get("delta_y"), Some(&json!(500)));

        let missing = wire(
            r#"{"action_key": "scroll", "action_kwargs": {"delta_y": 500}, "target_element_id": null}"#,
        );
        assert!(!parse_action(&missing).is_parsed());
    }

    #[test]
    fn test_parse_fill() {
        let response = wire(
            r#"{"action_key": "fill", "action_kwargs": {"value": "rust lang"}, "target_element_id": 12}"#,
        );
        let action = parse_action(&response).value().cloned().expect("should parse");
        assert_eq!(action.function_calls[0].dotpath, "page.locator.fill");
        assert_eq!(
            action.function_calls[0].args.get("value"),
            Some(&json!("rust lang"))
        );
        assert_eq!(action.function_calls[0].args.get("element_id"), Some(&json!(12)));
    }

    #[test]
    fn test_parse_goto_and_stop() {
        let goto = wire(
            r#"{"action_key": "goto", "action_kwargs": {"url": "http://example.com"}, "target_element_id": null}"#,
        );
        let action = parse_action(&goto).value().cloned().expect("should parse");
        assert_eq!(action.function_calls[0].dotpath, "page.goto");

        let stop = wire(
            r#"{"action_key": "stop", "action_kwargs": {"answer": "The valve is 237 mm."}, "target_element_id": null}"#,
        );
        let action = parse_action(&stop).value().cloned().expect("should parse");
        assert!(action.is_stop());
        assert_eq!(action.function_calls[0].dotpath, "stop");
    }

    #[test]
    fn test_set_checked_requires_boolean() {
        let ok = wire(
            r#"{"action_key": "set_checked", "action_kwargs": {"checked": true}, "target_element_id": 3}"#,
        );
        assert!(parse_action(&ok).is_parsed());

        let wrong_type = wire(
            r#"{"action_key": "set_checked", "action_kwargs": {"checked": "yes"}, "target_element_id": 3}"#,
        );
        assert!(!parse_action(&wrong_type).is_parsed());
    }

    #[test]
    fn test_extra_kwargs_rejected() {
        let response = wire(
            r#"{"action_key": "click", "action_kwargs": {"force": true}, "target_element_id": 5}"#,
        );
        assert!(!parse_action(&response).is_parsed());
    }

    #[test]
    fn test_element_required_for_element_actions() {
        let response = wire(
            r#"{"action_key": "click", "action_kwargs": {}, "target_element_id": null}"#,
        );
        assert!(!parse_action(&response).is_parsed());
    }

    #[test]
    fn test_unknown_action_key_rejected() {
        let response = wire(
            r#"{"action_key": "teleport", "action_kwargs": {}, "target_element_id": null}"#,
        );
        assert!(!parse_action(&response).is_parsed());
    }

    #[test]
    fn test_no_fenced_block_fails_without_panic() {
        let result = parse_action("Sure! I'd click the login button next.");
        assert!(!result.is_parsed());
        assert_eq!(result.response(), "Sure! I'd click the login button next.");
    }

    #[test]
    fn test_malformed_payload_fails() {
        assert!(!parse_action("```json\n{broken\n```").is_parsed());
        assert!(!parse_action("```json\n[1, 2, 3]\n```").is_parsed());
    }

    #[test]
    fn test_missing_required_field_fails() {
        // No action_kwargs object at all.
        let response = wire(r#"{"action_key": "click", "target_element_id": 5}"#);
        assert!(!parse_action(&response).is_parsed());
    }

    #[test]
    fn test_fractional_element_id_rejected() {
        let response = wire(
            r#"{"action_key": "click", "action_kwargs": {}, "target_element_id": 1.5}"#,
        );
        assert!(!parse_action(&response).is_parsed());
    }

    #[test]
    fn test_encode_round_trip() {
        for payload in [
            r#"{"action_key": "click", "action_kwargs": {}, "target_element_id": 5}"#,
            r#"{"action_key": "scroll", "action_kwargs": {"delta_x": 0, "delta_y": -250}, "target_element_id": null}"#,
            r#"{"action_key": "stop", "action_kwargs": {"answer": "done"}, "target_element_id": null}"#,
        ] {
            let original = parse_action(&wire(payload)).value().cloned().expect("parses");
            let reencoded = encode_action(&original);
            let reparsed = parse_action(&reencoded).value().cloned().expect("reparses");
            assert_eq!(original, reparsed);
        }
    }
}
