// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire protocol: JSON text frames over WebSocket (spec.md §6).
//!
//! Request:  `{"id":"<uuid>","method":"<name>","params":{...}}`
//! Response: `{"id":"<uuid>","result":{...}}` or `{"id":"<uuid>","error":{"code":<int>,"message":"..."}}`
//! Event:    `{"event":"<name>","data":{...}}` (no id)
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error codes (spec.md §6).
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
pub const UNAUTHORIZED: i32 = -32000;
pub const FORBIDDEN: i32 = -32001;
pub const RATE_LIMITED: i32 = -32002;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// A parsed client→server request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Shape used only to validate incoming JSON before promoting it to a
/// [`Request`]; fields are optional here so a missing one is reported as
/// INVALID_REQUEST rather than a generic deserialize failure.
#[derive(Debug, Deserialize)]
struct RawRequest {
    id: Option<Value>,
    method: Option<Value>,
    #[serde(default)]
    params: Value,
}

/// Parses a raw text frame as a client request (spec.md §8: "invalid JSON
/// returns PARSE_ERROR; any schema mismatch returns INVALID_REQUEST"; §4.1:
/// "message text concatenates all schema issue messages, comma-separated").
pub fn parse_request(text: &str) -> Result<Request, RpcError> {
    let value: Value = serde_json::from_str(text).map_err(|e| RpcError::new(PARSE_ERROR, format!("invalid JSON: {e}")))?;
    let raw: RawRequest =
        serde_json::from_value(value).map_err(|e| RpcError::new(INVALID_REQUEST, format!("malformed request: {e}")))?;

    let mut issues = Vec::new();

    let id = match raw.id {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => {
            issues.push("request.id must be a non-empty string");
            None
        }
    };
    let method = match raw.method {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => {
            issues.push("request.method must be a non-empty string");
            None
        }
    };

    if !issues.is_empty() {
        return Err(RpcError::new(INVALID_REQUEST, issues.join(", ")));
    }

    Ok(Request { id: id.unwrap(), method: method.unwrap(), params: raw.params })
}

/// An outgoing server→client frame: a response matched to a request `id`,
/// or an unsolicited event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OutgoingFrame {
    Response {
        id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
    Event {
        event: String,
        data: Value,
    },
}

pub fn build_response(id: impl Into<String>, result: Value) -> OutgoingFrame {
    OutgoingFrame::Response { id: id.into(), result: Some(result), error: None }
}

pub fn build_error_response(id: impl Into<String>, error: RpcError) -> OutgoingFrame {
    OutgoingFrame::Response { id: id.into(), result: None, error: Some(error) }
}

pub fn build_event(event: impl Into<String>, data: Value) -> OutgoingFrame {
    OutgoingFrame::Event { event: event.into(), data }
}

pub fn serialize_frame(frame: &OutgoingFrame) -> String {
    serde_json::to_string(frame).expect("OutgoingFrame always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_invalid_json_returns_parse_error() {
        let err = parse_request("not json at all").unwrap_err();
        assert_eq!(err.code, PARSE_ERROR);
    }

    #[test]
    fn parse_missing_method_returns_invalid_request() {
        let err = parse_request(r#"{"id":"1"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn parse_missing_id_returns_invalid_request() {
        let err = parse_request(r#"{"method":"chat.send"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn parse_empty_id_returns_invalid_request() {
        let err = parse_request(r#"{"id":"","method":"chat.send"}"#).unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
    }

    #[test]
    fn parse_missing_id_and_method_concatenates_both_issues() {
        let err = parse_request("{}").unwrap_err();
        assert_eq!(err.code, INVALID_REQUEST);
        assert_eq!(
            err.message,
            "request.id must be a non-empty string, request.method must be a non-empty string"
        );
    }

    #[test]
    fn parse_well_formed_request_succeeds() {
        let req = parse_request(r#"{"id":"1","method":"chat.send","params":{"sessionId":"s1"}}"#).unwrap();
        assert_eq!(req.id, "1");
        assert_eq!(req.method, "chat.send");
        assert_eq!(req.params, json!({"sessionId":"s1"}));
    }

    #[test]
    fn parse_request_without_params_defaults_to_null() {
        let req = parse_request(r#"{"id":"1","method":"gateway.status"}"#).unwrap();
        assert_eq!(req.params, Value::Null);
    }

    #[test]
    fn response_round_trips_preserving_id_and_result() {
        let req = parse_request(r#"{"id":"abc-123","method":"gateway.status"}"#).unwrap();
        let frame = build_response(req.id.clone(), json!({"ok": true}));
        let wire = serialize_frame(&frame);

        // A client-side parser only needs generic JSON, not this crate's types.
        let parsed: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["id"], json!("abc-123"));
        assert_eq!(parsed["result"], json!({"ok": true}));
        assert!(parsed.get("error").is_none());
    }

    #[test]
    fn error_response_round_trips() {
        let frame = build_error_response("xyz", RpcError::new(METHOD_NOT_FOUND, "unknown method: foo"));
        let wire = serialize_frame(&frame);
        let parsed: Value = serde_json::from_str(&wire).unwrap();
        assert_eq!(parsed["id"], json!("xyz"));
        assert_eq!(parsed["error"]["code"], json!(METHOD_NOT_FOUND));
        assert!(parsed.get("result").is_none());
    }

    #[test]
    fn event_frame_has_no_id() {
        let frame = build_event("chat.delta", json!({"sessionId": "s1", "delta": "hi", "done": false}));
        let wire = serialize_frame(&frame);
        let parsed: Value = serde_json::from_str(&wire).unwrap();
        assert!(parsed.get("id").is_none());
        assert_eq!(parsed["event"], json!("chat.delta"));
    }
}
