//! JSON-RPC 2.0 wire codec.
//!
//! Encodes and decodes the three frame shapes this engine speaks: requests, success
//! responses, and error responses. `jsonrpc` is always written as `"2.0"` and accepted
//! whether present or absent on read. Notifications (id-less requests) and batch
//! (array-form) frames are out of scope — see the crate's Non-goals.

use crate::error::RpcError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

/// A JSON-RPC request frame as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestFrame {
    pub fn new(id: Value, method: String, params: Value) -> Self {
        RequestFrame { jsonrpc: jsonrpc_version(), id, method, params: Some(params) }
    }

    /// Params normalized to an array, or an invalid-params error if present but not an array.
    pub fn params_array(&self) -> Result<Vec<Value>, RpcError> {
        match &self.params {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(RpcError::invalid_params("params must be an array")),
        }
    }
}

/// A JSON-RPC error object as it appears nested under `error` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&RpcError> for WireError {
    fn from(e: &RpcError) -> Self {
        WireError { code: e.code, message: e.message.clone(), data: e.data.clone() }
    }
}

impl From<WireError> for RpcError {
    fn from(e: WireError) -> Self {
        RpcError::new(e.code, e.message, e.data)
    }
}

/// A JSON-RPC response frame: exactly one of `result`/`error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl ResponseFrame {
    pub fn success(id: Value, result: Value) -> Self {
        ResponseFrame { jsonrpc: jsonrpc_version(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, error: &RpcError) -> Self {
        ResponseFrame { jsonrpc: jsonrpc_version(), id, result: None, error: Some(error.into()) }
    }

    /// Converts this frame into the `Result` a pending outbound call ultimately completes with.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(e) => Err(e.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// The outcome of classifying and parsing a raw inbound frame.
pub enum IncomingFrame {
    Request(RequestFrame),
    Response(ResponseFrame),
    /// The payload was not valid JSON, or not a recognizable request/response shape.
    Unparseable,
}

/// Classifies and decodes one inbound message payload.
///
/// Classification happens first on the raw [`Value`]: a string `method` field means
/// request, otherwise an `id` field means response. Only after classification do we
/// attempt the strongly-typed deserialization, so a request missing a required field
/// still classifies (and fails) as a request rather than falling through to "response".
pub fn decode(raw: &str) -> IncomingFrame {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(_) => return IncomingFrame::Unparseable,
    };
    if matches!(value.get("method"), Some(Value::String(_))) {
        match serde_json::from_value::<RequestFrame>(value) {
            Ok(r) => IncomingFrame::Request(r),
            Err(_) => IncomingFrame::Unparseable,
        }
    } else if value.get("id").is_some() {
        match serde_json::from_value::<ResponseFrame>(value) {
            Ok(r) => IncomingFrame::Response(r),
            Err(_) => IncomingFrame::Unparseable,
        }
    } else {
        IncomingFrame::Unparseable
    }
}

/// The frame written for an inbound payload this engine could not even classify:
/// id `-1`, code `-32700`.
pub fn parse_error_frame() -> ResponseFrame {
    ResponseFrame::failure(Value::from(-1), &RpcError::parse_error())
}

pub fn encode(frame: &impl Serialize) -> String {
    serde_json::to_string(frame).expect("JSON-RPC frame types are always representable as JSON")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_request_by_method_field() {
        let raw = r#"{"id":1,"method":"test","params":[1,2]}"#;
        match decode(raw) {
            IncomingFrame::Request(r) => {
                assert_eq!(r.method, "test");
                assert_eq!(r.params_array().unwrap(), vec![json!(1), json!(2)]);
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn jsonrpc_field_is_optional_on_read() {
        let raw = r#"{"id":1,"method":"ping"}"#;
        match decode(raw) {
            IncomingFrame::Request(r) => assert_eq!(r.jsonrpc, "2.0"),
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn classifies_response_by_id_without_method() {
        let raw = r#"{"id":1,"result":42}"#;
        match decode(raw) {
            IncomingFrame::Response(r) => assert_eq!(r.into_result().unwrap(), json!(42)),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn error_response_round_trips() {
        let err = RpcError::method_not_found();
        let frame = ResponseFrame::failure(Value::from(7), &err);
        let encoded = encode(&frame);
        match decode(&encoded) {
            IncomingFrame::Response(r) => {
                let result = r.into_result();
                let e = result.unwrap_err();
                assert_eq!(e.code, -32601);
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn unparseable_json_yields_parse_error_frame() {
        match decode("not json") {
            IncomingFrame::Unparseable => {
                let frame = parse_error_frame();
                assert_eq!(frame.id, Value::from(-1));
                assert_eq!(frame.error.unwrap().code, -32700);
            }
            _ => panic!("expected unparseable"),
        }
    }

    #[test]
    fn non_array_params_rejected() {
        let raw = r#"{"id":1,"method":"test","params":{"a":1}}"#;
        match decode(raw) {
            IncomingFrame::Request(r) => {
                let err = r.params_array().unwrap_err();
                assert_eq!(err.code, -32602);
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn absent_params_normalize_to_empty_array() {
        let raw = r#"{"id":1,"method":"test"}"#;
        match decode(raw) {
            IncomingFrame::Request(r) => assert_eq!(r.params_array().unwrap(), Vec::<Value>::new()),
            _ => panic!("expected request"),
        }
    }
}
