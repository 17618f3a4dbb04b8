//! Error taxonomy for the JSON-RPC engine.
//!
//! An [`RpcError`] is the carrier presented to local callers (handlers, the method proxy) and
//! the shape a wire error response is built from. It mirrors the JSON-RPC 2.0 error object
//! (`code`, `message`, `data`) and adds a [`ErrorKind`] tag classifying the error for callers
//! that want to branch on it without matching on the numeric code.

use serde_json::Value;
use std::fmt;

/// Coarse classification of an [`RpcError`], derived from its code unless the error
/// originated from a handler that supplied its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connection-level failures: disconnect, timeout.
    Network,
    /// Malformed JSON or malformed JSON-RPC shape.
    Protocol,
    /// The peer rejected the call on its own terms: unknown method, bad params.
    Business,
    /// Anything else, including handler panics mapped to -32603.
    System,
}

/// An error surfaced to a local caller, and the source of an on-wire error response.
///
/// Handlers that want to control the on-wire `code`/`data` should construct this directly
/// (e.g. via [`RpcError::custom`]); any other `Result::Err` a handler returns is mapped to
/// [`RpcError::internal_error`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<Value>,
    pub kind: ErrorKind,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        let kind = kind_for_code(code);
        RpcError { code, message: message.into(), data, kind }
    }

    /// Builds an error with an explicit kind, overriding the code-derived default.
    ///
    /// Used when forwarding a handler-supplied error verbatim: its code/message/data are
    /// preserved, but it may also have arrived carrying its own kind.
    pub fn with_kind(code: i32, message: impl Into<String>, data: Option<Value>, kind: ErrorKind) -> Self {
        RpcError { code, message: message.into(), data, kind }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error.", None)
    }

    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request.", None)
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found.", None)
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(-32602, "Invalid params.", Some(Value::String(detail.into())))
    }

    /// The chain-contract violation: an intermediate middleware returned a value.
    pub fn chain_contract_violation() -> Self {
        Self::new(-32603, "Only the last handler in the chain can return a value", None)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message.into(), None)
    }

    pub fn connection_closed() -> Self {
        Self::new(-32000, "Server disconnected.", None)
    }

    pub fn timeout() -> Self {
        Self::new(-32001, "Request timeout.", None)
    }

    /// A handler-supplied error with an application-chosen code, forwarded verbatim.
    pub fn custom(code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::new(code, message, data)
    }
}

/// Maps a JSON-RPC error code to its [`ErrorKind`], per the standard catalogue; any code
/// outside the catalogue (including the reserved server-error range) classifies as `System`.
pub fn kind_for_code(code: i32) -> ErrorKind {
    match code {
        -32700 | -32600 => ErrorKind::Protocol,
        -32601 | -32602 => ErrorKind::Business,
        -32000 | -32001 => ErrorKind::Network,
        _ => ErrorKind::System,
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "NETWORK",
            ErrorKind::Protocol => "PROTOCOL",
            ErrorKind::Business => "BUSINESS",
            ErrorKind::System => "SYSTEM",
        };
        f.write_str(s)
    }
}
