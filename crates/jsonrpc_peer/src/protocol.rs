use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision stamped on every frame.
pub const JSONRPC_VERSION: &str = "2.0";

fn protocol_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request identifier: integers are minted locally, strings are accepted
/// from peers and echoed back verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    Text(String),
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(value: i64) -> Self {
        JsonRpcId::Number(value)
    }
}

impl From<&str> for JsonRpcId {
    fn from(value: &str) -> Self {
        JsonRpcId::Text(value.to_string())
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
}

impl JsonRpcErrorCode {
    pub const fn code(self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => -32700,
            JsonRpcErrorCode::InvalidRequest => -32600,
            JsonRpcErrorCode::MethodNotFound => -32601,
            JsonRpcErrorCode::InvalidParams => -32602,
            JsonRpcErrorCode::InternalError => -32603,
        }
    }
}

/// Error payload carried inside a response, or produced by the framing
/// layer when a frame cannot be decoded at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message)
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, message)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// A request or notification frame. `id: None` marks a notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
}

impl JsonRpcRequest {
    pub fn call(method: impl Into<String>, params: Option<Value>, id: JsonRpcId) -> Self {
        Self {
            jsonrpc: protocol_version(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: protocol_version(),
            method: method.into(),
            params,
            id: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A response frame. Exactly one of `result`/`error` is meaningful.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default = "protocol_version")]
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn from_result(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: protocol_version(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn from_error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: protocol_version(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A decoded wire frame headed in either direction.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
}

/// One frame pulled off the wire by the framing layer.
#[derive(Debug)]
pub enum Inbound {
    Message(JsonRpcMessage),
    /// Valid JSON that is neither a request nor a response.
    Unknown(Value),
    /// The framing layer could not produce a message.
    Malformed(JsonRpcError),
}

/// Discriminates a decoded JSON value: a `method` member makes it a
/// request (or notification), otherwise an `id` member makes it a
/// response. Anything else is unknown.
pub(crate) fn decode_message(value: &Value) -> Option<JsonRpcMessage> {
    if value.get("method").is_some() {
        return serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Request);
    }
    if value.get("id").is_some() {
        return serde_json::from_value(value.clone())
            .ok()
            .map(JsonRpcMessage::Response);
    }
    None
}
