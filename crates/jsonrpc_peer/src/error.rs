use serde_json::Value;
use thiserror::Error;

use crate::protocol::{JsonRpcError, JsonRpcErrorCode};

/// Errors surfaced to callers of the endpoint's send paths.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// No reply arrived within the configured window. The display text is
    /// part of the wire contract; peers that asked for a relay see it
    /// verbatim via [`EndpointError::to_error`].
    #[error("Timeout waiting for response")]
    Timeout,
    /// The endpoint stopped, or the stream closed, before a reply arrived.
    #[error("endpoint is shut down")]
    Shutdown,
}

impl EndpointError {
    /// Renders the failure as a JSON-RPC error payload.
    pub fn to_error(&self) -> JsonRpcError {
        JsonRpcError::new(JsonRpcErrorCode::InternalError, self.to_string())
    }
}

/// Failure returned by a handler body. The callback wrapper converts it
/// into an `InternalError` reply for requests and a log entry for
/// notifications.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
    pub data: Option<Value>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(source: serde_json::Error) -> Self {
        Self::new(source.to_string())
    }
}

/// Misuse of the handler registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("handler method name must not be empty")]
    EmptyMethod,
}
