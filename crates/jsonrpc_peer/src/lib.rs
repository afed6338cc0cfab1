#![forbid(unsafe_code)]
//! Symmetric JSON-RPC 2.0 endpoint over a framed byte stream.
//!
//! A [`JsonRpcEndpoint`] is a server and a client at the same time: it
//! dispatches inbound requests and notifications to the handlers registered
//! on a [`JsonRpcApplication`], and it issues outbound requests whose
//! replies are correlated by id and handed back to the blocked caller.
//! Framing is newline-delimited JSON over any `AsyncRead`/`AsyncWrite`
//! pair ([`JsonRpcStream`]), which covers stdio, child-process pipes,
//! sockets, and in-memory duplex streams alike.
//!
//! ## Lifecycle
//! - [`JsonRpcEndpoint::start`] splits the stream into a reader task and a
//!   writer task. All sends funnel through the writer, so frames are never
//!   interleaved. Handlers run inline on the reader task.
//! - [`JsonRpcEndpoint::stop`] wakes every caller blocked in
//!   [`send_request`](JsonRpcEndpoint::send_request) (they see
//!   [`EndpointError::Shutdown`]), stops the reader, and closes the stream
//!   exactly once. Stream EOF tears the endpoint down the same way.
//! - Outbound requests time out after 60 s by default
//!   ([`EndpointConfig::request_timeout`]); a late reply for a timed-out id
//!   is logged and dropped.
//!
//! ## Handlers
//! Request handlers answer via
//! [`send_response`](JsonRpcEndpoint::send_response); a handler that
//! returns without answering draws a synthesized `InternalError("No
//! response sent")`, so every inbound request gets exactly one reply. A
//! handler that returns `Err` has its message relayed as an
//! `InternalError` response. Notification handlers have no reply channel;
//! their failures are logged.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use jsonrpc_peer::{
//!     EndpointConfig, JsonRpcApplication, JsonRpcEndpoint, JsonRpcResponse, JsonRpcStream,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let app = Arc::new(JsonRpcApplication::new());
//! app.add_request("ping", |request, endpoint, _app| {
//!     Box::pin(async move {
//!         endpoint.send_response(JsonRpcResponse::from_result(request.id, json!("pong")));
//!         Ok(())
//!     })
//! })?;
//!
//! let endpoint = JsonRpcEndpoint::start(JsonRpcStream::stdio(), app, EndpointConfig::default());
//! let reply = endpoint.send_request("status", Some(json!({"verbose": true}))).await?;
//! println!("{:?}", reply.result);
//! endpoint.stop();
//! # Ok(())
//! # }
//! ```
//!
//! Outbound request params can carry a serialized trace context for peers
//! that read it out of band: supply a [`TraceContextInjector`] through
//! [`EndpointConfig`] and the endpoint places the carrier map inside
//! `params` (notifications are never instrumented).

mod application;
mod endpoint;
mod error;
mod protocol;
mod stream;
mod trace;

pub use application::{HandlerFuture, HandlerKind, JsonRpcApplication, JsonRpcCallback};
pub use endpoint::{EndpointConfig, JsonRpcEndpoint, DEFAULT_REQUEST_TIMEOUT};
pub use error::{EndpointError, HandlerError, RegistrationError};
pub use protocol::{
    Inbound, JsonRpcError, JsonRpcErrorCode, JsonRpcId, JsonRpcMessage, JsonRpcRequest,
    JsonRpcResponse, JSONRPC_VERSION,
};
pub use stream::JsonRpcStream;
pub use trace::{TraceContextInjector, CARRIER_KEY};

#[cfg(test)]
mod tests;
