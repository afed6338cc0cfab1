use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::{Arc, RwLock},
};

use tracing::{debug, error};

use crate::{
    endpoint::JsonRpcEndpoint,
    error::{HandlerError, RegistrationError},
    protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
};

/// Future returned by a handler invocation.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

type HandlerFn = dyn Fn(JsonRpcRequest, Arc<JsonRpcEndpoint>, Arc<JsonRpcApplication>) -> HandlerFuture
    + Send
    + Sync;

/// Whether a callback answers requests or consumes notifications.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Request,
    Notify,
}

/// A registered handler bundled with its kind and method name.
///
/// Owns the error capture at the invocation boundary: a request handler
/// that fails produces an `InternalError` reply carrying its message, a
/// notification handler that fails is logged and dropped.
#[derive(Clone)]
pub struct JsonRpcCallback {
    method: String,
    kind: HandlerKind,
    func: Arc<HandlerFn>,
}

impl JsonRpcCallback {
    fn new<F>(method: String, kind: HandlerKind, func: F) -> Self
    where
        F: Fn(JsonRpcRequest, Arc<JsonRpcEndpoint>, Arc<JsonRpcApplication>) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        Self {
            method,
            kind,
            func: Arc::new(func),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    pub(crate) async fn invoke(
        &self,
        request: JsonRpcRequest,
        endpoint: Arc<JsonRpcEndpoint>,
        app: Arc<JsonRpcApplication>,
    ) {
        let id = request.id.clone();
        if let Err(err) = (self.func)(request, endpoint.clone(), app).await {
            match self.kind {
                HandlerKind::Request => {
                    let HandlerError { message, data } = err;
                    let mut error = JsonRpcError::internal(message);
                    error.data = data;
                    endpoint.send_response(JsonRpcResponse::from_error(id, error));
                }
                HandlerKind::Notify => {
                    error!(method = %self.method, %err, "notification handler failed");
                }
            }
        }
    }
}

/// Registry of named callbacks, dispatching decoded inbound traffic.
///
/// Request and notification namespaces are independent; registering a
/// method twice in one namespace replaces the earlier callback.
#[derive(Default)]
pub struct JsonRpcApplication {
    request_handlers: RwLock<HashMap<String, JsonRpcCallback>>,
    notify_handlers: RwLock<HashMap<String, JsonRpcCallback>>,
}

impl JsonRpcApplication {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associates `method` with a handler of the given kind. Last write
    /// wins. Registration is valid before or after the endpoint starts.
    pub fn register<F>(
        &self,
        method: &str,
        kind: HandlerKind,
        func: F,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(JsonRpcRequest, Arc<JsonRpcEndpoint>, Arc<JsonRpcApplication>) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        if method.is_empty() {
            return Err(RegistrationError::EmptyMethod);
        }
        let callback = JsonRpcCallback::new(method.to_string(), kind, func);
        self.handlers(kind)
            .write()
            .expect("handler registry poisoned")
            .insert(method.to_string(), callback);
        debug!(%method, ?kind, "registered callback");
        Ok(())
    }

    /// Convenience registrar for request handlers.
    pub fn add_request<F>(&self, method: &str, func: F) -> Result<(), RegistrationError>
    where
        F: Fn(JsonRpcRequest, Arc<JsonRpcEndpoint>, Arc<JsonRpcApplication>) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        self.register(method, HandlerKind::Request, func)
    }

    /// Convenience registrar for notification handlers.
    pub fn add_notify<F>(&self, method: &str, func: F) -> Result<(), RegistrationError>
    where
        F: Fn(JsonRpcRequest, Arc<JsonRpcEndpoint>, Arc<JsonRpcApplication>) -> HandlerFuture
            + Send
            + Sync
            + 'static,
    {
        self.register(method, HandlerKind::Notify, func)
    }

    /// Routes one decoded inbound frame: requests without a handler are
    /// answered with `MethodNotFound`, notifications without a handler are
    /// logged and dropped.
    pub async fn dispatch(
        self: Arc<Self>,
        request: JsonRpcRequest,
        endpoint: Arc<JsonRpcEndpoint>,
    ) {
        let kind = if request.id.is_some() {
            HandlerKind::Request
        } else {
            HandlerKind::Notify
        };
        match self.lookup(kind, &request.method) {
            Some(callback) => callback.invoke(request, endpoint, self).await,
            None if kind == HandlerKind::Request => {
                let error = JsonRpcError::method_not_found(&request.method);
                endpoint.send_response(JsonRpcResponse::from_error(request.id, error));
            }
            None => {
                let registered: Vec<String> = self
                    .handlers(HandlerKind::Notify)
                    .read()
                    .expect("handler registry poisoned")
                    .keys()
                    .cloned()
                    .collect();
                error!(method = %request.method, ?registered, "notify method not found");
            }
        }
    }

    fn handlers(&self, kind: HandlerKind) -> &RwLock<HashMap<String, JsonRpcCallback>> {
        match kind {
            HandlerKind::Request => &self.request_handlers,
            HandlerKind::Notify => &self.notify_handlers,
        }
    }

    fn lookup(&self, kind: HandlerKind, method: &str) -> Option<JsonRpcCallback> {
        self.handlers(kind)
            .read()
            .expect("handler registry poisoned")
            .get(method)
            .cloned()
    }
}
