use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicI64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    application::JsonRpcApplication,
    error::EndpointError,
    protocol::{
        Inbound, JsonRpcError, JsonRpcId, JsonRpcMessage, JsonRpcRequest, JsonRpcResponse,
    },
    stream::{JsonRpcStream, StreamReader, StreamWriter},
    trace::{inject_carrier, TraceContextInjector},
};

/// Default window a caller waits for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Tuning for a [`JsonRpcEndpoint`].
#[derive(Clone)]
pub struct EndpointConfig {
    /// How long `send_request` waits for the peer; `None` waits forever.
    pub request_timeout: Option<Duration>,
    /// Supplies the trace carrier injected into outbound request params.
    pub trace_injector: Option<Arc<dyn TraceContextInjector>>,
}

impl Default for EndpointConfig {
    /// The stock configuration: 60 s request timeout, no trace injection.
    fn default() -> Self {
        Self {
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            trace_injector: None,
        }
    }
}

type PendingRequests = Mutex<HashMap<JsonRpcId, oneshot::Sender<JsonRpcResponse>>>;

/// A symmetric JSON-RPC 2.0 peer: dispatches inbound requests and
/// notifications to an application, and correlates outbound requests with
/// their replies across a shared duplex stream.
///
/// All sends funnel through a single writer task, so frames are never
/// interleaved no matter how many tasks call the send methods
/// concurrently. The reader task demuxes inbound traffic: responses wake
/// the matching blocked caller, requests run their handler inline on the
/// reader (a slow handler therefore delays further reception).
pub struct JsonRpcEndpoint {
    writer: mpsc::UnboundedSender<JsonRpcMessage>,
    app: Arc<JsonRpcApplication>,
    pending: PendingRequests,
    outstanding_inbound: Mutex<HashSet<JsonRpcId>>,
    next_id: AtomicI64,
    request_timeout: Option<Duration>,
    trace_injector: Option<Arc<dyn TraceContextInjector>>,
    shutdown: AtomicBool,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JsonRpcEndpoint {
    /// Binds an endpoint to a framed stream and starts its reader and
    /// writer tasks. Handlers registered on `app`, before or after this
    /// call, receive the inbound traffic.
    pub fn start<R, W>(
        stream: JsonRpcStream<R, W>,
        app: Arc<JsonRpcApplication>,
        config: EndpointConfig,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (stream_rx, stream_tx) = stream.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();

        let endpoint = Arc::new(Self {
            writer: writer_tx,
            app,
            pending: Mutex::new(HashMap::new()),
            outstanding_inbound: Mutex::new(HashSet::new()),
            next_id: AtomicI64::new(0),
            request_timeout: config.request_timeout,
            trace_injector: config.trace_injector,
            shutdown: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        });

        let writer_handle = tokio::spawn(write_loop(stream_tx, writer_rx, endpoint.clone()));
        let reader_handle = tokio::spawn(read_loop(stream_rx, endpoint.clone()));
        endpoint
            .tasks
            .lock()
            .expect("task list poisoned")
            .extend([reader_handle, writer_handle]);
        endpoint
    }

    /// Issues a correlated request and waits for the reply.
    ///
    /// The peer's response comes back as `Ok` whether it carries a result
    /// or an error payload. Local failures are `Err`:
    /// [`EndpointError::Timeout`] when the window elapses,
    /// [`EndpointError::Shutdown`] when the endpoint stops (or had already
    /// stopped) before a reply arrived.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, EndpointError> {
        let span = info_span!("send_request", %method);
        async {
            if self.is_shutdown() {
                return Err(EndpointError::Shutdown);
            }

            let mut params = params;
            if let Some(injector) = &self.trace_injector {
                if let Some(params) = params.as_mut() {
                    inject_carrier(params, injector.carrier());
                }
            }

            // Minting the id, parking the wait slot, and queueing the frame
            // happen under one lock: the slot exists before transmission,
            // and wire ids come out strictly increasing.
            let (id, rx) = {
                let mut pending = self.pending.lock().expect("pending table poisoned");
                let id = JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
                let (tx, rx) = oneshot::channel();
                pending.insert(id.clone(), tx);
                let request = JsonRpcRequest::call(method, params, id.clone());
                if self.writer.send(JsonRpcMessage::Request(request)).is_err() {
                    pending.remove(&id);
                    return Err(EndpointError::Shutdown);
                }
                (id, rx)
            };
            debug!(%id, "request transmitted");

            if self.is_shutdown() {
                self.remove_pending(&id);
                return Err(EndpointError::Shutdown);
            }

            let outcome = match self.request_timeout {
                Some(window) => time::timeout(window, rx).await,
                None => Ok(rx.await),
            };
            match outcome {
                Ok(Ok(response)) => {
                    debug!(%id, "response delivered");
                    Ok(response)
                }
                // Wait slot dropped without a delivery: the endpoint shut
                // down underneath us.
                Ok(Err(_)) => Err(EndpointError::Shutdown),
                Err(_) => {
                    self.remove_pending(&id);
                    warn!(%id, %method, "timed out waiting for response");
                    Err(EndpointError::Timeout)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Emits a notification (a request without an id): no correlation, no
    /// wait. Returns once the frame is queued for the writer. The trace
    /// carrier is not injected on this path.
    pub fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), EndpointError> {
        if self.is_shutdown() {
            return Err(EndpointError::Shutdown);
        }
        let request = JsonRpcRequest::notification(method, params);
        self.writer
            .send(JsonRpcMessage::Request(request))
            .map_err(|_| EndpointError::Shutdown)
    }

    /// Answers an inbound request. A response whose id is not outstanding
    /// is logged and dropped, which covers double replies and replies to
    /// unknown ids. An id-less response (framing-failure relay) bypasses
    /// the bookkeeping.
    pub fn send_response(&self, response: JsonRpcResponse) {
        if let Some(id) = &response.id {
            let mut outstanding = self
                .outstanding_inbound
                .lock()
                .expect("outstanding table poisoned");
            if !outstanding.remove(id) {
                warn!(%id, "dropping response for id that is not outstanding");
                return;
            }
        }
        if self.writer.send(JsonRpcMessage::Response(response)).is_err() {
            warn!("response dropped, writer is gone");
        }
    }

    /// Stops the endpoint: wakes every blocked caller, stops the reader,
    /// and closes the stream. Idempotent and callable from any task.
    pub fn stop(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("endpoint stopping");
        self.cancel.cancel();
        // Dropping a wait slot wakes its caller with `Shutdown`.
        self.pending.lock().expect("pending table poisoned").clear();
    }

    /// Waits for the reader and writer tasks to finish.
    pub async fn join(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .tasks
            .lock()
            .expect("task list poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn remove_pending(&self, id: &JsonRpcId) {
        self.pending
            .lock()
            .expect("pending table poisoned")
            .remove(id);
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending table poisoned").len()
    }
}

async fn read_loop<R>(mut stream: StreamReader<R>, endpoint: Arc<JsonRpcEndpoint>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    debug!("reader task started");
    loop {
        let inbound = tokio::select! {
            _ = endpoint.cancel.cancelled() => break,
            inbound = stream.recv() => match inbound {
                Some(inbound) => inbound,
                None => break,
            },
        };

        let span = info_span!("received_message");
        let terminal = handle_inbound(inbound, &endpoint).instrument(span).await;
        if terminal {
            break;
        }
    }
    debug!("reader task exiting");
    endpoint.stop();
}

/// Routes one frame. Returns true when the loop must terminate.
async fn handle_inbound(inbound: Inbound, endpoint: &Arc<JsonRpcEndpoint>) -> bool {
    match inbound {
        Inbound::Malformed(error) => {
            warn!(code = error.code, message = %error.message, "framing failure");
            endpoint.send_response(JsonRpcResponse::from_error(None, error));
            true
        }
        Inbound::Message(JsonRpcMessage::Request(request)) => {
            handle_request(request, endpoint).await;
            false
        }
        Inbound::Message(JsonRpcMessage::Response(response)) => {
            deliver_response(response, endpoint);
            false
        }
        Inbound::Unknown(value) => {
            warn!(payload = %value, "dropping frame of unknown shape");
            false
        }
    }
}

async fn handle_request(request: JsonRpcRequest, endpoint: &Arc<JsonRpcEndpoint>) {
    let id = request.id.clone();
    if let Some(id) = &id {
        endpoint
            .outstanding_inbound
            .lock()
            .expect("outstanding table poisoned")
            .insert(id.clone());
    }

    endpoint
        .app
        .clone()
        .dispatch(request, endpoint.clone())
        .await;

    // Every inbound request is answered exactly once; cover handlers that
    // returned without replying.
    if let Some(id) = id {
        let unanswered = endpoint
            .outstanding_inbound
            .lock()
            .expect("outstanding table poisoned")
            .contains(&id);
        if unanswered {
            endpoint.send_response(JsonRpcResponse::from_error(
                Some(id),
                JsonRpcError::internal("No response sent"),
            ));
        }
    }
}

fn deliver_response(response: JsonRpcResponse, endpoint: &Arc<JsonRpcEndpoint>) {
    let Some(id) = response.id.clone() else {
        warn!("dropping response without id");
        return;
    };
    let slot = endpoint
        .pending
        .lock()
        .expect("pending table poisoned")
        .remove(&id);
    match slot {
        Some(tx) => {
            let _ = tx.send(response);
        }
        None => warn!(%id, "dropping response for unknown or expired id"),
    }
}

async fn write_loop<W>(
    mut stream: StreamWriter<W>,
    mut rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
    endpoint: Arc<JsonRpcEndpoint>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let message = tokio::select! {
            _ = endpoint.cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        if let Err(err) = stream.send(&message).await {
            // A broken write half tears the endpoint down the same way a
            // broken read half does; blocked callers wake with `Shutdown`.
            warn!(%err, "stream write failed");
            endpoint.stop();
            break;
        }
    }

    // Flush frames queued before the stop landed; a final framing-error
    // relay takes this path.
    while let Ok(message) = rx.try_recv() {
        if stream.send(&message).await.is_err() {
            break;
        }
    }
    stream.close().await;
    debug!("writer task exiting");
}
