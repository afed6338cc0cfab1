use super::*;

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncWrite, DuplexStream, Lines, ReadHalf, WriteHalf};

/// The raw side of an in-memory wire with an endpoint on the other end.
/// Frames are read and written as plain JSON lines, so tests observe
/// exactly what goes over the stream.
pub(super) struct Peer {
    reader: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl Peer {
    /// Next frame the endpoint put on the wire.
    pub(super) async fn recv(&mut self) -> Value {
        let line = time::timeout(Duration::from_secs(2), self.reader.next_line())
            .await
            .expect("peer recv timed out")
            .expect("peer read failed")
            .expect("peer stream closed");
        serde_json::from_str(&line).expect("endpoint emitted invalid JSON")
    }

    /// True when nothing shows up on the wire within `window`.
    pub(super) async fn silent_for(&mut self, window: Duration) -> bool {
        time::timeout(window, self.reader.next_line()).await.is_err()
    }

    pub(super) async fn send(&mut self, frame: Value) {
        self.send_raw(&frame.to_string()).await;
    }

    pub(super) async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(line.as_bytes())
            .await
            .expect("peer write failed");
        self.writer.write_all(b"\n").await.expect("peer write failed");
        self.writer.flush().await.expect("peer flush failed");
    }

    /// Closes the peer's write half, which the endpoint observes as EOF.
    pub(super) async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Endpoint on one side of a duplex pipe, raw [`Peer`] on the other.
pub(super) fn start_endpoint(
    app: Arc<JsonRpcApplication>,
    config: EndpointConfig,
) -> (Arc<JsonRpcEndpoint>, Peer) {
    let (endpoint_io, peer_io) = tokio::io::duplex(64 * 1024);
    let (endpoint_rx, endpoint_tx) = tokio::io::split(endpoint_io);
    let (peer_rx, peer_tx) = tokio::io::split(peer_io);
    let endpoint = JsonRpcEndpoint::start(
        JsonRpcStream::new(endpoint_rx, endpoint_tx),
        app,
        config,
    );
    let peer = Peer {
        reader: BufReader::new(peer_rx).lines(),
        writer: peer_tx,
    };
    (endpoint, peer)
}

/// Two live endpoints wired back-to-back.
pub(super) fn linked_endpoints(
    client_app: Arc<JsonRpcApplication>,
    server_app: Arc<JsonRpcApplication>,
) -> (Arc<JsonRpcEndpoint>, Arc<JsonRpcEndpoint>) {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_rx, client_tx) = tokio::io::split(client_io);
    let (server_rx, server_tx) = tokio::io::split(server_io);
    let client = JsonRpcEndpoint::start(
        JsonRpcStream::new(client_rx, client_tx),
        client_app,
        EndpointConfig::default(),
    );
    let server = JsonRpcEndpoint::start(
        JsonRpcStream::new(server_rx, server_tx),
        server_app,
        EndpointConfig::default(),
    );
    (client, server)
}

pub(super) fn empty_app() -> Arc<JsonRpcApplication> {
    Arc::new(JsonRpcApplication::new())
}

/// Application answering `echo` requests with their own params.
pub(super) fn echo_app() -> Arc<JsonRpcApplication> {
    let app = Arc::new(JsonRpcApplication::new());
    app.add_request("echo", |request, endpoint, _app| {
        Box::pin(async move {
            let params = request.params.unwrap_or(Value::Null);
            endpoint.send_response(JsonRpcResponse::from_result(request.id, params));
            Ok(())
        })
    })
    .expect("register echo");
    app
}

/// Write half that fails immediately, like a pipe whose reader went away.
pub(super) struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Injector handing out one fixed carrier entry.
pub(super) struct FixedInjector;

impl TraceContextInjector for FixedInjector {
    fn carrier(&self) -> HashMap<String, String> {
        HashMap::from([(
            "traceparent".to_string(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_string(),
        )])
    }
}

pub(super) fn traced_config() -> EndpointConfig {
    EndpointConfig {
        request_timeout: Some(Duration::from_secs(2)),
        trace_injector: Some(Arc::new(FixedInjector)),
    }
}

pub(super) fn fixed_carrier() -> Value {
    json!({"traceparent": "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"})
}
