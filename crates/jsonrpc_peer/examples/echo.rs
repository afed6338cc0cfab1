//! Two endpoints talking over an in-memory pipe: one registers handlers,
//! the other calls them.

use std::sync::Arc;

use jsonrpc_peer::{EndpointConfig, JsonRpcApplication, JsonRpcEndpoint, JsonRpcResponse, JsonRpcStream};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    let (client_rx, client_tx) = tokio::io::split(client_io);
    let (server_rx, server_tx) = tokio::io::split(server_io);

    let server_app = Arc::new(JsonRpcApplication::new());
    server_app.add_request("echo", |request, endpoint, _app| {
        Box::pin(async move {
            let params = request.params.unwrap_or(Value::Null);
            endpoint.send_response(JsonRpcResponse::from_result(request.id, params));
            Ok(())
        })
    })?;
    server_app.add_notify("log", |request, _endpoint, _app| {
        Box::pin(async move {
            println!("peer says: {}", request.params.unwrap_or_default());
            Ok(())
        })
    })?;

    let server = JsonRpcEndpoint::start(
        JsonRpcStream::new(server_rx, server_tx),
        server_app,
        EndpointConfig::default(),
    );
    let client = JsonRpcEndpoint::start(
        JsonRpcStream::new(client_rx, client_tx),
        Arc::new(JsonRpcApplication::new()),
        EndpointConfig::default(),
    );

    client.send_notification("log", Some(json!("hello")))?;
    let response = client.send_request("echo", Some(json!({"n": 1}))).await?;
    println!("echoed: {:?}", response.result);

    client.stop();
    server.stop();
    client.join().await;
    server.join().await;
    Ok(())
}
