use nexus_webhook_dispatcher::{tools, DispatcherConfig, WebhookDispatcher};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

// ─── JSON-RPC wire types ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Value,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn raw_response(id: Value, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: Some(result),
        error: None,
        id,
    }
}

fn ok_response(id: Value, data: Value) -> JsonRpcResponse {
    raw_response(
        id,
        serde_json::json!({
            "success": true,
            "data": data,
            "message": null
        }),
    )
}

fn err_response(id: Value, code: i64, message: String) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0",
        result: None,
        error: Some(JsonRpcError { code, message }),
        id,
    }
}

// ─── Shared app state ────────────────────────────────────────────────────────

#[derive(Default)]
struct AppState {
    /// Set by `initialize`; replaced if the host initializes again.
    dispatcher: Option<Arc<WebhookDispatcher>>,
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let state: Arc<RwLock<AppState>> = Arc::new(RwLock::new(AppState::default()));
    let handle = tokio::runtime::Handle::current();

    // One writer owns stdout so concurrent replies never interleave.
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer = tokio::task::spawn_blocking(move || {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        while let Some(resp) = rx.blocking_recv() {
            emit_line(&mut out, &resp);
        }
    });

    // Stdin loop on a blocking thread to avoid blocking the async runtime.
    let stdin_loop = tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            line.clear();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                _ => {}
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    let resp =
                        err_response(Value::Number(0.into()), -32700, format!("Parse error: {e}"));
                    let _ = tx.send(resp);
                    continue;
                }
            };

            // `execute` may wait on a remote webhook; run it off the read loop.
            if request.method == "execute" {
                let state = state.clone();
                let tx = tx.clone();
                handle.spawn(async move {
                    let response = handle_execute(&request, &state).await;
                    let _ = tx.send(response);
                });
                continue;
            }

            let is_shutdown = request.method == "shutdown";
            let response = handle.block_on(handle_request(&request, &state));
            let _ = tx.send(response);

            if is_shutdown {
                break;
            }
        }
    });

    if let Err(e) = stdin_loop.await {
        error!("stdin loop ended abnormally: {e}");
    }
    // Drains once every in-flight `execute` has replied.
    if let Err(e) = writer.await {
        error!("stdout writer ended abnormally: {e}");
    }
}

fn emit_line(out: &mut impl Write, resp: &JsonRpcResponse) {
    match serde_json::to_string(resp) {
        Ok(line) => {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
        Err(e) => error!("failed to serialize response: {e}"),
    }
}

// ─── Request dispatch ─────────────────────────────────────────────────────────

async fn handle_request(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    match req.method.as_str() {
        "initialize" => handle_initialize(req, state).await,
        "shutdown" => handle_shutdown(req, state).await,
        _ => err_response(req.id.clone(), -32601, format!("Unknown method: {}", req.method)),
    }
}

async fn handle_initialize(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let config = match DispatcherConfig::from_env().with_params(&req.params) {
        Ok(c) => c,
        Err(e) => return err_response(req.id.clone(), -32602, e.to_string()),
    };

    let dispatcher = match WebhookDispatcher::new(config) {
        Ok(d) => d,
        Err(e) => {
            return err_response(req.id.clone(), -32000, format!("Initialize failed: {e}"));
        }
    };
    let endpoint_count = dispatcher.list_endpoints().await.len();
    info!(
        base_url = %dispatcher.config().base_url(),
        endpoints = endpoint_count,
        "initialized"
    );

    let mut st = state.write().await;
    if st.dispatcher.is_some() {
        warn!("re-initialized; previous activity log discarded");
    }
    st.dispatcher = Some(Arc::new(dispatcher));

    raw_response(
        req.id.clone(),
        serde_json::json!({ "ready": true, "endpoints": endpoint_count }),
    )
}

async fn handle_shutdown(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let st = state.read().await;
    if let Some(dispatcher) = &st.dispatcher {
        info!(logged = dispatcher.log_len().await, "shutting down");
    }
    raw_response(req.id.clone(), serde_json::json!({}))
}

// ─── Execute handler ──────────────────────────────────────────────────────────

async fn handle_execute(req: &JsonRpcRequest, state: &Arc<RwLock<AppState>>) -> JsonRpcResponse {
    let dispatcher = match state.read().await.dispatcher.clone() {
        Some(d) => d,
        None => {
            return err_response(
                req.id.clone(),
                -32000,
                "Extension not initialized. Send 'initialize' first.".into(),
            )
        }
    };

    let operation = req
        .params
        .get("operation")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let input = req
        .params
        .get("input")
        .cloned()
        .unwrap_or(Value::Object(Default::default()));

    match tools::execute(operation, &input, &dispatcher).await {
        Ok(data) => ok_response(req.id.clone(), data),
        Err(msg) => err_response(req.id.clone(), -32000, msg),
    }
}
