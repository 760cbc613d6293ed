//! In-process stub of the stack service for integration tests.
//!
//! REST and WebSocket endpoints answer with deterministic `{result}` bodies
//! derived from the request, and record what they saw.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use stack_client::ClientConfig;

pub const TOKEN: &str = "tok-1";

/// One request as the stub saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: String,
    pub authorization: Option<String>,
    pub tenant: Option<String>,
    pub body: Value,
}

#[derive(Clone, Default)]
pub struct StubState {
    upgrades: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl StubState {
    /// Accepted WebSocket upgrade requests.
    pub fn upgrades(&self) -> usize {
        self.upgrades.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().expect("stub mutex").clone()
    }

    pub fn last(&self, path: &str) -> Recorded {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.path == path)
            .unwrap_or_else(|| panic!("no request recorded for {path}"))
    }

    fn record(&self, path: &str, headers: &HeaderMap, body: Value) {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
        self.requests.lock().expect("stub mutex").push(Recorded {
            path: path.to_string(),
            authorization: header("authorization"),
            tenant: header("x-tenant"),
            body,
        });
    }
}

pub struct Stub {
    pub addr: SocketAddr,
    pub state: StubState,
}

impl Stub {
    pub async fn start() -> Self {
        let state = StubState::default();
        let app = Router::new()
            .route("/auth", post(auth))
            .route("/sessions", post(sessions))
            .route("/queries", post(queries))
            .route("/documents", post(documents))
            .route("/ok", get(|| async { Json(json!({ "result": "ok" })) }))
            .route("/boom", post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "kaboom") }))
            .route("/slow", get(slow))
            .route("/ws", get(upgrade))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("stub server") });
        Self { addr, state }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.addr.to_string()).with_secure(false)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

// =============================================================================
// REST HANDLERS
// =============================================================================

async fn auth(State(state): State<StubState>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    state.record("/auth", &headers, body.clone());
    match body["client_id"].as_str() {
        Some("nobody") => Json(json!({ "client_id": "nobody" })),
        Some("blank") => Json(json!({ "access_token": "" })),
        Some("crooked") => Json(json!({ "access_token": "tok\n1" })),
        _ => Json(json!({
            "access_token": TOKEN,
            "client_id": body["client_id"],
            "scope": body["scope"],
        })),
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {TOKEN}");
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(expected.as_str())
}

/// A JSON string as plain text, anything else in its JSON form.
fn text(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_string)
}

async fn sessions(
    State(state): State<StubState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.record("/sessions", &headers, body.clone());
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let action = params.get("action").cloned().unwrap_or_default();
    if action == "close" && body["query"] == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "kaboom").into_response();
    }
    Json(json!({ "result": format!("session {action}: {}", text(&body["query"])) })).into_response()
}

async fn queries(State(state): State<StubState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.record("/queries", &headers, body.clone());
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if body["query"] == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "kaboom").into_response();
    }
    Json(json!({ "result": format!("answer: {}", text(&body["query"])) })).into_response()
}

async fn documents(State(state): State<StubState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    state.record("/documents", &headers, body.clone());
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "result": stored(&body) })).into_response()
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({ "result": "late" }))
}

fn stored(body: &Value) -> String {
    let count = body["files"].as_array().map_or(0, Vec::len);
    format!("stored {count} files")
}

// =============================================================================
// WEBSOCKET
// =============================================================================

async fn upgrade(State(state): State<StubState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if !authorized(&headers) || headers.contains_key("x-reject") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    state.upgrades.fetch_add(1, Ordering::SeqCst);
    ws.on_upgrade(move |socket| run_ws(socket, state, headers))
}

async fn run_ws(mut socket: WebSocket, state: StubState, headers: HeaderMap) {
    while let Some(Ok(message)) = socket.recv().await {
        let raw = match message {
            Message::Text(raw) => raw.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let envelope: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        state.record("ws", &headers, envelope.clone());

        let data = &envelope["data"];
        let reply = match (envelope["event"].as_str(), data["query"].as_str()) {
            (Some("QUERY"), Some("silent")) => "null".to_string(),
            (Some("QUERY"), Some("misshapen")) => json!({ "answer": 1 }).to_string(),
            (_, Some("hangup")) => {
                if socket.send(Message::Close(None)).await.is_err() {
                    break;
                }
                continue;
            }
            (Some("QUERY"), Some("hang")) => continue,
            (Some("QUERY"), _) => json!({ "result": format!("answer: {}", text(&data["query"])) }).to_string(),
            (Some("INIT"), _) => json!({ "result": format!("session init: {}", text(&data["query"])) }).to_string(),
            (Some("CLOSE"), _) => json!({ "result": format!("session close: {}", text(&data["query"])) }).to_string(),
            (Some("STORE"), _) => json!({ "result": stored(data) }).to_string(),
            _ => json!({ "error": "unknown event" }).to_string(),
        };
        if socket.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }
}
