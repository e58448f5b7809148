//! HTTP + Server-Sent Events (SSE) transport.
//!
//! The MCP SSE transport pairs a long-lived event stream with a plain POST
//! endpoint:
//!
//! | Method | Path                         | Description                                |
//! |--------|------------------------------|--------------------------------------------|
//! | GET    | `/sse`                       | Open a session; first event is `endpoint`  |
//! | POST   | `/message?sessionId=<id>`    | Submit one JSON-RPC message (202 Accepted) |
//! | GET    | `/health`                    | Liveness probe                             |
//!
//! Responses to POSTed messages are delivered as `message` events on the
//! session's stream, not in the POST response body. Each POST is handled in
//! its own request task, so many clients can have calls in flight at once.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::HubApi;
use crate::dispatch::Dispatcher;
use crate::mcp::{self, SERVER_VERSION};

/// Maximum concurrent SSE sessions before rejecting with 429.
const MAX_SSE_SESSIONS: usize = 64;

/// Per-session outbound queue depth.
const SESSION_QUEUE: usize = 32;

type SessionMap = Arc<Mutex<HashMap<String, mpsc::Sender<Value>>>>;

/// Shared state for the SSE router.
pub struct SseState<H> {
    dispatcher: Arc<Dispatcher<H>>,
    /// Open sessions, keyed by session id. Entries are removed when the
    /// session's event stream is dropped.
    sessions: SessionMap,
    start_time: Instant,
}

impl<H> Clone for SseState<H> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            sessions: Arc::clone(&self.sessions),
            start_time: self.start_time,
        }
    }
}

impl<H> SseState<H> {
    pub fn new(dispatcher: Arc<Dispatcher<H>>) -> Self {
        Self {
            dispatcher,
            sessions: SessionMap::default(),
            start_time: Instant::now(),
        }
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).len()
    }

    fn session(&self, id: &str) -> Option<mpsc::Sender<Value>> {
        lock(&self.sessions).get(id).cloned()
    }

    /// Drop every session sender so open streams end.
    fn close_all(&self) {
        lock(&self.sessions).clear();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build the SSE transport router.
pub fn router<H: HubApi + 'static>(state: SseState<H>) -> Router {
    Router::new()
        .route("/sse", get(event_stream::<H>))
        .route("/message", post(post_message::<H>))
        .route("/health", get(health::<H>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the SSE transport on `0.0.0.0:{port}` until SIGINT/SIGTERM.
pub async fn run_sse<H: HubApi + 'static>(
    dispatcher: Arc<Dispatcher<H>>,
    port: u16,
) -> std::io::Result<()> {
    let state = SseState::new(dispatcher);
    let app = router(state.clone());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("SSE transport listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Open event streams would otherwise hold the server open forever.
            state.close_all();
        })
        .await?;

    info!("Goodbye");
    Ok(())
}

/// `GET /sse` — open a session and stream its responses.
async fn event_stream<H: HubApi + 'static>(State(state): State<SseState<H>>) -> Response {
    if state.session_count() >= MAX_SSE_SESSIONS {
        return (StatusCode::TOO_MANY_REQUESTS, "Too many SSE connections").into_response();
    }

    let session_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel::<Value>(SESSION_QUEUE);
    lock(&state.sessions).insert(session_id.clone(), tx);
    debug!("SSE session {session_id} opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={session_id}"));

    let messages = stream::unfold(rx, |mut rx| async move {
        let response = rx.recv().await?;
        let data = serde_json::to_string(&response).unwrap_or_default();
        Some((Ok::<_, Infallible>(Event::default().event("message").data(data)), rx))
    });

    let stream = SessionStream {
        inner: Box::pin(stream::once(async move { Ok::<_, Infallible>(endpoint) }).chain(messages)),
        session_id,
        sessions: Arc::clone(&state.sessions),
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default().interval(Duration::from_secs(15)))
        .into_response()
}

#[derive(Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// `POST /message?sessionId=<id>` — handle one JSON-RPC message.
async fn post_message<H: HubApi + 'static>(
    State(state): State<SseState<H>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let Some(session_id) = query.session_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing sessionId" })),
        )
            .into_response();
    };
    let Some(tx) = state.session(&session_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Invalid session ID" })),
        )
            .into_response();
    };

    if let Some(response) = mcp::handle_line(&state.dispatcher, &body).await {
        if tx.send(response).await.is_err() {
            debug!("SSE session {session_id} closed before its response was sent");
        }
    }
    StatusCode::ACCEPTED.into_response()
}

/// `GET /health` — liveness probe.
async fn health<H: HubApi + 'static>(State(state): State<SseState<H>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": SERVER_VERSION,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "sessions": state.session_count(),
    }))
}

/// Event stream that unregisters its session when dropped.
struct SessionStream<S> {
    inner: Pin<Box<S>>,
    session_id: String,
    sessions: SessionMap,
}

impl<S: Stream<Item = Result<Event, Infallible>>> Stream for SessionStream<S> {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl<S> Drop for SessionStream<S> {
    fn drop(&mut self) {
        lock(&self.sessions).remove(&self.session_id);
        debug!("SSE session {} closed", self.session_id);
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use axum::body::{Body, Bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::client::ClientError;
    use crate::device::Device;

    struct EmptyHub;

    #[async_trait]
    impl HubApi for EmptyHub {
        async fn list_devices(&self) -> Result<Vec<Device>, ClientError> {
            Ok(Vec::new())
        }

        async fn send_command(&self, _: &str, _: &str) -> Result<(), ClientError> {
            Ok(())
        }

        async fn send_command_with_value(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<(), ClientError> {
            Ok(())
        }
    }

    fn state() -> SseState<EmptyHub> {
        SseState::new(Arc::new(Dispatcher::new(EmptyHub)))
    }

    fn data_line(chunk: &Bytes) -> String {
        let text = std::str::from_utf8(chunk).unwrap();
        text.lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .to_string()
    }

    fn post(uri: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let resp = router(state())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["sessions"], 0);
    }

    #[tokio::test]
    async fn message_without_session_id_is_bad_request() {
        let resp = router(state())
            .oneshot(post("/message", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn message_for_unknown_session_is_not_found() {
        let resp = router(state())
            .oneshot(post(
                "/message?sessionId=missing",
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn responses_arrive_on_the_session_stream() {
        let state = state();
        let app = router(state.clone());

        let resp = app
            .clone()
            .oneshot(Request::get("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.session_count(), 1);

        let mut body = resp.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&first).unwrap().starts_with("event: endpoint"));
        let endpoint = data_line(&first);
        assert!(endpoint.starts_with("/message?sessionId="));

        let resp = app
            .clone()
            .oneshot(post(
                &endpoint,
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"list_devices","arguments":{}}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let event = body.next().await.unwrap().unwrap();
        assert!(std::str::from_utf8(&event).unwrap().starts_with("event: message"));
        let response: Value = serde_json::from_str(&data_line(&event)).unwrap();
        assert_eq!(response["id"], 7);
        assert_eq!(response["result"]["content"][0]["text"], "");

        drop(body);
        assert_eq!(state.session_count(), 0);
    }
}
