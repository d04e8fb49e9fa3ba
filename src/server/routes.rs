//! HTTP route handlers

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use dashmap::DashMap;
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::mcp::session::{is_valid_session_id, new_session_id};
use crate::mcp::{handle_text, Dispatcher, SESSION_HEADER};

/// Interval between SSE keep-alive comments
pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Open SSE streams by session id; each carries serialized JSON-RPC replies
pub type SseStreams = DashMap<String, mpsc::UnboundedSender<String>>;

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub streams: Arc<SseStreams>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            streams: Arc::new(DashMap::new()),
        }
    }

    /// Queue a reply on the session's SSE stream; false if no live stream
    fn push(&self, session_id: &str, payload: String) -> bool {
        let Some(tx) = self.streams.get(session_id).map(|entry| entry.clone()) else {
            return false;
        };
        if tx.send(payload).is_ok() {
            return true;
        }
        self.streams.remove(session_id);
        false
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

fn header_session(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| is_valid_session_id(id))
        .map(String::from)
}

fn query_session(query: &SessionQuery) -> Option<String> {
    query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| is_valid_session_id(id))
        .map(String::from)
}

/// Session id from the header, then the query; `None` if neither is usable
fn requested_session(headers: &HeaderMap, query: &SessionQuery) -> Option<String> {
    header_session(headers).or_else(|| query_session(query))
}

fn with_session_header(mut response: Response, session_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;
    let upstream = dispatcher.upstream();
    Json(json!({
        "status": "ok",
        "service": "fmp-mcp",
        "version": crate::VERSION,
        "tools": dispatcher.catalog().snapshot().len(),
        "sessions": dispatcher.sessions().len(),
        "upstream": {
            "base_url": upstream.urls().base().as_str(),
            "api_key_configured": upstream.urls().has_api_key(),
        },
        "cache": upstream.cache_stats(),
    }))
}

/// JSON-RPC over POST; a body of only notifications gets 202 with no content
///
/// Replies go inline, except for a session addressed by `?session_id=` with
/// no header while its SSE stream is open: those are delivered as `message`
/// events and the POST gets 202.
pub async fn post_mcp(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let from_header = header_session(&headers);
    let sse_bound = from_header.is_none();
    let session_id = from_header
        .or_else(|| query_session(&query))
        .unwrap_or_else(new_session_id);

    let response = match handle_text(state.dispatcher.as_ref(), &session_id, &body).await {
        None => StatusCode::ACCEPTED.into_response(),
        Some(reply) if sse_bound && state.streams.contains_key(&session_id) => {
            let pushed = serde_json::to_string(&reply)
                .map(|payload| state.push(&session_id, payload))
                .unwrap_or(false);
            if pushed {
                StatusCode::ACCEPTED.into_response()
            } else {
                Json(reply).into_response()
            }
        }
        Some(reply) => Json(reply).into_response(),
    };
    with_session_header(response, &session_id)
}

/// Server-sent event stream: an `endpoint` event naming the POST URL, then
/// one `message` event per reply routed to this session
pub async fn sse_mcp(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Response {
    let session_id = requested_session(&headers, &query).unwrap_or_else(new_session_id);
    state.dispatcher.sessions().touch(&session_id);
    tracing::debug!(session = %session_id, "sse stream opened");

    let (tx, rx) = mpsc::unbounded_channel();
    state.streams.insert(session_id.clone(), tx);
    let stream = event_stream(&session_id, rx);
    let response = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(SSE_KEEP_ALIVE).text("keep-alive"))
        .into_response();
    with_session_header(response, &session_id)
}

fn event_stream(
    session_id: &str,
    rx: mpsc::UnboundedReceiver<String>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let endpoint = format!("/mcp?session_id={}", session_id);
    let messages = stream::unfold(rx, |mut rx| async move {
        let payload = rx.recv().await?;
        Some((Ok::<_, Infallible>(Event::default().event("message").data(payload)), rx))
    });
    stream::once(async move { Ok(Event::default().event("endpoint").data(endpoint)) })
        .chain(messages)
}

/// End a session
pub async fn delete_mcp(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = requested_session(&headers, &query) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "missing session id" })),
        )
            .into_response();
    };

    // Dropping the sender ends the session's SSE stream
    state.streams.remove(&session_id);
    let status = if state.dispatcher.sessions().evict(&session_id) {
        tracing::debug!(session = %session_id, "session closed");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    };
    with_session_header(status.into_response(), &session_id)
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
