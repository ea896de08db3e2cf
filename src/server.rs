//! HTTP surface of the capture server.
//!
//! - `POST|PUT|PATCH|DELETE /api/webhook/{channel_id}` captures the request,
//!   with no body size limit
//! - `GET /api/webhook/{channel_id}` lists everything captured for the channel
//! - `GET /health` reports liveness and the number of stored events

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::capture::{capture_event, RawRequest};
use crate::store::EventStore;
use crate::types::{ChannelId, Event, IngestAck};

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    events: usize,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router(store: EventStore) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/webhook/{channel_id}",
            get(list_events)
                .post(ingest_event)
                .put(ingest_event)
                .patch(ingest_event)
                .delete(ingest_event)
                // Payloads of any size are captured.
                .layer(DefaultBodyLimit::disable()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(listener: TcpListener, store: EventStore, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr().context("reading listener address")?;
    info!("capture server listening on http://{addr}");
    axum::serve(listener, router(store))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("serving http")
}

async fn health(State(store): State<EventStore>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        events: store.len().await,
    })
}

async fn ingest_event(
    State(store): State<EventStore>,
    Path(channel_id): Path<String>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let channel = match ChannelId::new(&channel_id) {
        Ok(c) => c,
        Err(err) => return bad_request(err),
    };
    let event = capture_event(
        channel,
        RawRequest {
            method: &method,
            headers: &headers,
            query: query.as_deref(),
            body: &body,
        },
    );
    let stored = store.append(event).await;
    debug!(
        "captured {} {} for channel {}",
        stored.method, stored.id, stored.channel_id
    );
    Json(IngestAck::for_event(&stored)).into_response()
}

async fn list_events(
    State(store): State<EventStore>,
    Path(channel_id): Path<String>,
) -> Response {
    let channel = match ChannelId::new(&channel_id) {
        Ok(c) => c,
        Err(err) => return bad_request(err),
    };
    let events: Vec<Arc<Event>> = store.filter(&channel).await;
    Json(events).into_response()
}

fn bad_request(err: anyhow::Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
