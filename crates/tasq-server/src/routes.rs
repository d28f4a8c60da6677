//! HTTP route handlers.
//!
//! The wire contract: queue names and payloads travel as JSON strings,
//! lease overrides as an optional JSON integer body, receipts as a query
//! parameter. Claim is a POST — it mutates lease state and must never be
//! modeled as a safe-to-retry GET.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;
use tasq_core::QueueEngine;

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueueEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/queues", post(create_queue))
        .route("/queues/{queue}", delete(delete_queue))
        .route("/queues/{queue}/stat", get(queue_stat))
        .route("/queues/{queue}/in", post(put_message))
        .route("/queues/{queue}/out", post(get_message))
        .route("/queues/{queue}/messages/{id}", delete(delete_message))
        .route("/queues/{queue}/messages/{id}/return", post(return_message))
        .route("/queues/{queue}/messages/{id}/lease", post(extend_lease))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ReceiptQuery {
    receipt: String,
}

async fn create_queue(
    State(state): State<AppState>,
    Json(queue): Json<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.create_queue(&queue).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_queue(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete_queue(&queue).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn queue_stat(
    State(state): State<AppState>,
    Path(queue): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let stat = state.engine.stat(&queue).await?;
    Ok(Json(stat))
}

async fn put_message(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    Json(content): Json<String>,
) -> Result<StatusCode, ApiError> {
    state.engine.enqueue(&queue, content).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Claim the oldest available message. 200 with the message when one was
/// leased, 204 when the queue had nothing available.
async fn get_message(
    State(state): State<AppState>,
    Path(queue): Path<String>,
    lease: Option<Json<i64>>,
) -> Result<impl IntoResponse, ApiError> {
    match state.engine.claim(&queue, lease.map(|Json(l)| l)).await? {
        Some(message) => Ok(Json(message).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn delete_message(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    Query(query): Query<ReceiptQuery>,
) -> Result<StatusCode, ApiError> {
    state.engine.delete(&queue, id, &query.receipt).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn return_message(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    Query(query): Query<ReceiptQuery>,
) -> Result<StatusCode, ApiError> {
    state.engine.return_message(&queue, id, &query.receipt).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn extend_lease(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, u64)>,
    Query(query): Query<ReceiptQuery>,
    lease: Option<Json<i64>>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .extend_lease(&queue, id, &query.receipt, lease.map(|Json(l)| l))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
