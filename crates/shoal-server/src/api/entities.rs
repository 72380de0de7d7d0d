//! Entity index routes
//!
//! TigerStyle: Index membership over HTTP, same payload as the bus.
//!
//! `POST /entities` and `DELETE /entities` are the HTTP deliveries of the
//! `entity-created` and `entity-deleted` topics; `POST /notify` delivers
//! `entity-position-changed`. All three are idempotent.

use super::ApiError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shoal_core::events::ShapeEvent;
use tracing::instrument;
use uuid::Uuid;

/// Create entity index routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/entities/:owner_id", get(list_entities))
        .route("/entities", post(add_entity).delete(remove_entity))
        .route("/notify", post(notify))
}

/// List the owner's entities, deduplicated
///
/// GET /entities/{owner_id}
#[instrument(skip(state), level = "info")]
async fn list_entities(
    State(state): State<AppState>,
    Path(owner_id): Path<Uuid>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    let ids = state.index().list_entities(owner_id).await?;
    Ok(Json(ids))
}

/// Add an entity to its owner's index
///
/// POST /entities
#[instrument(skip(state), level = "info")]
async fn add_entity(
    State(state): State<AppState>,
    Json(event): Json<ShapeEvent>,
) -> Result<StatusCode, ApiError> {
    state
        .index()
        .add_entity(event.client_id, event.shape_id)
        .await?;
    Ok(StatusCode::OK)
}

/// Remove an entity from its owner's index; stored state is kept
///
/// DELETE /entities
#[instrument(skip(state), level = "info")]
async fn remove_entity(
    State(state): State<AppState>,
    Json(event): Json<ShapeEvent>,
) -> Result<StatusCode, ApiError> {
    state
        .index()
        .remove_entity(event.client_id, event.shape_id)
        .await?;
    Ok(StatusCode::OK)
}

/// Forward a position change to every push connection
///
/// POST /notify
async fn notify(State(state): State<AppState>, Json(event): Json<ShapeEvent>) -> StatusCode {
    state
        .index()
        .relay_position_changed(event.client_id, event.shape_id);
    StatusCode::OK
}
