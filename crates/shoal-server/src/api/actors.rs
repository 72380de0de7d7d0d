//! Shape actor call surface
//!
//! TigerStyle: Every call goes through the dispatcher; the first call
//! activates the actor.

use super::ApiError;
use crate::actor::{OP_GET_CURRENT_POSITION, OP_UNREGISTER_REMINDER};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use shoal_core::shape::{Shape, ShapeKey};
use tracing::instrument;
use uuid::Uuid;

/// Create shape actor routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:owner_id/:shape_id/position", get(get_position))
        .route(
            "/:owner_id/:shape_id/unregister-reminder",
            post(unregister_reminder),
        )
}

/// Current stored shape
///
/// GET /actors/shape/{owner_id}/{shape_id}/position
#[instrument(skip(state), level = "debug")]
async fn get_position(
    State(state): State<AppState>,
    Path((owner_id, shape_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Shape>, ApiError> {
    let shape = state
        .shape(ShapeKey::new(owner_id, shape_id))?
        .request(OP_GET_CURRENT_POSITION, &())
        .await?;
    Ok(Json(shape))
}

/// Stop the shape's advance reminder
///
/// POST /actors/shape/{owner_id}/{shape_id}/unregister-reminder
#[instrument(skip(state), level = "info")]
async fn unregister_reminder(
    State(state): State<AppState>,
    Path((owner_id, shape_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    state
        .shape(ShapeKey::new(owner_id, shape_id))?
        .invoke(OP_UNREGISTER_REMINDER, Bytes::new())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
