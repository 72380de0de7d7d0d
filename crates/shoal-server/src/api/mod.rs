//! REST API module
//!
//! TigerStyle: Thin handlers over the index service and actor handles.

pub mod actors;
pub mod entities;
pub mod hub;

use crate::models::{ErrorResponse, HealthResponse, SubscriptionRoute};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use shoal_core::constants::{
    METRIC_NAME_ACTORS_ACTIVE_COUNT, METRIC_NAME_REMINDERS_SCHEDULED_COUNT,
    METRIC_NAME_SERVER_UPTIME_SECONDS,
};
use shoal_core::events::{TOPIC_ENTITY_CREATED, TOPIC_ENTITY_DELETED, TOPIC_ENTITY_POSITION_CHANGED};
use shoal_core::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Create the API router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        // Metrics endpoint (Prometheus)
        .route("/metrics", get(metrics))
        .route("/subscriptions", get(subscriptions))
        // Index routes
        .merge(entities::router())
        // Actor call surface
        .nest("/actors/shape", actors::router())
        // Push channel
        .route("/shapehub", get(hub::shape_hub))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<AppState>) -> Response {
    let metrics_text = format!(
        "# HELP {active} Current number of active shape actors\n\
         # TYPE {active} gauge\n\
         {active} {}\n\
         \n\
         # HELP {reminders} Reminder timers armed in this process\n\
         # TYPE {reminders} gauge\n\
         {reminders} {}\n\
         \n\
         # HELP {uptime} Server uptime in seconds\n\
         # TYPE {uptime} gauge\n\
         {uptime} {}\n",
        state.active_actor_count(),
        state.reminder_count(),
        state.uptime_seconds(),
        active = METRIC_NAME_ACTORS_ACTIVE_COUNT,
        reminders = METRIC_NAME_REMINDERS_SCHEDULED_COUNT,
        uptime = METRIC_NAME_SERVER_UPTIME_SECONDS,
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics_text,
    )
        .into_response()
}

/// Bus topics and the routes that consume them
async fn subscriptions() -> Json<Vec<SubscriptionRoute>> {
    Json(vec![
        SubscriptionRoute::new(TOPIC_ENTITY_CREATED, "/entities"),
        SubscriptionRoute::new(TOPIC_ENTITY_DELETED, "/entities"),
        SubscriptionRoute::new(TOPIC_ENTITY_POSITION_CHANGED, "/notify"),
    ])
}

/// API error type that converts to HTTP responses
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse::not_found(message),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse::bad_request(message),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse::internal(message),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            body: ErrorResponse::new("conflict", message),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse::new("unavailable", message),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::StateNotFound { .. } => ApiError::not_found(message),
            Error::InvalidActorId { .. }
            | Error::ActorIdTooLong { .. }
            | Error::InvalidOperation { .. }
            | Error::InvalidReminder { .. }
            | Error::SerializationFailed { .. }
            | Error::DeserializationFailed { .. } => ApiError::bad_request(message),
            Error::RetriesExhausted { .. } => ApiError::conflict(message),
            Error::ActorActivationFailed { .. }
            | Error::ActorDeactivated { .. }
            | Error::ActorInvocationTimeout { .. }
            | Error::ActorMailboxFull { .. }
            | Error::ActorLimitReached { .. }
            | Error::StorageReadFailed { .. }
            | Error::StorageWriteFailed { .. }
            | Error::PublishFailed { .. } => ApiError::unavailable(message),
            _ => {
                warn!(error = %message, "Unhandled error in API");
                ApiError::internal(message)
            }
        }
    }
}
