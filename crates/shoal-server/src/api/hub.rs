//! Push hub for connected clients
//!
//! TigerStyle: One relay subscription per connection, lag skips events.
//!
//! Each SSE event is named `entity-position-changed` and carries only the
//! entity id. Every client receives every change and drops ids it does not
//! own; a client that falls behind loses the oldest events and recovers on
//! the next change or its own liveness pass.

use crate::state::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream};
use shoal_core::events::TOPIC_ENTITY_POSITION_CHANGED;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// GET /shapehub
pub async fn shape_hub(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.relay().subscribe();
    info!(
        connections = state.relay().connection_count(),
        "Push connection opened"
    );

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(entity_id) => {
                    let event = Event::default()
                        .event(TOPIC_ENTITY_POSITION_CHANGED)
                        .data(entity_id.to_string());
                    return Some((Ok(event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push connection lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Relay closed; ending push connection");
                    return None;
                }
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive())
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_support::test_app;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use futures::StreamExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_hub_streams_named_events() {
        let mut test = test_app().await;
        let app = router(test.state.clone());

        let response = app
            .oneshot(Request::builder().uri("/shapehub").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );
        assert_eq!(test.state.relay().connection_count(), 1);

        let entity_id = Uuid::new_v4();
        test.state.relay().publish(entity_id);

        let mut body = response.into_body().into_data_stream();
        let chunk = body.next().await.unwrap().unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.contains("event: entity-position-changed"));
        assert!(text.contains(&format!("data: {}", entity_id)));

        drop(body);
        test.runtime.stop().await.unwrap();
    }
}
