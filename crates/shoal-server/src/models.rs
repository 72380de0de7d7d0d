//! API request and response models
//!
//! Index routes take the bus payload (`ShapeEvent`) directly and actor routes
//! return `Shape`; both live in shoal-core.

use serde::{Deserialize, Serialize};

/// Body of every non-2xx response
///
/// `code` is a stable machine-readable tag; `message` is the rendered error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// One bus topic and the route its events are delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRoute {
    pub topic: String,
    pub route: String,
}

impl SubscriptionRoute {
    pub fn new(topic: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            route: route.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_wire_format() {
        let health = HealthResponse {
            status: "ok".into(),
            version: "0.1.0".into(),
            uptime_seconds: 12,
        };
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["uptimeSeconds"], 12);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ErrorResponse::not_found("x").code, "not_found");
        assert_eq!(ErrorResponse::bad_request("x").code, "bad_request");
        assert_eq!(ErrorResponse::internal("x").code, "internal_error");
    }
}
