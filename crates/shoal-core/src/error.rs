//! Error types for Shoal
//!
//! One enum for the whole server side; the HTTP layer maps variants to
//! status codes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Activation and invocation
    // =========================================================================
    #[error("No saved state for {id}")]
    StateNotFound { id: String },

    #[error("Failed to activate {id}: {reason}")]
    ActorActivationFailed { id: String, reason: String },

    #[error("Activation of {id} stopped before the request ran")]
    ActorDeactivated { id: String },

    #[error("{operation} on {id} did not finish within {timeout_ms}ms")]
    ActorInvocationTimeout {
        id: String,
        operation: String,
        timeout_ms: u64,
    },

    #[error("Mailbox of {id} is full ({depth}/{max})")]
    ActorMailboxFull {
        id: String,
        depth: usize,
        max: usize,
    },

    #[error("Too many active actors: {count} active, max {max}")]
    ActorLimitReached { count: usize, max: usize },

    #[error("Unknown operation: {operation}")]
    InvalidOperation { operation: String },

    // =========================================================================
    // Validation
    // =========================================================================
    #[error("Invalid actor id {id}: {reason}")]
    InvalidActorId { id: String, reason: String },

    #[error("Actor id is {length} bytes, limit is {limit}")]
    ActorIdTooLong { length: usize, limit: usize },

    #[error("Actor state is {size} bytes, limit is {limit}")]
    ActorStateTooLarge { size: usize, limit: usize },

    #[error("Invalid reminder {name}: {reason}")]
    InvalidReminder { name: String, reason: String },

    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Storage
    // =========================================================================
    #[error("Read of {key} failed: {reason}")]
    StorageReadFailed { key: String, reason: String },

    #[error("Write of {key} failed: {reason}")]
    StorageWriteFailed { key: String, reason: String },

    #[error("{operation} gave up after {attempts} attempts: {reason}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        reason: String,
    },

    // =========================================================================
    // Events
    // =========================================================================
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    // =========================================================================
    // Internal
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },
}

impl Error {
    pub fn storage_read_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageReadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn storage_write_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageWriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn publish_failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PublishFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Transient storage failures and turn timeouts
    ///
    /// Callers retry these with a bounded backoff; everything else is
    /// surfaced immediately.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StorageReadFailed { .. }
                | Self::StorageWriteFailed { .. }
                | Self::ActorInvocationTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::DeserializationFailed {
                reason: err.to_string(),
            }
        } else {
            Self::SerializationFailed {
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::StateNotFound {
            id: "shape:abc".into(),
        };
        assert!(err.to_string().contains("shape:abc"));

        let err = Error::RetriesExhausted {
            operation: "index.add".into(),
            attempts: 3,
            reason: "conflict".into(),
        };
        assert_eq!(
            err.to_string(),
            "index.add gave up after 3 attempts: conflict"
        );
    }

    #[test]
    fn test_error_is_retriable() {
        assert!(Error::storage_write_failed("k", "io").is_retriable());
        assert!(Error::storage_read_failed("k", "io").is_retriable());
        assert!(!Error::StateNotFound { id: "test".into() }.is_retriable());
        assert!(!Error::RetriesExhausted {
            operation: "index.add".into(),
            attempts: 3,
            reason: "version moved".into(),
        }
        .is_retriable());
        assert!(!Error::InvalidOperation {
            operation: "nope".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_json_error_maps_to_deserialization() {
        let err: Error = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, Error::DeserializationFailed { .. }));
    }
}
