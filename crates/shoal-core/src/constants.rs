//! TigerStyle constants for Shoal
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Actor Limits
// =============================================================================

/// Maximum length of an actor ID in bytes
pub const ACTOR_ID_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of an actor namespace in bytes
pub const ACTOR_NAMESPACE_LENGTH_BYTES_MAX: usize = 128;

/// Maximum size of serialized actor state in bytes (1 MB)
pub const ACTOR_STATE_SIZE_BYTES_MAX: usize = 1024 * 1024;

/// Maximum duration for an actor invocation in milliseconds (30 sec)
pub const ACTOR_INVOCATION_TIMEOUT_MS_MAX: u64 = 30 * 1000;

/// Default idle timeout before actor deactivation in milliseconds (5 min)
pub const ACTOR_IDLE_TIMEOUT_MS_DEFAULT: u64 = 5 * 60 * 1000;

/// Maximum idle timeout in milliseconds (1 hour)
pub const ACTOR_IDLE_TIMEOUT_MS_MAX: u64 = 60 * 60 * 1000;

/// Maximum number of concurrent actors per node
pub const ACTOR_CONCURRENT_COUNT_MAX: usize = 1_000_000;

/// Maximum depth of an actor mailbox
pub const MAILBOX_DEPTH_MAX: usize = 10_000;

/// Default depth of an actor mailbox
pub const MAILBOX_DEPTH_DEFAULT: usize = 256;

/// Dispatcher command channel capacity
pub const DISPATCHER_COMMAND_BUFFER_COUNT: usize = 1024;

// =============================================================================
// Reminder Limits
// =============================================================================

/// Maximum length of a reminder name in bytes
pub const REMINDER_NAME_LENGTH_BYTES_MAX: usize = 128;

/// Minimum reminder period in milliseconds
pub const REMINDER_PERIOD_MS_MIN: u64 = 10;

/// Maximum reminder due time or period in milliseconds (24 hours)
pub const REMINDER_INTERVAL_MS_MAX: u64 = 24 * 60 * 60 * 1000;

/// Maximum time a single reminder delivery may take in milliseconds
pub const REMINDER_DELIVERY_TIMEOUT_MS_MAX: u64 = ACTOR_INVOCATION_TIMEOUT_MS_MAX;

// =============================================================================
// Shape Motion
// =============================================================================

/// Lower bound of the x axis
pub const SHAPE_X_MIN: f64 = 10.0;

/// Upper bound of the x axis
pub const SHAPE_X_MAX: f64 = 900.0;

/// Lower bound of the y axis
pub const SHAPE_Y_MIN: f64 = 10.0;

/// Upper bound of the y axis
pub const SHAPE_Y_MAX: f64 = 600.0;

/// Name of the periodic reminder that advances a shape
pub const SHAPE_ADVANCE_REMINDER_NAME: &str = "advance";

/// Delay before the first advance in milliseconds
pub const SHAPE_ADVANCE_DUE_MS_DEFAULT: u64 = 100;

/// Period of the advance reminder in milliseconds
pub const SHAPE_ADVANCE_PERIOD_MS_DEFAULT: u64 = 100;

/// Actor namespace for shape actors
pub const SHAPE_ACTOR_NAMESPACE: &str = "shape";

// =============================================================================
// Entity Index
// =============================================================================

/// Default number of attempts for an index read-modify-write
pub const INDEX_WRITE_ATTEMPTS_COUNT_DEFAULT: u32 = 3;

/// Maximum number of attempts for an index read-modify-write
pub const INDEX_WRITE_ATTEMPTS_COUNT_MAX: u32 = 32;

/// Default initial backoff between index write attempts in milliseconds
pub const INDEX_RETRY_INTERVAL_MS_DEFAULT: u64 = 100;

/// Maximum initial backoff between index write attempts in milliseconds
pub const INDEX_RETRY_INTERVAL_MS_MAX: u64 = 10 * 1000;

/// Maximum number of entities tracked per owner
pub const INDEX_ENTITIES_PER_OWNER_COUNT_MAX: usize = 10_000;

// =============================================================================
// Pub/Sub and Relay
// =============================================================================

/// Default per-topic buffer of the in-process bus
pub const BUS_TOPIC_CAPACITY_DEFAULT: usize = 1024;

/// Default buffer of the push relay
pub const RELAY_CHANNEL_CAPACITY_DEFAULT: usize = 1024;

/// Default SSE keep-alive interval in milliseconds
pub const RELAY_KEEP_ALIVE_INTERVAL_MS_DEFAULT: u64 = 15 * 1000;

// =============================================================================
// Client Reconciler
// =============================================================================

/// Default liveness check interval in milliseconds
pub const RECONCILER_LIVENESS_INTERVAL_MS_DEFAULT: u64 = 1000;

/// Reconciler command channel capacity
pub const RECONCILER_COMMAND_BUFFER_COUNT: usize = 256;

/// Initial reconnect delay for the push channel in milliseconds
pub const EVENTS_RECONNECT_DELAY_MS_MIN: u64 = 500;

/// Maximum reconnect delay for the push channel in milliseconds
pub const EVENTS_RECONNECT_DELAY_MS_MAX: u64 = 30 * 1000;

/// Maximum size of one unterminated push channel frame in bytes (64 KB)
pub const EVENTS_FRAME_BYTES_MAX: usize = 64 * 1024;

/// Default server URL for clients
pub const CLIENT_SERVER_URL_DEFAULT: &str = "http://localhost:5000";

/// Default per-request timeout for client calls in milliseconds
pub const CLIENT_REQUEST_TIMEOUT_MS_DEFAULT: u64 = 10 * 1000;

// =============================================================================
// Observability - Metric Names (TigerStyle: explicit, with units)
// =============================================================================

/// Metric: Current number of active actors (gauge)
pub const METRIC_NAME_ACTORS_ACTIVE_COUNT: &str = "shoal_actors_active_count";

/// Metric: Current number of scheduled reminders (gauge)
pub const METRIC_NAME_REMINDERS_SCHEDULED_COUNT: &str = "shoal_reminders_scheduled_count";

/// Metric: Server uptime in seconds (gauge)
pub const METRIC_NAME_SERVER_UPTIME_SECONDS: &str = "shoal_server_uptime_seconds";

// Compile-time assertions for constant validity
const _: () = {
    assert!(ACTOR_ID_LENGTH_BYTES_MAX >= 64);
    assert!(MAILBOX_DEPTH_DEFAULT <= MAILBOX_DEPTH_MAX);
    assert!(ACTOR_IDLE_TIMEOUT_MS_DEFAULT <= ACTOR_IDLE_TIMEOUT_MS_MAX);
    assert!(SHAPE_ADVANCE_PERIOD_MS_DEFAULT >= REMINDER_PERIOD_MS_MIN);
    assert!(INDEX_WRITE_ATTEMPTS_COUNT_DEFAULT <= INDEX_WRITE_ATTEMPTS_COUNT_MAX);
    assert!(EVENTS_RECONNECT_DELAY_MS_MIN < EVENTS_RECONNECT_DELAY_MS_MAX);
    assert!(EVENTS_FRAME_BYTES_MAX >= 1024);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_bounds_are_ordered() {
        assert!(SHAPE_X_MIN < SHAPE_X_MAX);
        assert!(SHAPE_Y_MIN < SHAPE_Y_MAX);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // Byte limits end in _BYTES_, time limits in _MS_, counts in _COUNT_
        let _: usize = ACTOR_ID_LENGTH_BYTES_MAX;
        let _: u64 = ACTOR_INVOCATION_TIMEOUT_MS_MAX;
        let _: u32 = INDEX_WRITE_ATTEMPTS_COUNT_DEFAULT;
    }
}
