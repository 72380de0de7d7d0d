//! Notification relay
//!
//! TigerStyle: Bounded fan-out, no per-owner filtering.
//!
//! Every live push connection holds one receiver. Each position change is
//! broadcast to all of them; clients ignore ids they do not own.

use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Fan-out of position-changed entity ids to push connections
#[derive(Clone)]
pub struct Relay {
    tx: broadcast::Sender<Uuid>,
}

impl Relay {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "relay capacity must be positive");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Forward one change; returns how many connections received it
    pub fn publish(&self, entity_id: Uuid) -> usize {
        let receivers = self.tx.send(entity_id).unwrap_or(0);
        trace!(entity_id = %entity_id, receivers, "Relayed position change");
        receivers
    }

    /// Register a new push connection
    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.tx.subscribe()
    }

    /// Number of live push connections
    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_relay_reaches_every_connection() {
        let relay = Relay::new(8);
        let mut first = relay.subscribe();
        let mut second = relay.subscribe();
        assert_eq!(relay.connection_count(), 2);

        let id = Uuid::new_v4();
        assert_eq!(relay.publish(id), 2);
        assert_eq!(first.recv().await.unwrap(), id);
        assert_eq!(second.recv().await.unwrap(), id);
    }

    #[test]
    fn test_relay_without_connections_drops() {
        let relay = Relay::new(8);
        assert_eq!(relay.publish(Uuid::new_v4()), 0);
    }

    #[tokio::test]
    async fn test_slow_connection_lags() {
        let relay = Relay::new(2);
        let mut rx = relay.subscribe();
        for _ in 0..4 {
            relay.publish(Uuid::new_v4());
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(2))
        ));
    }
}
