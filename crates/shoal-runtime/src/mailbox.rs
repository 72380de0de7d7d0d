//! Actor mailbox implementation
//!
//! TigerStyle: Bounded queues with explicit limits, no silent drops.

use bytes::Bytes;
use shoal_core::constants::MAILBOX_DEPTH_MAX;
use shoal_core::error::{Error, Result};
use shoal_core::io::TimeProvider;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Error when mailbox is full
#[derive(Debug)]
pub struct MailboxFullError {
    pub mailbox_depth: usize,
    pub limit: usize,
    /// The rejected message, handed back to the caller
    pub envelope: Envelope,
}

impl std::fmt::Display for MailboxFullError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mailbox full: {} messages (limit: {})",
            self.mailbox_depth, self.limit
        )
    }
}

impl std::error::Error for MailboxFullError {}

/// What an envelope asks the actor to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// Call an operation
    Invoke { operation: String, payload: Bytes },
    /// Deliver a reminder firing
    Reminder { name: String },
}

impl MessageKind {
    /// Operation or reminder name, for logs and errors
    pub fn label(&self) -> &str {
        match self {
            MessageKind::Invoke { operation, .. } => operation,
            MessageKind::Reminder { name } => name,
        }
    }
}

/// A message in the mailbox
#[derive(Debug)]
pub struct Envelope {
    /// The request
    pub kind: MessageKind,
    /// Channel to send the response
    pub reply_tx: oneshot::Sender<Result<Bytes>>,
    /// When the message was enqueued (monotonic timestamp in ms)
    pub enqueued_at_ms: u64,
}

impl Envelope {
    /// Create a new envelope stamped by `time`
    pub fn new(
        kind: MessageKind,
        reply_tx: oneshot::Sender<Result<Bytes>>,
        time: &dyn TimeProvider,
    ) -> Self {
        debug_assert!(!kind.label().is_empty(), "operation must not be empty");

        Self {
            kind,
            reply_tx,
            enqueued_at_ms: time.monotonic_ms(),
        }
    }

    /// Get the time this message has been waiting in milliseconds
    pub fn wait_time_ms(&self, time: &dyn TimeProvider) -> u64 {
        time.monotonic_ms().saturating_sub(self.enqueued_at_ms)
    }

    /// Send the response; a caller that stopped waiting is ignored
    pub fn reply(self, result: Result<Bytes>) {
        let _ = self.reply_tx.send(result);
    }
}

/// Bounded FIFO of envelopes
///
/// Holds messages for an actor that is between activations.
///
/// # TigerStyle
/// - Explicit capacity limit
/// - FIFO ordering
/// - No silent drops (returns error when full)
#[derive(Debug)]
pub struct Mailbox {
    /// Pending messages
    queue: VecDeque<Envelope>,
    /// Maximum number of messages
    capacity: usize,
    /// Total messages enqueued (for metrics)
    enqueued_count: u64,
}

impl Mailbox {
    /// Create a new mailbox with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "capacity must be positive");
        debug_assert!(
            capacity <= MAILBOX_DEPTH_MAX,
            "capacity exceeds MAILBOX_DEPTH_MAX"
        );

        Self {
            queue: VecDeque::new(),
            capacity,
            enqueued_count: 0,
        }
    }

    /// Push a message
    ///
    /// # Errors
    /// Returns the envelope inside `MailboxFullError` at capacity.
    pub fn push(&mut self, envelope: Envelope) -> std::result::Result<(), MailboxFullError> {
        if self.queue.len() >= self.capacity {
            return Err(MailboxFullError {
                mailbox_depth: self.queue.len(),
                limit: self.capacity,
                envelope,
            });
        }

        self.queue.push_back(envelope);
        self.enqueued_count = self.enqueued_count.wrapping_add(1);

        debug_assert!(self.queue.len() <= self.capacity);
        Ok(())
    }

    /// Pop the oldest message
    pub fn pop(&mut self) -> Option<Envelope> {
        self.queue.pop_front()
    }

    /// Remove and return all messages in FIFO order
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.queue.drain(..).collect()
    }

    /// Reject every pending message with the error built by `error`
    pub fn reject_all(&mut self, error: impl Fn() -> Error) {
        for envelope in self.drain() {
            envelope.reply(Err(error()));
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total messages ever enqueued
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued_count
    }
}
