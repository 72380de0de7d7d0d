//! Push channel client
//!
//! TigerStyle: One connection task, explicit backoff bounds, explicit stop.
//!
//! Reads the server's SSE hub and forwards the id of every changed entity.
//! A dropped connection is re-established with exponential backoff between
//! `EVENTS_RECONNECT_DELAY_MS_MIN` and `EVENTS_RECONNECT_DELAY_MS_MAX`; each
//! reconnect subscribes again from scratch, so events published while
//! disconnected are lost and the reconciler's liveness pass covers the gap.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use shoal_core::constants::{
    EVENTS_FRAME_BYTES_MAX, EVENTS_RECONNECT_DELAY_MS_MAX, EVENTS_RECONNECT_DELAY_MS_MIN,
};
use shoal_core::events::TOPIC_ENTITY_POSITION_CHANGED;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Where change notifications come from
///
/// `subscribe` only acts when disconnected and `disconnect` only when
/// connected; both report whether they did anything.
#[async_trait]
pub trait NotificationSource: Send + 'static {
    /// Start delivering changed entity ids to `tx`
    fn subscribe(&mut self, tx: mpsc::Sender<Uuid>) -> bool;

    /// Stop delivering and release the connection
    async fn disconnect(&mut self) -> bool;
}

/// SSE client for `GET /shapehub`
pub struct EventSource {
    client: reqwest::Client,
    url: String,
    connection: Option<Connection>,
}

struct Connection {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EventSource {
    /// Create an event source for `url`
    ///
    /// Only connecting is bounded by `connect_timeout`; the stream itself
    /// stays open indefinitely.
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .context("Failed to create event stream client")?;

        Ok(Self {
            client,
            url: url.into(),
            connection: None,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

#[async_trait]
impl NotificationSource for EventSource {
    fn subscribe(&mut self, tx: mpsc::Sender<Uuid>) -> bool {
        if self.connection.is_some() {
            debug!(url = %self.url, "Already subscribed");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_connection(
            self.client.clone(),
            self.url.clone(),
            tx,
            stop_rx,
        ));
        self.connection = Some(Connection { stop_tx, task });
        true
    }

    async fn disconnect(&mut self) -> bool {
        let Some(connection) = self.connection.take() else {
            debug!(url = %self.url, "Not subscribed");
            return false;
        };

        let _ = connection.stop_tx.send(true);
        if let Err(e) = connection.task.await {
            warn!(error = %e, "Event stream task failed");
        }
        info!(url = %self.url, "Event stream disconnected");
        true
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.task.abort();
        }
    }
}

/// Why one connection attempt ended
#[derive(Debug, PartialEq, Eq)]
enum StreamEnd {
    /// The server closed the stream
    Closed,
    /// Nobody is listening any more
    ReceiverGone,
}

/// Connect, stream, and reconnect until stopped
#[instrument(skip(client, tx, stop_rx), level = "info")]
async fn run_connection(
    client: reqwest::Client,
    url: String,
    tx: mpsc::Sender<Uuid>,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut delay = Duration::from_millis(EVENTS_RECONNECT_DELAY_MS_MIN);

    loop {
        let outcome = tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            outcome = stream_once(&client, &url, &tx, &mut delay) => outcome,
        };

        match outcome {
            Ok(StreamEnd::ReceiverGone) => {
                debug!("Notification receiver dropped; stopping event stream");
                return;
            }
            Ok(StreamEnd::Closed) => info!("Event stream closed by server"),
            Err(e) => warn!(error = %format!("{:#}", e), "Event stream failed"),
        }

        debug!(delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::select! {
            biased;
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
        delay = next_delay(delay);
    }
}

/// One connection: forward events until the stream ends
async fn stream_once(
    client: &reqwest::Client,
    url: &str,
    tx: &mpsc::Sender<Uuid>,
    delay: &mut Duration,
) -> Result<StreamEnd> {
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .send()
        .await
        .with_context(|| format!("GET {} failed", url))?;

    if !response.status().is_success() {
        return Err(anyhow!("Server returned error {}", response.status()));
    }

    // Connected: the next failure starts backing off from the minimum again
    *delay = Duration::from_millis(EVENTS_RECONNECT_DELAY_MS_MIN);
    info!(url, "Subscribed to push channel");

    let mut parser = SseParser::default();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Event stream read failed")?;
        for event in parser.push(&chunk)? {
            if event.name != TOPIC_ENTITY_POSITION_CHANGED {
                continue;
            }
            let Ok(entity_id) = event.data.trim().parse::<Uuid>() else {
                warn!(data = %event.data, "Malformed entity id in push event");
                continue;
            };
            if tx.send(entity_id).await.is_err() {
                return Ok(StreamEnd::ReceiverGone);
            }
        }
    }

    Ok(StreamEnd::Closed)
}

/// Exponential backoff, capped
fn next_delay(delay: Duration) -> Duration {
    (delay * 2).min(Duration::from_millis(EVENTS_RECONNECT_DELAY_MS_MAX))
}

// =============================================================================
// SSE framing
// =============================================================================

/// One dispatched SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental SSE parser
///
/// Events end at a blank line. Comment lines (keep-alives) and events without
/// data are dropped. An unterminated frame longer than
/// `EVENTS_FRAME_BYTES_MAX` is an error; the caller drops the connection.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already searched for a terminator
    scanned: usize,
}

impl SseParser {
    /// Feed a chunk; returns every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        let mut events = Vec::new();
        loop {
            // A terminator may straddle the previous end
            let from = self.scanned.saturating_sub(1);
            let Some(offset) = self.buffer[from..]
                .windows(2)
                .position(|pair| pair == b"\n\n")
            else {
                self.scanned = self.buffer.len();
                break;
            };
            let block: Vec<u8> = self.buffer.drain(..from + offset + 2).collect();
            self.scanned = 0;
            if let Some(event) = parse_block(&String::from_utf8_lossy(&block)) {
                events.push(event);
            }
        }

        if self.buffer.len() > EVENTS_FRAME_BYTES_MAX {
            let pending = self.buffer.len();
            self.buffer.clear();
            self.scanned = 0;
            return Err(anyhow!(
                "Unterminated event frame of {} bytes exceeds limit {}",
                pending,
                EVENTS_FRAME_BYTES_MAX
            ));
        }
        Ok(events)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut name = None;
    let mut data: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => name = Some(value),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseEvent {
        name: name.unwrap_or("message").to_string(),
        data: data.join("\n"),
    })
}
