//! Configuration for Shoal
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a Shoal server node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShoalConfig {
    /// Node configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Actor runtime configuration
    #[serde(default)]
    pub actor: ActorConfig,

    /// Shape actor cadence
    #[serde(default)]
    pub shape: ShapeConfig,

    /// Entity index write policy
    #[serde(default)]
    pub index: IndexConfig,

    /// Push relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// In-process pub/sub configuration
    #[serde(default)]
    pub bus: BusConfig,
}

impl ShoalConfig {
    /// Load from a JSON file; missing sections take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::InvalidConfiguration {
            field: "config".into(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_json(&raw)
    }

    /// Parse from a JSON document
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidConfiguration {
            field: "config".into(),
            reason: e.to_string(),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.actor.validate()?;
        self.shape.validate()?;
        self.index.validate()?;
        self.relay.validate()?;
        self.bus.validate()?;
        Ok(())
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address to bind the HTTP surface (default: 0.0.0.0:5000)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl NodeConfig {
    fn validate(&self) -> Result<()> {
        if !self.bind_address.contains(':') {
            return Err(Error::InvalidConfiguration {
                field: "node.bind_address".into(),
                reason: "must be in host:port format".into(),
            });
        }
        Ok(())
    }
}

/// Actor runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Maximum concurrent actors on this node
    #[serde(default = "default_max_actors")]
    pub max_actors_count: usize,

    /// Actor idle timeout before deactivation (milliseconds)
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Maximum invocation timeout (milliseconds)
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,

    /// Maximum mailbox depth per actor
    #[serde(default = "default_mailbox_depth")]
    pub mailbox_depth_max: usize,
}

fn default_max_actors() -> usize {
    100_000
}

fn default_idle_timeout_ms() -> u64 {
    ACTOR_IDLE_TIMEOUT_MS_DEFAULT
}

fn default_invocation_timeout_ms() -> u64 {
    ACTOR_INVOCATION_TIMEOUT_MS_MAX
}

fn default_mailbox_depth() -> usize {
    MAILBOX_DEPTH_DEFAULT
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            max_actors_count: default_max_actors(),
            idle_timeout_ms: default_idle_timeout_ms(),
            invocation_timeout_ms: default_invocation_timeout_ms(),
            mailbox_depth_max: default_mailbox_depth(),
        }
    }
}

impl ActorConfig {
    fn validate(&self) -> Result<()> {
        if self.max_actors_count == 0 || self.max_actors_count > ACTOR_CONCURRENT_COUNT_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.max_actors_count".into(),
                reason: format!("must be in 1..={}", ACTOR_CONCURRENT_COUNT_MAX),
            });
        }

        if self.idle_timeout_ms == 0 || self.idle_timeout_ms > ACTOR_IDLE_TIMEOUT_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.idle_timeout_ms".into(),
                reason: format!("must be in 1..={}", ACTOR_IDLE_TIMEOUT_MS_MAX),
            });
        }

        if self.invocation_timeout_ms == 0
            || self.invocation_timeout_ms > ACTOR_INVOCATION_TIMEOUT_MS_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "actor.invocation_timeout_ms".into(),
                reason: format!("must be in 1..={}", ACTOR_INVOCATION_TIMEOUT_MS_MAX),
            });
        }

        if self.mailbox_depth_max == 0 || self.mailbox_depth_max > MAILBOX_DEPTH_MAX {
            return Err(Error::InvalidConfiguration {
                field: "actor.mailbox_depth_max".into(),
                reason: format!("must be in 1..={}", MAILBOX_DEPTH_MAX),
            });
        }

        Ok(())
    }
}

/// Shape actor cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeConfig {
    /// Delay before the first advance (milliseconds)
    #[serde(default = "default_advance_due_ms")]
    pub advance_due_ms: u64,

    /// Interval between advances (milliseconds)
    #[serde(default = "default_advance_period_ms")]
    pub advance_period_ms: u64,
}

fn default_advance_due_ms() -> u64 {
    SHAPE_ADVANCE_DUE_MS_DEFAULT
}

fn default_advance_period_ms() -> u64 {
    SHAPE_ADVANCE_PERIOD_MS_DEFAULT
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            advance_due_ms: default_advance_due_ms(),
            advance_period_ms: default_advance_period_ms(),
        }
    }
}

impl ShapeConfig {
    fn validate(&self) -> Result<()> {
        if self.advance_period_ms < REMINDER_PERIOD_MS_MIN {
            return Err(Error::InvalidConfiguration {
                field: "shape.advance_period_ms".into(),
                reason: format!("must be at least {}", REMINDER_PERIOD_MS_MIN),
            });
        }
        if self.advance_due_ms > REMINDER_INTERVAL_MS_MAX
            || self.advance_period_ms > REMINDER_INTERVAL_MS_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "shape".into(),
                reason: format!("schedule exceeds limit {}", REMINDER_INTERVAL_MS_MAX),
            });
        }
        Ok(())
    }
}

/// Entity index write policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Attempts per read-modify-write before the failure is surfaced
    #[serde(default = "default_write_attempts")]
    pub write_attempts_max: u32,

    /// Backoff before the second attempt; doubles per attempt (milliseconds)
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_write_attempts() -> u32 {
    INDEX_WRITE_ATTEMPTS_COUNT_DEFAULT
}

fn default_retry_interval_ms() -> u64 {
    INDEX_RETRY_INTERVAL_MS_DEFAULT
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            write_attempts_max: default_write_attempts(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl IndexConfig {
    fn validate(&self) -> Result<()> {
        if self.write_attempts_max == 0 || self.write_attempts_max > INDEX_WRITE_ATTEMPTS_COUNT_MAX
        {
            return Err(Error::InvalidConfiguration {
                field: "index.write_attempts_max".into(),
                reason: format!("must be in 1..={}", INDEX_WRITE_ATTEMPTS_COUNT_MAX),
            });
        }
        if self.retry_interval_ms > INDEX_RETRY_INTERVAL_MS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "index.retry_interval_ms".into(),
                reason: format!("exceeds limit {}", INDEX_RETRY_INTERVAL_MS_MAX),
            });
        }
        Ok(())
    }
}

/// Push relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Buffered notifications per subscriber before it starts lagging
    #[serde(default = "default_relay_capacity")]
    pub channel_capacity: usize,

    /// Interval between SSE keep-alive comments (milliseconds)
    #[serde(default = "default_keep_alive_interval_ms")]
    pub keep_alive_interval_ms: u64,
}

fn default_relay_capacity() -> usize {
    RELAY_CHANNEL_CAPACITY_DEFAULT
}

fn default_keep_alive_interval_ms() -> u64 {
    RELAY_KEEP_ALIVE_INTERVAL_MS_DEFAULT
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_relay_capacity(),
            keep_alive_interval_ms: default_keep_alive_interval_ms(),
        }
    }
}

impl RelayConfig {
    fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(Error::InvalidConfiguration {
                field: "relay.channel_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.keep_alive_interval_ms == 0 {
            return Err(Error::InvalidConfiguration {
                field: "relay.keep_alive_interval_ms".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

/// In-process pub/sub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Buffered messages per topic before slow subscribers lag
    #[serde(default = "default_topic_capacity")]
    pub topic_capacity: usize,
}

fn default_topic_capacity() -> usize {
    BUS_TOPIC_CAPACITY_DEFAULT
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            topic_capacity: default_topic_capacity(),
        }
    }
}

impl BusConfig {
    fn validate(&self) -> Result<()> {
        if self.topic_capacity == 0 {
            return Err(Error::InvalidConfiguration {
                field: "bus.topic_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}
