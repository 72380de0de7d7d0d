//! DST tests for single activation
//!
//! - At most one activation of an actor is live at any instant, across
//!   explicit deactivations, idle timeouts and reminder deliveries
//! - Turns are serialized: concurrent increments lose no update, even when
//!   the actor is deactivated and reactivated between them
//!
//! TigerStyle: Deterministic testing with explicit fault injection.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use shoal_core::{ActorContext, ActorId, Error, Result};
use shoal_dst::{DeterministicRng, FaultConfig, FaultType, SimConfig, SimEnvironment, Simulation};
use shoal_runtime::{DispatcherConfig, Runtime, RuntimeBuilder, RuntimeConfig};
use shoal_storage::ActorKV;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const OP_INCREMENT: &str = "increment";
const OP_GET: &str = "get";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct TrackedState {
    count: u64,
}

/// Counts live activations across every task the dispatcher spawns
#[derive(Clone, Default)]
struct TrackedActor {
    live: Arc<AtomicUsize>,
    live_max: Arc<AtomicUsize>,
    activations: Arc<AtomicUsize>,
}

#[async_trait]
impl shoal_core::Actor for TrackedActor {
    type State = TrackedState;

    async fn invoke(
        &self,
        ctx: &mut ActorContext<Self::State>,
        operation: &str,
        _payload: Bytes,
    ) -> Result<Bytes> {
        match operation {
            OP_INCREMENT => {
                let before = ctx.state.count;
                // Yield mid-turn so a second activation would interleave here
                tokio::time::sleep(Duration::from_millis(1)).await;
                ctx.state.count = before + 1;
                Ok(Bytes::from(ctx.state.count.to_string()))
            }
            OP_GET => Ok(Bytes::from(ctx.state.count.to_string())),
            _ => Err(Error::InvalidOperation {
                operation: operation.to_string(),
            }),
        }
    }

    async fn receive_reminder(&self, ctx: &mut ActorContext<Self::State>, _name: &str) -> Result<()> {
        ctx.state.count += 1;
        Ok(())
    }

    async fn on_activate(&self, _ctx: &mut ActorContext<Self::State>) -> Result<()> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_max.fetch_max(live, Ordering::SeqCst);
        self.activations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok(())
    }

    async fn on_deactivate(&self, _ctx: &mut ActorContext<Self::State>) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.live.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

fn tracked_runtime(
    env: &SimEnvironment,
    tracked: TrackedActor,
    idle_timeout: Duration,
) -> Result<Runtime<TrackedActor>> {
    let config = RuntimeConfig {
        dispatcher: DispatcherConfig {
            idle_timeout,
            ..DispatcherConfig::default()
        },
    };
    RuntimeBuilder::new()
        .with_actor(tracked)
        .with_kv(env.storage.clone() as Arc<dyn ActorKV>)
        .with_config(config)
        .with_time(env.time())
        .build()
}

fn parse_count(bytes: Bytes) -> Result<u64> {
    std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::internal("malformed count"))
}

/// One client: a random mix of increments, deactivations and reminder
/// deliveries. Returns the number of acknowledged state changes.
async fn churn(
    dispatcher: shoal_runtime::DispatcherHandle,
    id: ActorId,
    rng: Arc<DeterministicRng>,
    steps: usize,
) -> Result<u64> {
    let mut acknowledged = 0;
    for _ in 0..steps {
        match rng.next_index(10) {
            0..=5 => {
                dispatcher
                    .invoke(id.clone(), OP_INCREMENT.to_string(), Bytes::new())
                    .await?;
                acknowledged += 1;
            }
            6..=7 => {
                dispatcher
                    .fire_reminder(id.clone(), "tick".to_string())
                    .await?;
                acknowledged += 1;
            }
            _ => dispatcher.deactivate(id.clone()).await?,
        }
        if rng.next_bool(0.3) {
            tokio::time::sleep(Duration::from_millis(rng.next_index(5) as u64)).await;
        }
    }
    Ok(acknowledged)
}

#[test]
fn test_dst_single_activation_under_churn() {
    let config = SimConfig::from_env_or_random();

    Simulation::new(config)
        .with_fault(FaultConfig::new(
            FaultType::StorageLatency {
                min_ms: 1,
                max_ms: 10,
            },
            0.5,
        ))
        .run(|env| async move {
            let tracked = TrackedActor::default();
            let mut runtime = tracked_runtime(&env, tracked.clone(), Duration::from_secs(300))?;
            runtime.start().await?;

            let id = ActorId::new("tracked", "churn")?;
            let clients = (0..8).map(|_| {
                let handle = runtime.dispatcher_handle();
                let id = id.clone();
                let rng = env.fork_rng();
                tokio::spawn(churn(handle, id, rng, 40))
            });

            let mut acknowledged = 0;
            for joined in join_all(clients).await {
                acknowledged += joined.map_err(|e| Error::internal(e.to_string()))??;
            }

            let count = parse_count(
                runtime
                    .dispatcher_handle()
                    .invoke(id.clone(), OP_GET.to_string(), Bytes::new())
                    .await?,
            )?;

            assert_eq!(tracked.live_max.load(Ordering::SeqCst), 1);
            assert!(tracked.activations.load(Ordering::SeqCst) > 1, "never deactivated");
            assert_eq!(count, acknowledged, "lost or duplicated turns");

            runtime.stop().await?;
            assert_eq!(tracked.live.load(Ordering::SeqCst), 0);
            Ok(())
        })
        .expect("one live activation and no lost updates");
}

#[test]
fn test_dst_single_activation_across_idle_timeouts() {
    let config = SimConfig::from_env_or_random();

    // Idle deactivation races with bursts of new messages
    Simulation::new(config)
        .with_fault(FaultConfig::new(
            FaultType::StorageLatency {
                min_ms: 1,
                max_ms: 5,
            },
            0.5,
        ))
        .run(|env| async move {
            let tracked = TrackedActor::default();
            let mut runtime = tracked_runtime(&env, tracked.clone(), Duration::from_millis(3))?;
            runtime.start().await?;

            let id = ActorId::new("tracked", "idle")?;
            let rng = env.fork_rng();
            let mut expected = 0;
            for _ in 0..20 {
                let burst = 1 + rng.next_index(4);
                let invokes = (0..burst).map(|_| {
                    let handle = runtime.dispatcher_handle();
                    let id = id.clone();
                    async move { handle.invoke(id, OP_INCREMENT.to_string(), Bytes::new()).await }
                });
                for result in join_all(invokes).await {
                    result?;
                    expected += 1;
                }
                tokio::time::sleep(Duration::from_millis(rng.next_index(10) as u64)).await;
            }

            let count = parse_count(
                runtime
                    .dispatcher_handle()
                    .invoke(id.clone(), OP_GET.to_string(), Bytes::new())
                    .await?,
            )?;

            assert_eq!(tracked.live_max.load(Ordering::SeqCst), 1);
            assert!(tracked.activations.load(Ordering::SeqCst) > 1, "idle timeout never fired");
            assert_eq!(count, expected);

            runtime.stop().await?;
            Ok(())
        })
        .expect("idle deactivation must not overlap reactivation");
}

#[test]
fn test_dst_distinct_actors_activate_independently() {
    let config = SimConfig::from_env_or_random();

    Simulation::new(config)
        .run(|env| async move {
            let tracked = TrackedActor::default();
            let mut runtime = tracked_runtime(&env, tracked.clone(), Duration::from_secs(300))?;
            runtime.start().await?;

            let ids: Vec<ActorId> = (0..4)
                .map(|i| ActorId::new("tracked", format!("a{}", i)))
                .collect::<Result<_>>()?;
            let invokes = ids.iter().map(|id| {
                let handle = runtime.dispatcher_handle();
                let id = id.clone();
                async move { handle.invoke(id, OP_INCREMENT.to_string(), Bytes::new()).await }
            });
            for result in join_all(invokes).await {
                assert_eq!(parse_count(result?)?, 1);
            }

            assert_eq!(runtime.active_actor_count(), 4);
            assert_eq!(tracked.live.load(Ordering::SeqCst), 4);
            runtime.stop().await?;
            Ok(())
        })
        .expect("activations of different actors run side by side");
}
