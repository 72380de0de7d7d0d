//! DST tests for reminder durability
//!
//! - A registration outlives the process that armed it: a fresh runtime on
//!   the same storage resumes motion without any call to the actor
//! - If the registration itself is lost, the next activation re-registers
//!   `advance` and motion resumes
//! - Unregistration survives restarts
//!
//! TigerStyle: Deterministic testing with explicit fault injection.

use bytes::Bytes;
use shoal_core::constants::SHAPE_ADVANCE_REMINDER_NAME;
use shoal_core::{ActorId, ReminderRegistry, Result, Shape, ShapeKey, ShoalConfig};
use shoal_dst::{FaultConfig, FaultType, SimConfig, SimEnvironment, Simulation};
use shoal_runtime::{ReminderService, Runtime, RuntimeBuilder};
use shoal_server::actor::{ShapeActor, OP_GET_CURRENT_POSITION, OP_UNREGISTER_REMINDER};
use shoal_server::bus::InMemoryBus;
use shoal_storage::ActorKV;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One "host": a runtime over the simulation's shared storage
async fn host(env: &SimEnvironment) -> Result<(Runtime<ShapeActor>, usize)> {
    let bus = Arc::new(InMemoryBus::new(4096));
    let actor = ShapeActor::new(bus, env.rng_provider(), &ShoalConfig::default().shape);
    let mut runtime = RuntimeBuilder::new()
        .with_actor(actor)
        .with_kv(env.storage.clone() as Arc<dyn ActorKV>)
        .with_time(env.time())
        .build()?;
    let restored = runtime.start().await?;
    Ok((runtime, restored))
}

async fn position(runtime: &Runtime<ShapeActor>, id: &ActorId) -> Result<Shape> {
    runtime
        .actor(id.clone())
        .request(OP_GET_CURRENT_POSITION, &())
        .await
}

/// Number of ticks from `from` to `to`, if `to` is within `max` ticks
fn ticks_between(from: Shape, to: Shape, max: usize) -> Option<usize> {
    let mut shape = from;
    for ticks in 0..=max {
        if shape == to {
            return Some(ticks);
        }
        shape.advance();
    }
    None
}

#[test]
fn test_dst_reminder_resumes_on_new_host() {
    let config = SimConfig::from_env_or_random();

    Simulation::new(config)
        .run(|env| async move {
            let id = ShapeKey::new(Uuid::new_v4(), Uuid::new_v4()).actor_id()?;

            let (mut first, _) = host(&env).await?;
            position(&first, &id).await?;
            tokio::time::sleep(Duration::from_millis(350)).await;
            let before = position(&first, &id).await?;
            first.stop().await?;

            // New host: only the persisted registration can move the shape
            let (second, restored) = host(&env).await?;
            assert_eq!(restored, 1);
            tokio::time::sleep(Duration::from_millis(550)).await;
            assert_eq!(second.active_actor_count(), 1);

            let after = position(&second, &id).await?;
            let ticks = ticks_between(before, after, 10);
            assert!(
                matches!(ticks, Some(4..=6)),
                "expected about five ticks, got {:?}",
                ticks
            );
            Ok(())
        })
        .expect("persisted reminder must resume motion");
}

#[test]
fn test_dst_lost_registration_rearmed_on_activation() {
    let config = SimConfig::from_env_or_random();

    Simulation::new(config)
        .run(|env| async move {
            let id = ShapeKey::new(Uuid::new_v4(), Uuid::new_v4()).actor_id()?;

            let (mut first, _) = host(&env).await?;
            position(&first, &id).await?;
            first.stop().await?;

            // Relocation that loses the reminder but keeps the state
            ReminderService::new(env.storage.clone() as Arc<dyn ActorKV>)?
                .unregister(&id, SHAPE_ADVANCE_REMINDER_NAME)
                .await?;

            let (second, restored) = host(&env).await?;
            assert_eq!(restored, 0);
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(second.active_actor_count(), 0);

            // The first call reactivates and re-registers
            let reactivated = position(&second, &id).await?;
            assert!(second.reminders().is_scheduled(&id, SHAPE_ADVANCE_REMINDER_NAME));
            tokio::time::sleep(Duration::from_millis(550)).await;
            let moved = position(&second, &id).await?;

            let ticks = ticks_between(reactivated, moved, 10);
            assert!(matches!(ticks, Some(4..=6)), "got {:?}", ticks);
            Ok(())
        })
        .expect("activation must re-register advance");
}

#[test]
fn test_dst_unregister_survives_restart() {
    let config = SimConfig::from_env_or_random();

    Simulation::new(config)
        .run(|env| async move {
            let id = ShapeKey::new(Uuid::new_v4(), Uuid::new_v4()).actor_id()?;

            let (mut first, _) = host(&env).await?;
            first
                .actor(id.clone())
                .invoke(OP_UNREGISTER_REMINDER, Bytes::new())
                .await?;
            first.stop().await?;

            let (second, restored) = host(&env).await?;
            assert_eq!(restored, 0);
            tokio::time::sleep(Duration::from_millis(500)).await;
            assert_eq!(second.active_actor_count(), 0);
            Ok(())
        })
        .expect("unregistered reminder must stay gone");
}

#[test]
fn test_dst_reminder_survives_flaky_deliveries() {
    let config = SimConfig::from_env_or_random();

    // Failed ticks roll back; later periods still fire
    Simulation::new(config)
        .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 0.2).with_filter("kv_set").after(20))
        .run(|env| async move {
            let id = ShapeKey::new(Uuid::new_v4(), Uuid::new_v4()).actor_id()?;

            let (runtime, _) = host(&env).await?;
            let mut start = None;
            for _ in 0..10 {
                if let Ok(shape) = position(&runtime, &id).await {
                    start = Some(shape);
                    break;
                }
            }
            let Some(start) = start else {
                return Err(shoal_core::Error::internal("actor never activated"));
            };

            tokio::time::sleep(Duration::from_millis(2_050)).await;

            let mut end = None;
            for _ in 0..10 {
                if let Ok(shape) = position(&runtime, &id).await {
                    end = Some(shape);
                    break;
                }
            }
            let Some(end) = end else {
                return Err(shoal_core::Error::internal("actor unreadable"));
            };

            // 20 periods, some lost to faults, none applied twice
            let ticks = ticks_between(start, end, 21);
            assert!(matches!(ticks, Some(5..=21)), "got {:?}", ticks);
            Ok(())
        })
        .expect("reminder must keep firing through faults");
}
