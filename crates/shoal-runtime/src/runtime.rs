//! Main runtime coordinator
//!
//! TigerStyle: Single entry point, explicit configuration, clean shutdown.
//!
//! Wires the dispatcher and the reminder service together. Reminders fire
//! into the dispatcher; actors register reminders through the service. The
//! service only learns about the dispatcher at `start`, which breaks the
//! construction cycle.

use crate::dispatcher::{
    ActorFactory, CloneFactory, Dispatcher, DispatcherConfig, DispatcherHandle,
};
use crate::handle::{ActorHandle, ActorHandleBuilder};
use crate::reminder::ReminderService;
use shoal_core::actor::{Actor, ActorId};
use shoal_core::config::ShoalConfig;
use shoal_core::error::{Error, Result};
use shoal_core::io::{TimeProvider, WallClockTime};
use shoal_core::{current_runtime, CurrentRuntime, JoinHandle, Runtime as _};
use shoal_storage::ActorKV;
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for the runtime
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Dispatcher configuration
    pub dispatcher: DispatcherConfig,
}

impl From<&ShoalConfig> for RuntimeConfig {
    fn from(config: &ShoalConfig) -> Self {
        Self {
            dispatcher: DispatcherConfig::from(&config.actor),
        }
    }
}

/// Builder for creating a runtime
pub struct RuntimeBuilder<A: Actor> {
    factory: Option<Arc<dyn ActorFactory<A>>>,
    kv: Option<Arc<dyn ActorKV>>,
    time: Option<Arc<dyn TimeProvider>>,
    config: RuntimeConfig,
}

impl<A: Actor> RuntimeBuilder<A> {
    /// Create a new runtime builder
    pub fn new() -> Self {
        Self {
            factory: None,
            kv: None,
            time: None,
            config: RuntimeConfig::default(),
        }
    }

    /// Set the actor factory
    pub fn with_factory(mut self, factory: Arc<dyn ActorFactory<A>>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Set the KV store for actor state and reminder records
    pub fn with_kv(mut self, kv: Arc<dyn ActorKV>) -> Self {
        self.kv = Some(kv);
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom time provider (for DST)
    pub fn with_time(mut self, time: Arc<dyn TimeProvider>) -> Self {
        self.time = Some(time);
        self
    }

    /// Build the runtime
    pub fn build(self) -> Result<Runtime<A>> {
        let factory = self
            .factory
            .ok_or_else(|| Error::internal("factory is required"))?;
        let kv = self.kv.ok_or_else(|| Error::internal("kv store is required"))?;
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(WallClockTime));

        Runtime::new(factory, kv, time, self.config)
    }
}

impl<A: Actor> Default for RuntimeBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Actor + Clone> RuntimeBuilder<A> {
    /// Set a prototype actor (will be cloned for each activation)
    pub fn with_actor(self, actor: A) -> Self {
        self.with_factory(Arc::new(CloneFactory::new(actor)))
    }
}

/// The main Shoal runtime
///
/// Manages actor lifecycle, message routing, and durable reminders.
pub struct Runtime<A: Actor> {
    /// The dispatcher, until `start` moves it into its task
    dispatcher: Option<Dispatcher<A, CurrentRuntime>>,
    /// Handle for sending commands
    handle: DispatcherHandle,
    reminders: ReminderService,
    /// Background task handle
    task: Option<JoinHandle<()>>,
    config: RuntimeConfig,
}

impl<A: Actor> Runtime<A> {
    /// Create a new runtime
    pub fn new(
        factory: Arc<dyn ActorFactory<A>>,
        kv: Arc<dyn ActorKV>,
        time: Arc<dyn TimeProvider>,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let reminders = ReminderService::new(kv.clone())?;
        let dispatcher = Dispatcher::new(
            factory,
            kv,
            Arc::new(reminders.clone()),
            config.dispatcher.clone(),
            current_runtime(),
        )
        .with_time(time);
        let handle = dispatcher.handle();

        Ok(Self {
            dispatcher: Some(dispatcher),
            handle,
            reminders,
            task: None,
            config,
        })
    }

    /// Start the runtime
    ///
    /// Spawns the dispatcher loop, then reloads and arms every persisted
    /// reminder. Returns the number of reminders restored.
    pub async fn start(&mut self) -> Result<usize> {
        let mut dispatcher = self
            .dispatcher
            .take()
            .ok_or_else(|| Error::internal("runtime already started"))?;

        info!("Starting Shoal runtime");

        self.task = Some(current_runtime().spawn(async move {
            dispatcher.run().await;
        }));

        self.reminders.set_sink(Arc::new(self.handle.clone()))?;
        self.reminders.start().await
    }

    /// Stop the runtime
    ///
    /// Reminder timers stop first so no firing races the deactivations.
    /// Registrations stay in storage for the next start.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            info!("Stopping Shoal runtime");
            self.reminders.shutdown();
            self.handle.shutdown().await?;
            task.await
                .map_err(|e| Error::internal(format!("dispatcher task failed: {}", e)))?;
        }
        Ok(())
    }

    /// Get a handle to the dispatcher
    pub fn dispatcher_handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Get an actor handle builder
    pub fn actor_handles(&self) -> ActorHandleBuilder {
        ActorHandleBuilder::new(self.handle.clone())
    }

    /// Get a handle to a specific actor
    pub fn actor(&self, actor_id: ActorId) -> ActorHandle {
        ActorHandle::new(actor_id, self.handle.clone())
    }

    /// Get a handle to a specific actor by namespace and id
    pub fn actor_by_parts(
        &self,
        namespace: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<ActorHandle> {
        let actor_id = ActorId::new(namespace, id)?;
        Ok(self.actor(actor_id))
    }

    /// The durable reminder service
    pub fn reminders(&self) -> &ReminderService {
        &self.reminders
    }

    pub fn active_actor_count(&self) -> usize {
        self.handle.active_actor_count()
    }

    /// Check if the runtime is running
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Get the runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

impl<A: Actor> Drop for Runtime<A> {
    fn drop(&mut self) {
        if self.task.take().is_some() {
            // Can't await in drop; stop timers and ask the loop to wind down
            self.reminders.shutdown();
            if !self.handle.try_shutdown() {
                warn!("Dispatcher did not accept shutdown on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use serde::{Deserialize, Serialize};
    use shoal_core::actor::ActorContext;
    use shoal_storage::MemoryKV;
    use std::time::Duration;

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct TickerState {
        ticks: u64,
    }

    /// Counts reminder firings; "start" arms a 100ms reminder
    #[derive(Clone)]
    struct TickerActor;

    #[async_trait]
    impl Actor for TickerActor {
        type State = TickerState;

        async fn invoke(
            &self,
            ctx: &mut ActorContext<Self::State>,
            operation: &str,
            _payload: Bytes,
        ) -> Result<Bytes> {
            match operation {
                "start" => {
                    ctx.register_reminder("tick", 100, 100)?;
                    Ok(Bytes::new())
                }
                "stop" => {
                    ctx.unregister_reminder("tick");
                    Ok(Bytes::new())
                }
                "increment" => {
                    ctx.state.ticks += 1;
                    Ok(Bytes::from(ctx.state.ticks.to_string()))
                }
                "get" => Ok(Bytes::from(ctx.state.ticks.to_string())),
                _ => Err(Error::InvalidOperation {
                    operation: operation.to_string(),
                }),
            }
        }

        async fn receive_reminder(
            &self,
            ctx: &mut ActorContext<Self::State>,
            _name: &str,
        ) -> Result<()> {
            ctx.state.ticks += 1;
            Ok(())
        }
    }

    fn build(kv: Arc<MemoryKV>) -> Runtime<TickerActor> {
        RuntimeBuilder::new()
            .with_actor(TickerActor)
            .with_kv(kv)
            .build()
            .unwrap()
    }

    async fn ticks(runtime: &Runtime<TickerActor>, id: &str) -> u64 {
        let bytes = runtime
            .actor_by_parts("ticker", id)
            .unwrap()
            .invoke("get", Bytes::new())
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap().parse().unwrap()
    }

    #[tokio::test]
    async fn test_runtime_basic() {
        let mut runtime = build(Arc::new(MemoryKV::new()));

        assert_eq!(runtime.start().await.unwrap(), 0);
        assert!(runtime.is_running());

        let actor = runtime.actor_by_parts("ticker", "t1").unwrap();
        assert_eq!(actor.invoke("increment", Bytes::new()).await.unwrap(), Bytes::from("1"));
        assert_eq!(actor.invoke("increment", Bytes::new()).await.unwrap(), Bytes::from("2"));
        assert_eq!(runtime.active_actor_count(), 1);

        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let mut runtime = build(Arc::new(MemoryKV::new()));
        runtime.start().await.unwrap();
        assert!(runtime.start().await.is_err());
        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_build_requires_kv() {
        let result = RuntimeBuilder::<TickerActor>::new()
            .with_actor(TickerActor)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let kv = Arc::new(MemoryKV::new());

        let mut first = build(kv.clone());
        first.start().await.unwrap();
        let actor = first.actor_by_parts("ticker", "t2").unwrap();
        actor.invoke("increment", Bytes::new()).await.unwrap();
        actor.invoke("increment", Bytes::new()).await.unwrap();
        first.stop().await.unwrap();

        let mut second = build(kv);
        second.start().await.unwrap();
        assert_eq!(ticks(&second, "t2").await, 2);
        second.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_drives_actor() {
        let mut runtime = build(Arc::new(MemoryKV::new()));
        runtime.start().await.unwrap();

        let actor = runtime.actor_by_parts("ticker", "t3").unwrap();
        actor.invoke("start", Bytes::new()).await.unwrap();
        assert_eq!(runtime.reminders().scheduled_count(), 1);

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let count = ticks(&runtime, "t3").await;
        assert!((9..=11).contains(&count), "got {} ticks", count);

        actor.invoke("stop", Bytes::new()).await.unwrap();
        let stopped_at = ticks(&runtime, "t3").await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks(&runtime, "t3").await, stopped_at);

        runtime.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reminder_survives_runtime_restart() {
        let kv = Arc::new(MemoryKV::new());

        let mut first = build(kv.clone());
        first.start().await.unwrap();
        first
            .actor_by_parts("ticker", "t4")
            .unwrap()
            .invoke("start", Bytes::new())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;
        first.stop().await.unwrap();

        // The restored reminder reactivates the actor without any caller
        let mut second = build(kv);
        assert_eq!(second.start().await.unwrap(), 1);
        let before = ticks(&second, "t4").await;
        assert!(before >= 2);

        tokio::time::sleep(Duration::from_millis(550)).await;
        assert!(ticks(&second, "t4").await >= before + 4);

        second.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_deactivation_keeps_reminder_running() {
        let config = RuntimeConfig {
            dispatcher: DispatcherConfig {
                idle_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        };
        let mut runtime = RuntimeBuilder::new()
            .with_actor(TickerActor)
            .with_kv(Arc::new(MemoryKV::new()))
            .with_config(config)
            .build()
            .unwrap();
        runtime.start().await.unwrap();

        let actor = runtime.actor_by_parts("ticker", "t5").unwrap();
        actor.invoke("start", Bytes::new()).await.unwrap();

        // Period exceeds the idle timeout, so the actor cycles between firings
        tokio::time::sleep(Duration::from_millis(1050)).await;
        let count = ticks(&runtime, "t5").await;
        assert!((9..=11).contains(&count), "got {} ticks", count);

        runtime.stop().await.unwrap();
    }
}
