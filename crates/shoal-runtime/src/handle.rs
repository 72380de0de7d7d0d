//! Actor handles for external invocations
//!
//! TigerStyle: Location-transparent references with explicit error handling.

use crate::dispatcher::DispatcherHandle;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use shoal_core::actor::ActorId;
use shoal_core::error::{Error, Result};
use shoal_core::Runtime;
use std::time::Duration;

/// Handle to invoke an actor
///
/// Cheap to clone. Holding a handle does not keep the actor active; the
/// first message after a deactivation reactivates it.
#[derive(Clone)]
pub struct ActorHandle {
    actor_id: ActorId,
    dispatcher: DispatcherHandle,
    /// Caller-side deadline, on top of the turn deadline
    default_timeout: Option<Duration>,
}

impl ActorHandle {
    pub fn new(actor_id: ActorId, dispatcher: DispatcherHandle) -> Self {
        Self {
            actor_id,
            dispatcher,
            default_timeout: None,
        }
    }

    /// Create a handle with a default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn id(&self) -> &ActorId {
        &self.actor_id
    }

    /// Invoke the actor with an operation and payload
    pub async fn invoke(&self, operation: impl Into<String>, payload: Bytes) -> Result<Bytes> {
        let operation = operation.into();

        match self.default_timeout {
            Some(timeout) => shoal_core::current_runtime()
                .timeout(timeout, self.invoke_inner(&operation, payload))
                .await
                .map_err(|_| Error::ActorInvocationTimeout {
                    id: self.actor_id.qualified_name(),
                    operation: operation.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                })?,
            None => self.invoke_inner(&operation, payload).await,
        }
    }

    async fn invoke_inner(&self, operation: &str, payload: Bytes) -> Result<Bytes> {
        self.dispatcher
            .invoke(self.actor_id.clone(), operation.to_string(), payload)
            .await
    }

    /// Invoke with a JSON request and response
    pub async fn request<Req, Resp>(
        &self,
        operation: impl Into<String>,
        request: &Req,
    ) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_vec(request).map_err(|e| Error::SerializationFailed {
            reason: format!("failed to serialize request: {}", e),
        })?;

        let response = self.invoke(operation, Bytes::from(payload)).await?;

        serde_json::from_slice(&response).map_err(|e| Error::DeserializationFailed {
            reason: format!("failed to deserialize response: {}", e),
        })
    }

    /// Deactivate the actor
    ///
    /// The actor will be reactivated on the next invocation.
    pub async fn deactivate(&self) -> Result<()> {
        self.dispatcher.deactivate(self.actor_id.clone()).await
    }
}

impl std::fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorHandle")
            .field("actor_id", &self.actor_id)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

/// Builder for creating actor handles
#[derive(Clone)]
pub struct ActorHandleBuilder {
    dispatcher: DispatcherHandle,
}

impl ActorHandleBuilder {
    pub fn new(dispatcher: DispatcherHandle) -> Self {
        Self { dispatcher }
    }

    /// Create a handle for the given actor ID
    pub fn for_actor(&self, actor_id: ActorId) -> ActorHandle {
        ActorHandle::new(actor_id, self.dispatcher.clone())
    }

    /// Create a handle for the given namespace and ID
    pub fn for_parts(
        &self,
        namespace: impl Into<String>,
        id: impl Into<String>,
    ) -> Result<ActorHandle> {
        let actor_id = ActorId::new(namespace, id)?;
        Ok(self.for_actor(actor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{CloneFactory, Dispatcher, DispatcherConfig};
    use async_trait::async_trait;
    use serde::Deserialize;
    use shoal_core::actor::{Actor, ActorContext};
    use shoal_core::reminder::NoOpReminders;
    use shoal_core::TokioRuntime;
    use shoal_storage::MemoryKV;
    use std::sync::Arc;

    #[derive(Debug, Default, Clone, Serialize, Deserialize)]
    struct GreeterState {
        greeted: u32,
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Greeting {
        text: String,
        count: u32,
    }

    #[derive(Clone)]
    struct GreeterActor;

    #[async_trait]
    impl Actor for GreeterActor {
        type State = GreeterState;

        async fn invoke(
            &self,
            ctx: &mut ActorContext<Self::State>,
            operation: &str,
            payload: Bytes,
        ) -> Result<Bytes> {
            match operation {
                "greet" => {
                    let name: String = serde_json::from_slice(&payload)?;
                    ctx.state.greeted += 1;
                    let greeting = Greeting {
                        text: format!("hello {}", name),
                        count: ctx.state.greeted,
                    };
                    Ok(Bytes::from(serde_json::to_vec(&greeting)?))
                }
                "stall" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(Bytes::new())
                }
                "echo" => Ok(payload),
                _ => Err(Error::InvalidOperation {
                    operation: operation.to_string(),
                }),
            }
        }
    }

    fn builder() -> ActorHandleBuilder {
        let runtime = TokioRuntime;
        let mut dispatcher = Dispatcher::new(
            Arc::new(CloneFactory::new(GreeterActor)),
            Arc::new(MemoryKV::new()),
            Arc::new(NoOpReminders),
            DispatcherConfig::default(),
            runtime.clone(),
        );
        let handle = dispatcher.handle();
        drop(runtime.spawn(async move { dispatcher.run().await }));
        ActorHandleBuilder::new(handle)
    }

    #[tokio::test]
    async fn test_typed_request() {
        let actor = builder().for_parts("greeter", "g1").unwrap();

        let first: Greeting = actor.request("greet", &"ada").await.unwrap();
        let second: Greeting = actor.request("greet", &"bob").await.unwrap();

        assert_eq!(first.text, "hello ada");
        assert_eq!(second.count, 2);
    }

    #[tokio::test]
    async fn test_raw_invoke() {
        let actor = builder().for_parts("greeter", "g2").unwrap();
        let result = actor.invoke("echo", Bytes::from("ping")).await.unwrap();
        assert_eq!(result, Bytes::from("ping"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_timeout() {
        let actor = builder()
            .for_parts("greeter", "g3")
            .unwrap()
            .with_timeout(Duration::from_millis(100));

        let result = actor.invoke("stall", Bytes::new()).await;
        assert!(matches!(
            result,
            Err(Error::ActorInvocationTimeout { timeout_ms: 100, .. })
        ));
    }

    #[tokio::test]
    async fn test_bad_response_is_deserialization_error() {
        let actor = builder().for_parts("greeter", "g4").unwrap();
        let result: Result<Greeting> = actor.request("echo", &42).await;
        assert!(matches!(result, Err(Error::DeserializationFailed { .. })));
    }

    #[test]
    fn test_for_parts_validates_id() {
        let runtime = TokioRuntime;
        let dispatcher: Dispatcher<GreeterActor, _> = Dispatcher::new(
            Arc::new(CloneFactory::new(GreeterActor)),
            Arc::new(MemoryKV::new()),
            Arc::new(NoOpReminders),
            DispatcherConfig::default(),
            runtime,
        );
        let builder = ActorHandleBuilder::new(dispatcher.handle());
        assert!(builder.for_parts("greeter", "bad id").is_err());
    }
}
