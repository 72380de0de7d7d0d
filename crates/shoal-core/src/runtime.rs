//! Runtime abstraction
//!
//! TigerStyle: Explicit runtime abstraction for task spawning and timers.
//!
//! The actor runtime spawns activation tasks and bounds turns through this
//! trait rather than calling tokio directly.
//!
//! ```rust,no_run
//! use shoal_core::runtime::{current_runtime, Runtime};
//! use std::time::Duration;
//!
//! async fn bounded_turn() {
//!     let runtime = current_runtime();
//!     let turn = runtime.spawn(async { 42 });
//!     let result = runtime.timeout(Duration::from_secs(1), turn).await;
//!     assert!(matches!(result, Ok(Ok(42))));
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// JoinHandle for spawned tasks
pub type JoinHandle<T> = Pin<Box<dyn Future<Output = Result<T, JoinError>> + Send>>;

/// Error from joining a task
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("task panicked")]
    Panicked,
    #[error("task cancelled")]
    Cancelled,
}

/// Error returned when a future did not complete within its deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline elapsed")]
pub struct Elapsed;

/// Runtime abstraction trait
///
/// Note: This trait is NOT dyn-safe due to spawn's generic parameter.
/// Use concrete types or `current_runtime()`.
#[async_trait::async_trait]
pub trait Runtime: Send + Sync + Clone + 'static {
    /// Run a future with a deadline
    async fn timeout<F>(&self, duration: Duration, future: F) -> Result<F::Output, Elapsed>
    where
        F: Future + Send,
        F::Output: Send;

    /// Spawn a new task
    ///
    /// The task runs concurrently with the current task. Dropping the
    /// returned handle detaches the task.
    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static;
}

// =============================================================================
// TokioRuntime (Production)
// =============================================================================

/// Production runtime using tokio
#[derive(Debug, Clone, Default)]
pub struct TokioRuntime;

#[async_trait::async_trait]
impl Runtime for TokioRuntime {
    async fn timeout<F>(&self, duration: Duration, future: F) -> Result<F::Output, Elapsed>
    where
        F: Future + Send,
        F::Output: Send,
    {
        tokio::time::timeout(duration, future)
            .await
            .map_err(|_| Elapsed)
    }

    fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = tokio::spawn(future);
        Box::pin(async move {
            handle.await.map_err(|e| {
                if e.is_panic() {
                    JoinError::Panicked
                } else {
                    JoinError::Cancelled
                }
            })
        })
    }
}

/// Type alias for the current runtime
pub type CurrentRuntime = TokioRuntime;

/// Get the current runtime instance
pub fn current_runtime() -> CurrentRuntime {
    TokioRuntime
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_runtime_spawn() {
        let runtime = TokioRuntime;
        let handle = runtime.spawn(async { 42 });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_tokio_runtime_spawn_reports_panic() {
        let runtime = TokioRuntime;
        let handle = runtime.spawn(async { panic!("boom") });
        assert!(matches!(handle.await, Err(JoinError::Panicked)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_runtime_timeout() {
        let runtime = TokioRuntime;

        let fast = runtime.timeout(Duration::from_millis(50), async { 7 }).await;
        assert_eq!(fast, Ok(7));

        let slow = runtime
            .timeout(
                Duration::from_millis(50),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await;
        assert_eq!(slow, Err(Elapsed));
    }
}
