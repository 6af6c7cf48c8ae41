//! Ordered registry of teardown actions.

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use testbed_core::ports::Logger;
use testbed_core::{Error, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub(crate) type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Outcome of [`CleanupRegistry::run_all`].
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    /// Labels of the actions that completed, in execution order.
    pub succeeded: Vec<String>,
    /// Failed or panicked actions, as [`Error::Teardown`].
    pub failures: Vec<Error>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

/// Append-only list of teardown actions, drained by [`run_all`](Self::run_all).
///
/// Actions run one at a time in registration order. Once closed, new
/// registrations are still recorded but nothing will run them.
#[derive(Clone, Default)]
pub struct CleanupRegistry {
    actions: Arc<Mutex<Vec<(String, CleanupAction)>>>,
    closed: Arc<AtomicBool>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register<F, Fut>(&self, label: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register_boxed(label.into(), Box::new(move || action().boxed()))
            .await;
    }

    pub(crate) async fn register_boxed(&self, label: String, action: CleanupAction) {
        if self.is_closed() {
            warn!(label = %label, "Cleanup registered after its environment stopped; it will not run");
        } else {
            debug!(label = %label, "Registered cleanup");
        }
        self.actions.lock().await.push((label, action));
    }

    /// Mark the owning environment as stopped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.actions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.actions.lock().await.is_empty()
    }

    /// Run and remove every registered action.
    ///
    /// A failing or panicking action is reported to `logger` and does not
    /// prevent the remaining ones from running. Never fails.
    pub async fn run_all(&self, logger: &dyn Logger) -> CleanupReport {
        let actions = std::mem::take(&mut *self.actions.lock().await);
        info!(count = actions.len(), "Running cleanups");

        let mut report = CleanupReport::default();
        for (label, action) in actions {
            let outcome = AssertUnwindSafe(async move { action().await })
                .catch_unwind()
                .await;

            let message = match outcome {
                Ok(Ok(())) => {
                    debug!(label = %label, "Cleanup finished");
                    report.succeeded.push(label);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            logger.error(json!({
                "msg": "Cleanup failed",
                "cleanup": label,
                "error": message,
            }));
            report.failures.push(Error::Teardown { label, message });
        }
        report
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use testbed_core::ports::{LogLevel, NoopLogger};
    use testbed_core::testing::{EventLog, RecordingLogger};

    #[tokio::test]
    async fn test_runs_in_registration_order() {
        let registry = CleanupRegistry::new();
        let events = EventLog::default();

        for label in ["a", "b", "c"] {
            let events = events.clone();
            registry
                .register(label, move || async move {
                    events.push(label);
                    Ok(())
                })
                .await;
        }

        let report = registry.run_all(&NoopLogger).await;
        assert_eq!(events.events(), vec!["a", "b", "c"]);
        assert_eq!(report.succeeded, vec!["a", "b", "c"]);
        assert!(report.is_clean());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_actions() {
        let registry = CleanupRegistry::new();
        let events = EventLog::default();
        let logger = RecordingLogger::new();

        registry
            .register("a", || async { Err(Error::Internal("boom".into())) })
            .await;
        let later = events.clone();
        registry
            .register("b", move || async move {
                later.push("b");
                Ok(())
            })
            .await;

        let report = registry.run_all(&logger).await;
        assert_eq!(events.events(), vec!["b"]);
        assert_eq!(report.attempted(), 2);
        assert!(matches!(&report.failures[0], Error::Teardown { label, .. } if label == "a"));

        let errors = logger.at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["cleanup"], "a");
    }

    #[tokio::test]
    async fn test_panicking_action_is_isolated() {
        let registry = CleanupRegistry::new();
        let events = EventLog::default();

        registry
            .register("panics", || async {
                let explode = true;
                if explode {
                    panic!("teardown exploded");
                }
                Ok(())
            })
            .await;
        let later = events.clone();
        registry
            .register("after", move || async move {
                later.push("after");
                Ok(())
            })
            .await;

        let report = registry.run_all(&NoopLogger).await;
        assert_eq!(events.events(), vec!["after"]);
        match &report.failures[0] {
            Error::Teardown { message, .. } => assert!(message.contains("teardown exploded")),
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_all_drains() {
        let registry = CleanupRegistry::new();
        registry.register("once", || async { Ok(()) }).await;

        assert_eq!(registry.run_all(&NoopLogger).await.attempted(), 1);
        assert_eq!(registry.run_all(&NoopLogger).await.attempted(), 0);
    }

    #[tokio::test]
    async fn test_closed_registry_still_records_registrations() {
        let registry = CleanupRegistry::new();
        let shared = registry.clone();
        registry.close();

        assert!(shared.is_closed());
        shared.register("late", || async { Ok(()) }).await;
        assert_eq!(registry.len().await, 1);
    }
}
