//! Single-flight memoization of resource creation.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use testbed_core::{Error, Result};
use tokio::sync::Mutex;
use tracing::debug;

type AnyResource = Arc<dyn Any + Send + Sync>;
type SharedOutcome = Shared<BoxFuture<'static, Result<AnyResource>>>;

/// Keyed store of in-flight and completed resource creations.
///
/// For each key the factory runs at most once; every caller, concurrent or
/// later, observes that one outcome. A factory that fails before returning
/// its future leaves no entry, so the key stays retryable. A future that
/// resolves to an error is remembered until [`clear`](Self::clear).
#[derive(Clone, Default)]
pub struct ResourceCache {
    entries: Arc<Mutex<HashMap<String, SharedOutcome>>>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the outcome recorded for `key`, creating it with `factory`
    /// if there is none.
    ///
    /// `factory` runs while the cache is locked and must not call back into
    /// the same cache; the future it returns may.
    pub async fn get_or_create<T, F, Fut>(&self, key: &str, factory: F) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<Fut> + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let outcome = {
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                Some(existing) => {
                    debug!(key = %key, "Resource cache hit");
                    existing.clone()
                }
                None => {
                    debug!(key = %key, "Creating resource");
                    let pending = factory()?;
                    let shared = async move {
                        pending
                            .await
                            .map(|resource| Arc::new(resource) as AnyResource)
                    }
                    .boxed()
                    .shared();
                    entries.insert(key.to_string(), shared.clone());
                    shared
                }
            }
        };

        let resource = outcome.await?;
        resource
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| Error::ResourceTypeMismatch {
                key: key.to_string(),
            })
    }

    /// Whether an outcome (or creation in flight) is recorded for `key`.
    pub async fn contains(&self, key: &str) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop every entry. Runs no teardown.
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        debug!(count, "Resource cache cleared");
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_creation() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let callers = (0..8).map(|_| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create("postgres", move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok("postgres://db".to_string())
                        })
                    })
                    .await
            })
        });

        let results = futures::future::join_all(callers).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap(), "postgres://db");
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_failure() {
        let cache = ResourceCache::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(async {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<String, _>(Error::provisioning("redis", "connection refused"))
                })
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_create("redis", make(calls.clone())),
            cache.get_or_create("redis", make(calls.clone())),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap_err().to_string(), b.unwrap_err().to_string());
    }

    #[tokio::test]
    async fn test_async_failure_is_sticky() {
        let cache = ResourceCache::new();

        let first = cache
            .get_or_create("minio", || {
                Ok(async { Err::<String, _>(Error::provisioning("minio", "bucket exists")) })
            })
            .await;
        assert!(first.is_err());

        let second_called = Arc::new(AtomicUsize::new(0));
        let counter = second_called.clone();
        let second = cache
            .get_or_create("minio", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(async { Ok("fresh".to_string()) })
            })
            .await;

        assert_eq!(second_called.load(Ordering::SeqCst), 0);
        assert!(matches!(second, Err(Error::Provisioning { ref message, .. }) if message == "bucket exists"));
    }

    #[tokio::test]
    async fn test_sync_failure_is_retryable() {
        let cache = ResourceCache::new();

        let first = cache
            .get_or_create("mongo", || {
                Err::<futures::future::Ready<Result<String>>, _>(Error::Configuration(
                    "missing credentials".into(),
                ))
            })
            .await;
        assert!(matches!(first, Err(Error::Configuration(_))));
        assert!(!cache.contains("mongo").await);

        let second = cache
            .get_or_create("mongo", || Ok(async { Ok("mongodb://db".to_string()) }))
            .await;
        assert_eq!(second.unwrap(), "mongodb://db");
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let cache = ResourceCache::new();
        let a = cache
            .get_or_create("a", || Ok(async { Ok(1u32) }))
            .await
            .unwrap();
        let b = cache
            .get_or_create("b", || Ok(async { Ok(2u32) }))
            .await
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_clear_allows_recreation() {
        let cache = ResourceCache::new();
        cache
            .get_or_create("k", || Ok(async { Err::<u32, _>(Error::Internal("x".into())) }))
            .await
            .unwrap_err();

        cache.clear().await;
        assert!(cache.is_empty().await);

        let value = cache
            .get_or_create("k", || Ok(async { Ok(7u32) }))
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let cache = ResourceCache::new();
        cache
            .get_or_create("k", || Ok(async { Ok(7u32) }))
            .await
            .unwrap();

        let err = cache
            .get_or_create("k", || Ok(async { Ok("seven".to_string()) }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResourceTypeMismatch { .. }));
    }
}
