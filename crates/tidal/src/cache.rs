use crate::error::Error;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// In-process TTL cache with per-key single-flight loads.
///
/// Each key owns an async mutex slot; `fetch` holds the slot across the
/// loader call, so concurrent fetches for one key run the loader once and the
/// rest observe the stored value. A loader error leaves the slot empty.
pub(crate) struct Cache<T> {
    ttl: Duration,
    slots: StdMutex<HashMap<String, Arc<Mutex<Slot<T>>>>>,
}

struct Slot<T> {
    value: Option<T>,
    fresh_until: Option<Instant>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            fresh_until: None,
        }
    }
}

impl<T: Clone> Cache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: StdMutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &str) -> Arc<Mutex<Slot<T>>> {
        let mut slots = self.slots.lock().unwrap();
        slots.entry(key.to_string()).or_default().clone()
    }

    pub async fn fetch<F, Fut>(&self, key: &str, load: F) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let slot = self.slot(key);
        let mut slot = slot.lock().await;

        if let (Some(value), Some(until)) = (&slot.value, slot.fresh_until) {
            if Instant::now() < until {
                return Ok(value.clone());
            }
        }

        let value = load().await?;
        slot.value = Some(value.clone());
        slot.fresh_until = Some(Instant::now() + self.ttl);
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: T) {
        let slot = self.slot(key);
        let mut slot = slot.lock().await;
        slot.value = Some(value);
        slot.fresh_until = Some(Instant::now() + self.ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn single_flight_under_contention() {
        let cache = Arc::new(Cache::<u64>::new(Duration::from_secs(60)));
        let loads = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let cache = cache.clone();
                let loads = loads.clone();
                tokio::spawn(async move {
                    cache
                        .fetch("key", || async {
                            loads.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok(7)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn loader_error_is_not_cached() {
        let cache = Cache::<u64>::new(Duration::from_secs(60));

        let first = cache
            .fetch("key", || async { Err(Error::RateLimited) })
            .await;
        assert!(matches!(first, Err(Error::RateLimited)));

        let second = cache.fetch("key", || async { Ok(1) }).await.unwrap();
        assert_eq!(second, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_reloads() {
        let cache = Cache::<u64>::new(Duration::from_secs(10));

        assert_eq!(cache.fetch("key", || async { Ok(1) }).await.unwrap(), 1);
        // still fresh
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(cache.fetch("key", || async { Ok(2) }).await.unwrap(), 1);
        // past the ttl
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.fetch("key", || async { Ok(2) }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn set_preseeds_fetch() {
        let cache = Cache::<u64>::new(Duration::from_secs(60));
        cache.set("key", 42).await;

        // a loader that would fail proves it is never invoked
        let value = cache
            .fetch("key", || async { Err(Error::RateLimited) })
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let cache = Cache::<u64>::new(Duration::from_secs(60));
        assert_eq!(cache.fetch("a", || async { Ok(1) }).await.unwrap(), 1);
        assert_eq!(cache.fetch("b", || async { Ok(2) }).await.unwrap(), 2);
    }
}
