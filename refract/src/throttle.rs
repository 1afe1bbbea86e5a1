//! Admission control for outbound origin fetches.
//!
//! Two levels: one global counting semaphore bounding all concurrent
//! downloads, and one semaphore per origin host, created lazily on first use
//! and never removed. The registry is an explicit value injected into the
//! pipeline at construction, not process-global state; the per-origin map is
//! a [`DashMap`] so concurrent first-touch of a new origin is serialized.
//!
//! Acquisition blocks until a slot frees up and cannot fail. Release happens
//! on every exit path of the protected region: [`ThrottlePermit`] holds both
//! owned permits and returns them on drop.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Global + per-origin fetch slots.
pub struct ThrottleRegistry {
    global: Arc<Semaphore>,
    per_origin: DashMap<String, Arc<Semaphore>>,
    per_origin_limit: usize,
}

/// RAII guard for one admitted fetch. Dropping it releases the origin slot
/// and then the global slot, on success, error, and panic paths alike.
pub struct ThrottlePermit {
    _origin: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl ThrottleRegistry {
    pub fn new(max_concurrent_fetches: usize, max_concurrent_fetches_per_origin: usize) -> Self {
        ThrottleRegistry {
            global: Arc::new(Semaphore::new(max_concurrent_fetches)),
            per_origin: DashMap::new(),
            per_origin_limit: max_concurrent_fetches_per_origin,
        }
    }

    /// Waits for a global slot, then a slot for `origin`. First-ready-wins;
    /// no queueing priority beyond what the semaphore provides.
    pub async fn acquire(&self, origin: &str) -> ThrottlePermit {
        let origin_sem = self
            .per_origin
            .entry(origin.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_origin_limit)))
            .clone();

        // The semaphores are never closed, so acquisition cannot fail.
        let global = Arc::clone(&self.global)
            .acquire_owned()
            .await
            .expect("global throttle semaphore closed");
        let origin = origin_sem
            .acquire_owned()
            .await
            .expect("origin throttle semaphore closed");

        ThrottlePermit {
            _origin: origin,
            _global: global,
        }
    }

    /// Free global slots right now (for occupancy logging).
    pub fn global_available(&self) -> usize {
        self.global.available_permits()
    }

    /// Free slots for `origin`, or `None` if it was never fetched from.
    pub fn origin_available(&self, origin: &str) -> Option<usize> {
        self.per_origin
            .get(origin)
            .map(|sem| sem.available_permits())
    }
}

/// Extracts the throttle key from a source URL: the full host, not reduced
/// to a registrable domain.
pub fn origin_of(source_url: &str) -> Option<String> {
    let parsed = Url::parse(source_url).ok()?;
    parsed.host_str().map(|host| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn origin_is_full_host() {
        assert_eq!(
            origin_of("https://img.cdn.example.co.uk/a/b.jpg").as_deref(),
            Some("img.cdn.example.co.uk")
        );
    }

    #[test]
    fn origin_of_garbage_is_none() {
        assert_eq!(origin_of("not a url"), None);
        assert_eq!(origin_of("file:///tmp/x.jpg"), None);
    }

    #[tokio::test]
    async fn permit_released_on_drop() {
        let registry = ThrottleRegistry::new(1, 1);
        {
            let _permit = registry.acquire("a.com").await;
            assert_eq!(registry.global_available(), 0);
            assert_eq!(registry.origin_available("a.com"), Some(0));
        }
        assert_eq!(registry.global_available(), 1);
        assert_eq!(registry.origin_available("a.com"), Some(1));
    }

    #[tokio::test]
    async fn origins_are_independent() {
        let registry = ThrottleRegistry::new(10, 1);
        let _a = registry.acquire("a.com").await;
        // b.com is not starved by a.com's slot being taken.
        let _b = registry.acquire("b.com").await;
        assert_eq!(registry.origin_available("a.com"), Some(0));
        assert_eq!(registry.origin_available("b.com"), Some(0));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limits() {
        // Global capacity 2, per-origin capacity 1: N tasks against one
        // origin must never observe more than 1 in flight for that origin
        // nor more than 2 in flight globally.
        let registry = Arc::new(ThrottleRegistry::new(2, 1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let _permit = registry.acquire("origin.example").await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn global_limit_caps_across_origins() {
        let registry = Arc::new(ThrottleRegistry::new(2, 1));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for i in 0..12 {
            let registry = Arc::clone(&registry);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            tasks.push(tokio::spawn(async move {
                let origin = format!("host-{}.example", i % 4);
                let _permit = registry.acquire(&origin).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
