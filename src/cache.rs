// src/cache.rs

use crate::client::KeySetSource;
use crate::config::RefreshPolicy;
use crate::error::FetchError;
use crate::model::KeySetDocument;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

type RefreshResult = Result<Arc<CachedKeySet>, FetchError>;

/// An immutable snapshot of the active key set.
#[derive(Debug)]
pub struct CachedKeySet {
    pub document: KeySetDocument,
    /// Strictly increasing across replacements; the first snapshot is 1.
    pub generation: u64,
}

impl CachedKeySet {
    pub fn fetched_at(&self) -> Instant {
        self.document.fetched_at()
    }
}

/// Holds the latest key set and coordinates refreshes of it.
///
/// Readers get an `Arc` to a complete snapshot; a refresh swaps the pointer
/// and never touches a published snapshot. Concurrent refreshes share one
/// fetch.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    snapshot: ArcSwapOption<CachedKeySet>,
    generation: AtomicU64,
    // The fetch currently in progress, if any. Every caller that finds it
    // here awaits the same cell.
    in_flight: Mutex<Option<Arc<OnceCell<RefreshResult>>>>,
    min_refresh_interval: Duration,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_min_refresh_interval(source, Duration::ZERO)
    }

    pub fn with_min_refresh_interval(
        source: Arc<dyn KeySetSource>,
        min_refresh_interval: Duration,
    ) -> Self {
        Self {
            source,
            snapshot: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            min_refresh_interval,
        }
    }

    /// The current snapshot, without any network access.
    pub fn current(&self) -> Option<Arc<CachedKeySet>> {
        self.snapshot.load_full()
    }

    /// Returns the last good snapshot. Only the very first call (when no
    /// snapshot exists yet) waits for a fetch.
    pub async fn get(&self) -> RefreshResult {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        self.refresh_inner(Some(0)).await
    }

    /// Fetches a new key set and replaces the snapshot with it.
    ///
    /// Joins a fetch that is already running instead of starting another.
    /// On failure the previous snapshot stays in place and the error is
    /// returned.
    pub async fn refresh(&self) -> RefreshResult {
        self.refresh_inner(None).await
    }

    /// Refreshes because `seen_generation` lacked something the caller needed.
    ///
    /// Returns the current snapshot without fetching if it is already newer
    /// than `seen_generation`, or if the last fetch is younger than the
    /// minimum refresh interval.
    pub async fn refresh_after(&self, seen_generation: u64) -> RefreshResult {
        self.refresh_inner(Some(seen_generation)).await
    }

    async fn refresh_inner(&self, seen_generation: Option<u64>) -> RefreshResult {
        let flight = {
            let mut slot = self.in_flight.lock().await;
            // A finished cell can linger if the caller that ran it was
            // cancelled before clearing the slot; it is not a flight.
            match slot.as_ref().filter(|flight| !flight.initialized()) {
                Some(flight) => {
                    debug!("Joining in-flight key-set fetch");
                    flight.clone()
                }
                None => {
                    if let Some(seen) = seen_generation {
                        if let Some(current) = self.current() {
                            if current.generation > seen {
                                debug!(
                                    generation = current.generation,
                                    "Key set already replaced; skipping fetch"
                                );
                                return Ok(current);
                            }
                            if current.fetched_at().elapsed() < self.min_refresh_interval {
                                debug!(
                                    generation = current.generation,
                                    "Key set fetched too recently; skipping fetch"
                                );
                                return Ok(current);
                            }
                        }
                    }
                    let flight = Arc::new(OnceCell::new());
                    *slot = Some(flight.clone());
                    flight
                }
            }
        };

        let result = flight.get_or_init(|| self.fetch_and_swap()).await.clone();

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|f| Arc::ptr_eq(f, &flight)) {
            *slot = None;
        }
        result
    }

    #[instrument(skip(self))]
    async fn fetch_and_swap(&self) -> RefreshResult {
        match self.source.fetch().await {
            Ok(document) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let keys = document.len();
                let snapshot = Arc::new(CachedKeySet {
                    document,
                    generation,
                });
                self.snapshot.store(Some(snapshot.clone()));
                info!(generation, keys, "Key set replaced");
                Ok(snapshot)
            }
            Err(e) => {
                match self.current() {
                    Some(stale) => warn!(
                        error = %e,
                        generation = stale.generation,
                        "Key-set fetch failed; keeping previous snapshot"
                    ),
                    None => warn!(error = %e, "Key-set fetch failed; no snapshot available"),
                }
                Err(e)
            }
        }
    }

    /// Spawns a task that keeps the key set fresh.
    ///
    /// The next refresh is scheduled at 80% of the document's `max-age`, or
    /// of `fallback_interval` when the endpoint sent none. A `max-age`
    /// schedules no sooner than 5 s or the minimum refresh interval,
    /// whichever is longer. Failures back off exponentially from 5 s to
    /// 5 min. The task ends once the cache is dropped.
    pub fn spawn_refresh_loop(self: &Arc<Self>, fallback_interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let floor = BASE_RETRY_DELAY.max(self.min_refresh_interval);
        tokio::spawn(key_refresh_loop(cache, fallback_interval, floor))
    }

    /// Spawns the refresh loop if `policy` asks for one.
    pub fn spawn_for_policy(self: &Arc<Self>, policy: &RefreshPolicy) -> Option<JoinHandle<()>> {
        policy
            .background_refresh
            .map(|interval| self.spawn_refresh_loop(interval))
    }
}

const BASE_RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Delay until the next scheduled refresh: 80% of the document's lifetime.
///
/// A `max-age` sent by the endpoint never schedules sooner than `floor`;
/// the configured fallback interval is used as is.
fn next_refresh_delay(max_age: Option<Duration>, fallback: Duration, floor: Duration) -> Duration {
    match max_age {
        Some(ttl) => Duration::from_secs_f64(ttl.as_secs_f64() * 0.8).max(floor),
        None => Duration::from_secs_f64(fallback.as_secs_f64() * 0.8),
    }
}

async fn key_refresh_loop(cache: Weak<KeySetCache>, fallback_interval: Duration, floor: Duration) {
    let mut current_retry_delay = BASE_RETRY_DELAY;

    loop {
        let Some(strong) = cache.upgrade() else {
            debug!("Key-set cache dropped; stopping background refresh");
            return;
        };
        let outcome = strong.refresh().await;
        drop(strong);

        let delay = match outcome {
            Ok(snapshot) => {
                current_retry_delay = BASE_RETRY_DELAY;
                next_refresh_delay(snapshot.document.max_age(), fallback_interval, floor)
            }
            Err(e) => {
                error!(
                    "Failed to refresh key set in background: {}. Retrying in {:?}.",
                    e, current_retry_delay
                );
                let delay = current_retry_delay;
                current_retry_delay = (current_retry_delay * 2).min(MAX_RETRY_DELAY);
                delay
            }
        };

        debug!("Key-set background refresh scheduled in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KeyEntry;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeySetSource for FlakySource {
        async fn fetch(&self) -> Result<KeySetDocument, FetchError> {
            // Odd calls succeed, even calls fail.
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 2 == 1 {
                Ok(KeySetDocument::new(vec![KeyEntry::ec(
                    format!("k{n}"),
                    "P-256",
                    vec![1],
                    vec![1],
                    None,
                )]))
            } else {
                Err(FetchError::Status(503))
            }
        }
    }

    fn cache() -> (Arc<FlakySource>, KeySetCache) {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        (source.clone(), KeySetCache::new(source))
    }

    #[tokio::test]
    async fn get_fetches_once_then_serves_snapshot() {
        let (source, cache) = cache();
        assert!(cache.current().is_none());

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert_eq!(first.generation, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_stale_snapshot() {
        let (_, cache) = cache();
        let first = cache.get().await.unwrap();

        assert_eq!(cache.refresh().await.unwrap_err(), FetchError::Status(503));
        let still = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &still));

        let third = cache.refresh().await.unwrap();
        assert_eq!(third.generation, 2);
        assert!(third.document.find("k3").is_some());
    }

    #[tokio::test]
    async fn refresh_after_skips_when_snapshot_is_newer() {
        let (source, cache) = cache();
        cache.get().await.unwrap();
        cache.refresh().await.unwrap_err();
        let newer = cache.refresh().await.unwrap();
        assert_eq!(newer.generation, 2);

        let calls = source.calls.load(Ordering::SeqCst);
        let same = cache.refresh_after(1).await.unwrap();
        assert!(Arc::ptr_eq(&newer, &same));
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);
    }

    struct ZeroMaxAgeSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl KeySetSource for ZeroMaxAgeSource {
        async fn fetch(&self) -> Result<KeySetDocument, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(KeySetDocument::new(vec![]).with_max_age(Some(Duration::ZERO)))
        }
    }

    #[test]
    fn endpoint_max_age_is_floored_but_fallback_is_not() {
        let floor = Duration::from_secs(5);
        let fallback = Duration::from_millis(50);
        assert_eq!(
            next_refresh_delay(Some(Duration::ZERO), fallback, floor),
            floor
        );
        assert_eq!(
            next_refresh_delay(Some(Duration::from_secs(600)), fallback, floor),
            Duration::from_secs(480)
        );
        assert_eq!(
            next_refresh_delay(None, fallback, floor),
            Duration::from_millis(40)
        );
    }

    #[tokio::test]
    async fn zero_max_age_does_not_spin_the_refresh_loop() {
        let source = Arc::new(ZeroMaxAgeSource {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(KeySetCache::new(source.clone()));
        let task = cache.spawn_refresh_loop(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(200)).await;
        task.abort();
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn finished_flight_left_in_slot_is_not_joined() {
        let (source, cache) = cache();
        *cache.in_flight.lock().await = Some(Arc::new(OnceCell::new_with(Some(Err(
            FetchError::Status(503),
        )))));

        let fresh = cache.refresh().await.unwrap();
        assert_eq!(fresh.generation, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(cache.in_flight.lock().await.is_none());
    }

    #[tokio::test]
    async fn min_refresh_interval_suppresses_refresh_after() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let cache = KeySetCache::with_min_refresh_interval(source.clone(), Duration::from_secs(60));
        let first = cache.get().await.unwrap();

        let same = cache.refresh_after(first.generation).await.unwrap();
        assert!(Arc::ptr_eq(&first, &same));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }
}
