//! Keyed cache over the fetch→classify→aggregate pipeline.
//!
//! Each requested time window gets one slot. A slot serves its value
//! immediately even when stale, kicking off a background refresh
//! (stale-while-revalidate); at most one refresh is in flight per key, and
//! every caller waiting on the same key observes that refresh's outcome.
//! Slots that sit unreferenced past the garbage-collect duration are
//! evicted by the maintenance task, which also refreshes subscribed
//! windows on a fixed cadence.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::analytics;
use crate::classify::RuleCatalog;
use crate::config::{CacheConfig, Config, FetchConfig};
use crate::error::{Error, Result};
use crate::fetch::BoundedFetcher;
use crate::source::{HttpLogSource, LogSource};
use crate::types::{ClassifiedEntry, RawLogEntry, Statistics};

/// Snapshot served for one time window.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Raw entries exactly as fetched
    pub raw_entries: Vec<RawLogEntry>,
    /// Classified entries, one per raw entry
    pub entries: Vec<ClassifiedEntry>,
    /// Aggregate statistics over the classified set
    pub statistics: Statistics,
    /// The window that was asked for
    pub requested_window_days: u32,
    /// The window actually covered by the fetch
    pub actual_window_days: u32,
    /// Whether the fetch was cut short by any bound
    pub was_limited: bool,
    /// Human-readable reason when `was_limited` is set
    pub limit_reason: Option<String>,
    /// When this snapshot was built
    pub refreshed_at: DateTime<Utc>,
}

type RefreshResult = Result<Arc<CacheEntry>>;
type RefreshReceiver = watch::Receiver<Option<RefreshResult>>;

struct Slot {
    value: Option<Arc<CacheEntry>>,
    fetched_at: Option<Instant>,
    last_access: Instant,
    subscribers: usize,
    inflight: Option<RefreshReceiver>,
}

impl Slot {
    fn new() -> Self {
        Self {
            value: None,
            fetched_at: None,
            last_access: Instant::now(),
            subscribers: 0,
            inflight: None,
        }
    }

    fn is_stale(&self, stale_after: Duration) -> bool {
        match self.fetched_at {
            Some(fetched_at) => fetched_at.elapsed() > stale_after,
            None => true,
        }
    }
}

/// What `get` decided to do while holding the lock.
enum Action {
    Ready(Arc<CacheEntry>),
    Wait(RefreshReceiver),
    Lead(watch::Sender<Option<RefreshResult>>),
}

struct CacheShared<S> {
    fetcher: BoundedFetcher<S>,
    catalog: RuleCatalog,
    policy: CacheConfig,
    slots: Mutex<HashMap<u32, Slot>>,
}

/// Cache of classified log windows, keyed by requested window days.
pub struct LogCache<S> {
    shared: Arc<CacheShared<S>>,
}

impl<S> Clone for LogCache<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl LogCache<HttpLogSource> {
    /// Build a cache over the configured HTTP source with the standard
    /// rule catalog.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = HttpLogSource::new(&config.source)?;
        Ok(Self::new(
            Arc::new(source),
            RuleCatalog::standard(),
            config.fetch.clone(),
            config.cache.clone(),
        ))
    }
}

impl<S: LogSource + 'static> LogCache<S> {
    pub fn new(
        source: Arc<S>,
        catalog: RuleCatalog,
        fetch: FetchConfig,
        policy: CacheConfig,
    ) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                fetcher: BoundedFetcher::new(source, fetch),
                catalog,
                policy,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Current snapshot for a window.
    ///
    /// Returns immediately when a value exists, serving it stale while a
    /// background refresh runs. Only the very first access for a key (or an
    /// access after eviction) waits for the fetch; its failure propagates
    /// and leaves no slot value behind.
    pub async fn get(&self, window_days: u32) -> Result<Arc<CacheEntry>> {
        let action = {
            let mut slots = self.shared.slots.lock().unwrap();
            let slot = slots.entry(window_days).or_insert_with(Slot::new);
            slot.last_access = Instant::now();

            let stale = slot.is_stale(self.shared.policy.stale_after());
            match slot.value.clone() {
                Some(value) if !stale => Action::Ready(value),
                Some(value) => {
                    if slot.inflight.is_none() {
                        CacheShared::start_background_refresh(&self.shared, slot, window_days);
                    }
                    Action::Ready(value)
                }
                None => match &slot.inflight {
                    Some(rx) => Action::Wait(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        slot.inflight = Some(rx);
                        Action::Lead(tx)
                    }
                },
            }
        };

        match action {
            Action::Ready(value) => Ok(value),
            Action::Wait(rx) => Self::await_refresh(rx).await,
            Action::Lead(tx) => {
                Arc::clone(&self.shared)
                    .run_refresh(window_days, tx)
                    .await
            }
        }
    }

    /// Force a refresh for a window, waiting for the fresh snapshot.
    ///
    /// Joins an already in-flight refresh instead of issuing a duplicate
    /// fetch. On failure the last-known-good value stays cached.
    pub async fn refresh(&self, window_days: u32) -> Result<Arc<CacheEntry>> {
        let action = {
            let mut slots = self.shared.slots.lock().unwrap();
            let slot = slots.entry(window_days).or_insert_with(Slot::new);
            slot.last_access = Instant::now();

            match &slot.inflight {
                Some(rx) => Action::Wait(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    slot.inflight = Some(rx);
                    Action::Lead(tx)
                }
            }
        };

        match action {
            Action::Ready(_) => unreachable!("refresh never takes the ready path"),
            Action::Wait(rx) => Self::await_refresh(rx).await,
            Action::Lead(tx) => {
                Arc::clone(&self.shared)
                    .run_refresh(window_days, tx)
                    .await
            }
        }
    }

    /// Register an active consumer for a window.
    ///
    /// While at least one subscription is alive, the maintenance task
    /// refreshes the window proactively and the slot is exempt from
    /// garbage collection.
    pub fn subscribe(&self, window_days: u32) -> CacheSubscription<S> {
        let mut slots = self.shared.slots.lock().unwrap();
        let slot = slots.entry(window_days).or_insert_with(Slot::new);
        slot.subscribers += 1;
        slot.last_access = Instant::now();
        CacheSubscription {
            shared: Arc::clone(&self.shared),
            window_days,
        }
    }

    /// Spawn the periodic maintenance task (proactive refresh + eviction).
    ///
    /// The task runs until the returned handle is aborted or dropped along
    /// with the runtime.
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let tick = maintenance_tick(&shared.policy);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                CacheShared::maintain(&shared);
            }
        })
    }

    async fn await_refresh(mut rx: RefreshReceiver) -> Result<Arc<CacheEntry>> {
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if rx.changed().await.is_err() {
                // The refreshing task dropped its sender without a result.
                return Err(Error::SourceUnavailable(
                    "refresh aborted before completion".to_string(),
                ));
            }
        }
    }
}

impl<S: LogSource + 'static> CacheShared<S> {
    /// Start a refresh that nobody waits on inline. The slot's in-flight
    /// receiver must be empty; the caller holds the lock.
    fn start_background_refresh(shared: &Arc<Self>, slot: &mut Slot, window_days: u32) {
        let (tx, rx) = watch::channel(None);
        slot.inflight = Some(rx);
        let shared = Arc::clone(shared);
        tokio::spawn(async move {
            if let Err(e) = shared.run_refresh(window_days, tx).await {
                tracing::warn!(window_days, error = %e, "Background refresh failed");
            }
        });
    }

    /// Run one refresh for a key and publish the outcome to all waiters.
    async fn run_refresh(
        self: Arc<Self>,
        window_days: u32,
        tx: watch::Sender<Option<RefreshResult>>,
    ) -> Result<Arc<CacheEntry>> {
        let result = self
            .refresh_with_retry(window_days)
            .await
            .map(Arc::new);

        {
            let mut slots = self.slots.lock().unwrap();
            if let Some(slot) = slots.get_mut(&window_days) {
                slot.inflight = None;
                if let Ok(entry) = &result {
                    slot.value = Some(Arc::clone(entry));
                    slot.fetched_at = Some(Instant::now());
                }
                // On failure the previous value, if any, stays.
            }
        }

        let _ = tx.send(Some(result.clone()));
        result
    }

    /// Fetch, classify and aggregate one window, retrying transient
    /// failures with exponential backoff.
    async fn refresh_with_retry(&self, window_days: u32) -> Result<CacheEntry> {
        let mut delay = self.policy.retry_base_delay();
        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                tracing::debug!(
                    window_days,
                    attempt,
                    max_attempts = self.policy.max_retries + 1,
                    ?delay,
                    "Retrying window refresh"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, self.policy.retry_max_delay());
            }

            match self.build_entry(window_days).await {
                Ok(entry) => return Ok(entry),
                Err(e) if e.can_retry() => {
                    tracing::warn!(window_days, error = %e, "Transient error refreshing window");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::SourceUnavailable("max retries exceeded".to_string())))
    }

    async fn build_entry(&self, window_days: u32) -> Result<CacheEntry> {
        let outcome = self.fetcher.fetch_window(window_days).await?;

        let entries: Vec<ClassifiedEntry> = outcome
            .entries
            .iter()
            .map(|raw| self.catalog.process(raw))
            .collect();
        let statistics: Statistics = analytics::aggregate(&entries);

        tracing::info!(
            window_days,
            total = statistics.total,
            was_limited = outcome.was_limited,
            "Window refreshed"
        );

        Ok(CacheEntry {
            raw_entries: outcome.entries,
            entries,
            statistics,
            requested_window_days: outcome.requested_window_days,
            actual_window_days: outcome.actual_window_days,
            was_limited: outcome.was_limited,
            limit_reason: outcome.limit_reason,
            refreshed_at: Utc::now(),
        })
    }

    /// One maintenance pass: evict idle unreferenced slots and refresh
    /// subscribed windows that have aged past the refresh interval.
    fn maintain(shared: &Arc<Self>) {
        let gc_after = shared.policy.gc_after();
        let refresh_interval = shared.policy.refresh_interval();

        let mut slots = shared.slots.lock().unwrap();

        slots.retain(|window_days, slot| {
            let evict = slot.subscribers == 0
                && slot.inflight.is_none()
                && slot.last_access.elapsed() > gc_after;
            if evict {
                tracing::debug!(window_days, "Evicting idle cache slot");
            }
            !evict
        });

        let due: Vec<u32> = slots
            .iter()
            .filter(|(_, slot)| {
                slot.subscribers > 0
                    && slot.inflight.is_none()
                    && slot
                        .fetched_at
                        .map(|at| at.elapsed() >= refresh_interval)
                        .unwrap_or(false)
            })
            .map(|(window_days, _)| *window_days)
            .collect();

        for window_days in due {
            if let Some(slot) = slots.get_mut(&window_days) {
                tracing::debug!(window_days, "Proactive refresh of subscribed window");
                Self::start_background_refresh(shared, slot, window_days);
            }
        }
    }
}

/// Marks a window as actively consumed until dropped.
pub struct CacheSubscription<S> {
    shared: Arc<CacheShared<S>>,
    window_days: u32,
}

impl<S> CacheSubscription<S> {
    pub fn window_days(&self) -> u32 {
        self.window_days
    }
}

impl<S> Drop for CacheSubscription<S> {
    fn drop(&mut self) {
        let mut slots = self.shared.slots.lock().unwrap();
        if let Some(slot) = slots.get_mut(&self.window_days) {
            slot.subscribers = slot.subscribers.saturating_sub(1);
            slot.last_access = Instant::now();
        }
    }
}

fn maintenance_tick(policy: &CacheConfig) -> Duration {
    (policy.refresh_interval() / 4)
        .max(Duration::from_secs(1))
        .min(Duration::from_secs(30))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::source::PageQuery;

    /// Counts calls; optionally fails the first N of them.
    struct CountingSource {
        calls: AtomicUsize,
        fail_first: usize,
        error: Error,
    }

    impl CountingSource {
        fn new() -> Self {
            Self::failing(0, Error::SourceUnavailable("unused".to_string()))
        }

        fn failing(fail_first: usize, error: Error) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first,
                error,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LogSource for CountingSource {
        async fn fetch_page(&self, _query: &PageQuery) -> Result<Vec<RawLogEntry>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            // Simulate a round-trip so concurrent callers overlap.
            tokio::time::sleep(Duration::from_millis(10)).await;
            if call < self.fail_first {
                return Err(self.error.clone());
            }
            Ok(vec![RawLogEntry {
                id: call as i64,
                date: Utc::now(),
                level: 1,
                message: "db timeout".to_string(),
                domain_type: "system".to_string(),
                domain_id: 0,
                actor_id: crate::types::SYSTEM_ACTOR,
                simulated_actor_id: None,
            }])
        }
    }

    fn cache_over(source: Arc<CountingSource>) -> LogCache<CountingSource> {
        let fetch = FetchConfig {
            page_delay_ms: 0,
            ..Default::default()
        };
        LogCache::new(source, RuleCatalog::standard(), fetch, CacheConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_get_fetches_and_classifies() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        let entry = cache.get(3).await.unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(entry.statistics.total, 1);
        assert_eq!(entry.statistics.system_errors, 1);
        assert_eq!(entry.requested_window_days, 3);
        assert!(!entry.was_limited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_value_served_without_refetch() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        cache.get(3).await.unwrap();
        cache.get(3).await.unwrap();
        cache.get(3).await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_windows_fetch_independently() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        cache.get(3).await.unwrap();
        cache.get(7).await.unwrap();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_served_while_revalidating() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        let first = cache.get(3).await.unwrap();

        // Age the slot past the stale duration.
        tokio::time::advance(Duration::from_secs(21)).await;

        let stale = cache.get(3).await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));

        // Let the background refresh finish.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 2);

        let refreshed = cache.get(3).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_gets_share_one_fetch() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        let (a, b) = tokio::join!(cache.get(3), cache.get(3));
        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient_failures() {
        let source = Arc::new(CountingSource::failing(
            2,
            Error::SourceError {
                status: 503,
                message: "maintenance".to_string(),
            },
        ));
        let cache = cache_over(Arc::clone(&source));

        let entry = cache.get(3).await.unwrap();
        assert_eq!(entry.statistics.total, 1);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_failure_propagates_without_slot_value() {
        let source = Arc::new(CountingSource::failing(
            1,
            Error::Unauthorized("session expired".to_string()),
        ));
        let cache = cache_over(Arc::clone(&source));

        let err = cache.get(3).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));
        assert_eq!(source.calls(), 1);

        // No value was cached for the key.
        let slots = cache.shared.slots.lock().unwrap();
        assert!(slots.get(&3).unwrap().value.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_preserves_last_known_good() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        let good = cache.get(3).await.unwrap();

        let failing = Arc::new(CountingSource::failing(
            usize::MAX,
            Error::Unauthorized("session expired".to_string()),
        ));
        let failing_cache = LogCache::new(
            Arc::clone(&failing),
            RuleCatalog::standard(),
            FetchConfig {
                page_delay_ms: 0,
                ..Default::default()
            },
            CacheConfig::default(),
        );
        // Seed the failing cache with a good value by copying the slot.
        {
            let mut slots = failing_cache.shared.slots.lock().unwrap();
            let mut slot = Slot::new();
            slot.value = Some(Arc::clone(&good));
            slot.fetched_at = Some(Instant::now());
            slots.insert(3, slot);
        }

        let err = failing_cache.refresh(3).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        // The stale value is still served.
        let kept = failing_cache.get(3).await.unwrap();
        assert!(Arc::ptr_eq(&good, &kept));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gc_evicts_unreferenced_slots() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        cache.get(3).await.unwrap();
        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        CacheShared::maintain(&cache.shared);

        let slots = cache.shared.slots.lock().unwrap();
        assert!(slots.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_blocks_eviction_and_drives_refresh() {
        let source = Arc::new(CountingSource::new());
        let cache = cache_over(Arc::clone(&source));

        let sub = cache.subscribe(3);
        cache.get(3).await.unwrap();
        assert_eq!(source.calls(), 1);

        // Past both the gc and refresh thresholds.
        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        CacheShared::maintain(&cache.shared);

        {
            let slots = cache.shared.slots.lock().unwrap();
            assert!(slots.contains_key(&3), "subscribed slot must survive gc");
        }

        // The maintenance pass kicked off a proactive refresh.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), 2);

        drop(sub);
        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        CacheShared::maintain(&cache.shared);
        let slots = cache.shared.slots.lock().unwrap();
        assert!(slots.is_empty());
    }
}
