//! Bounded, paginated retrieval from the log source.
//!
//! Pages are requested strictly in sequence, because the short-page
//! termination signal depends on observing each response before issuing the
//! next request. Three independent bounds stop the loop: a short page (end
//! of data), the hard volume cap, and a page-count ceiling guarding against
//! a misbehaving source.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::FetchConfig;
use crate::error::Result;
use crate::source::{LogSource, PageQuery, QueryFilter};
use crate::types::RawLogEntry;

/// Result of one bounded fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Raw entries, in upstream order (newest first)
    pub entries: Vec<RawLogEntry>,
    /// The window that was asked for
    pub requested_window_days: u32,
    /// The window actually covered; narrower than requested when the volume
    /// cap cut the fetch short
    pub actual_window_days: u32,
    /// Whether any bound cut the fetch short
    pub was_limited: bool,
    /// Human-readable reason when `was_limited` is set
    pub limit_reason: Option<String>,
}

/// Fetches a time window of entries page by page, enforcing caps.
pub struct BoundedFetcher<S> {
    source: Arc<S>,
    limits: FetchConfig,
}

impl<S: LogSource> BoundedFetcher<S> {
    pub fn new(source: Arc<S>, limits: FetchConfig) -> Self {
        Self { source, limits }
    }

    /// Fetch all entries of the last `window_days` days.
    pub async fn fetch_window(&self, window_days: u32) -> Result<FetchOutcome> {
        self.fetch_window_filtered(window_days, QueryFilter::default())
            .await
    }

    /// Fetch a window, forwarding an upstream filter with every page request.
    ///
    /// A failure on the first page propagates; a failure on a later page
    /// truncates to what was already gathered and reports the reason.
    pub async fn fetch_window_filtered(
        &self,
        window_days: u32,
        filter: QueryFilter,
    ) -> Result<FetchOutcome> {
        let now = Utc::now();
        let after = now - Duration::days(i64::from(window_days));

        let mut entries: Vec<RawLogEntry> = Vec::new();
        let mut page: u32 = 1;
        let mut was_limited = false;
        let mut limit_reason: Option<String> = None;
        let mut volume_capped = false;

        loop {
            let query = PageQuery {
                after,
                page,
                limit: self.limits.page_size,
                filter: filter.clone(),
            };

            let batch = match self.source.fetch_page(&query).await {
                Ok(batch) => batch,
                Err(e) if page == 1 => {
                    // No prior pages to salvage
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "Page fetch failed, truncating result");
                    was_limited = true;
                    limit_reason = Some(format!(
                        "Fetching stopped at page {} ({}); showing the {} entries gathered so far.",
                        page,
                        e,
                        entries.len()
                    ));
                    break;
                }
            };

            // A short page is the authoritative end-of-data signal.
            let short_page = batch.len() < self.limits.page_size as usize;
            entries.extend(batch);

            if entries.len() >= self.limits.max_entries {
                entries.truncate(self.limits.max_entries);
                was_limited = true;
                volume_capped = true;
                limit_reason = Some(format!(
                    "Too many entries for {} days; showing the newest {}.",
                    window_days, self.limits.max_entries
                ));
                break;
            }

            if short_page {
                break;
            }

            if page >= self.limits.max_pages {
                tracing::warn!(
                    pages = page,
                    "Page ceiling reached before end of data"
                );
                was_limited = true;
                limit_reason = Some(format!(
                    "Fetching stopped after {} pages; the source kept returning full pages.",
                    page
                ));
                break;
            }

            page += 1;

            // Pace successive page requests so the source is not hammered.
            tokio::time::sleep(self.limits.page_delay()).await;
        }

        let mut actual_window_days = window_days;

        // When the volume cap cut the fetch short, report the window that was
        // truly covered. The oldest timestamp is taken over the whole batch
        // rather than positionally, so an upstream that is not strictly
        // newest-first cannot skew the result.
        if volume_capped && window_days > 1 {
            if let Some(oldest) = entries.iter().map(|e| e.date).min() {
                let covered = days_spanned(oldest, now);
                if covered < window_days {
                    actual_window_days = covered;
                    limit_reason = Some(format!(
                        "Window reduced to {} days ({} of max {} entries).",
                        covered,
                        entries.len(),
                        self.limits.max_entries
                    ));
                }
            }
        }

        tracing::debug!(
            entries = entries.len(),
            pages = page,
            was_limited,
            actual_window_days,
            "Bounded fetch complete"
        );

        Ok(FetchOutcome {
            entries,
            requested_window_days: window_days,
            actual_window_days,
            was_limited,
            limit_reason,
        })
    }
}

/// Days spanned between two instants, rounded up, never less than one.
fn days_spanned(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    let seconds = (to - from).num_seconds().max(0);
    let days = (seconds + 86_399) / 86_400;
    (days as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::error::Error;

    /// Serves a scripted sequence of page results.
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Vec<RawLogEntry>>>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<RawLogEntry>>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait]
    impl LogSource for ScriptedSource {
        async fn fetch_page(&self, _query: &PageQuery) -> Result<Vec<RawLogEntry>> {
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(vec![]))
        }
    }

    /// A source that returns full pages forever.
    struct EndlessSource;

    #[async_trait]
    impl LogSource for EndlessSource {
        async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawLogEntry>> {
            Ok((0..query.limit)
                .map(|i| entry(i64::from(query.page) * 1000 + i64::from(i), 0))
                .collect())
        }
    }

    fn entry(id: i64, age_hours: i64) -> RawLogEntry {
        RawLogEntry {
            id,
            date: Utc::now() - Duration::hours(age_hours),
            level: 2,
            message: format!("entry {}", id),
            domain_type: "test".to_string(),
            domain_id: 0,
            actor_id: 1,
            simulated_actor_id: None,
        }
    }

    fn limits() -> FetchConfig {
        FetchConfig {
            page_delay_ms: 0,
            ..Default::default()
        }
    }

    fn page_of(count: usize, first_id: i64) -> Vec<RawLogEntry> {
        (0..count).map(|i| entry(first_id + i as i64, 0)).collect()
    }

    #[tokio::test]
    async fn test_short_page_terminates() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(page_of(100, 0)),
            Ok(page_of(20, 100)),
        ]));
        let fetcher = BoundedFetcher::new(source, limits());

        let outcome = fetcher.fetch_window(3).await.unwrap();
        assert_eq!(outcome.entries.len(), 120);
        assert!(!outcome.was_limited);
        assert_eq!(outcome.actual_window_days, 3);
        assert!(outcome.limit_reason.is_none());
    }

    #[tokio::test]
    async fn test_empty_first_page() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![])]));
        let fetcher = BoundedFetcher::new(source, limits());

        let outcome = fetcher.fetch_window(3).await.unwrap();
        assert!(outcome.entries.is_empty());
        assert!(!outcome.was_limited);
    }

    #[tokio::test]
    async fn test_volume_cap_terminates_exactly() {
        let fetcher = BoundedFetcher::new(Arc::new(EndlessSource), limits());

        let outcome = fetcher.fetch_window(7).await.unwrap();
        assert_eq!(outcome.entries.len(), 5000);
        assert!(outcome.was_limited);
        assert!(outcome.limit_reason.is_some());
    }

    #[tokio::test]
    async fn test_volume_cap_narrows_window() {
        // All capped entries lie within the last day of a 7-day request.
        let pages: Vec<Result<Vec<RawLogEntry>>> = (0..50)
            .map(|p| {
                Ok((0..100)
                    .map(|i| entry(p * 100 + i, 3))
                    .collect::<Vec<_>>())
            })
            .collect();
        let fetcher = BoundedFetcher::new(Arc::new(ScriptedSource::new(pages)), limits());

        let outcome = fetcher.fetch_window(7).await.unwrap();
        assert!(outcome.was_limited);
        assert_eq!(outcome.actual_window_days, 1);
        assert_eq!(outcome.requested_window_days, 7);
        let reason = outcome.limit_reason.unwrap();
        assert!(reason.contains("reduced"), "unexpected reason: {}", reason);
    }

    #[tokio::test]
    async fn test_page_ceiling_stops_runaway_source() {
        let mut config = limits();
        config.max_entries = 1_000_000; // volume cap out of the way
        config.max_pages = 5;
        let fetcher = BoundedFetcher::new(Arc::new(EndlessSource), config);

        let outcome = fetcher.fetch_window(3).await.unwrap();
        assert_eq!(outcome.entries.len(), 500);
        assert!(outcome.was_limited);
    }

    #[tokio::test]
    async fn test_first_page_failure_propagates() {
        let source = Arc::new(ScriptedSource::new(vec![Err(Error::SourceUnavailable(
            "connection refused".to_string(),
        ))]));
        let fetcher = BoundedFetcher::new(source, limits());

        let err = fetcher.fetch_window(3).await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_later_page_failure_truncates() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(page_of(100, 0)),
            Err(Error::SourceError {
                status: 502,
                message: "bad gateway".to_string(),
            }),
        ]));
        let fetcher = BoundedFetcher::new(source, limits());

        let outcome = fetcher.fetch_window(3).await.unwrap();
        assert_eq!(outcome.entries.len(), 100);
        assert!(outcome.was_limited);
        assert!(outcome.limit_reason.unwrap().contains("page 2"));
    }

    #[test]
    fn test_days_spanned_rounds_up() {
        let now = Utc::now();
        assert_eq!(days_spanned(now - Duration::hours(1), now), 1);
        assert_eq!(days_spanned(now - Duration::hours(25), now), 2);
        assert_eq!(days_spanned(now - Duration::days(3), now), 3);
        // A clock skew into the future still reports one day
        assert_eq!(days_spanned(now + Duration::hours(1), now), 1);
    }
}
