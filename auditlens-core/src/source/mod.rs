//! Abstract log source and its HTTP implementation.
//!
//! The bounded fetcher and the cache are written against the [`LogSource`]
//! trait so tests can drive them with a scripted in-memory source.

pub mod http;

pub use http::HttpLogSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::RawLogEntry;

/// Optional upstream filters forwarded with every page request.
///
/// These narrow the query server-side; they are distinct from the pure
/// post-filters applied to already-classified entries.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Substring the upstream matches against the message
    pub message: Option<String>,
    /// Restrict to specific raw severity levels
    pub levels: Vec<i64>,
    /// Upper bound on the entry timestamp
    pub before: Option<DateTime<Utc>>,
    /// Restrict to entries triggered by one actor
    pub actor_id: Option<i64>,
}

impl QueryFilter {
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.levels.is_empty()
            && self.before.is_none()
            && self.actor_id.is_none()
    }
}

/// One page request against the upstream log endpoint.
#[derive(Debug, Clone)]
pub struct PageQuery {
    /// Lower bound on the entry timestamp
    pub after: DateTime<Utc>,
    /// 1-based page number
    pub page: u32,
    /// Requested page size
    pub limit: u32,
    /// Upstream filter pass-through
    pub filter: QueryFilter,
}

/// A paged query endpoint yielding raw log entries, newest first.
///
/// No server-side total count is available; end of data is inferred from
/// short-page detection by the caller.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Fetch a single page of entries.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawLogEntry>>;
}
