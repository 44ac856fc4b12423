//! # auditlens-core
//!
//! Core library for auditlens - a bounded ingestion and classification
//! pipeline over an upstream activity/audit log.
//!
//! This library provides:
//! - Domain types for raw entries, categories, and statistics
//! - A priority-ordered rule engine assigning one category per entry
//! - A bounded, paginated fetcher with adaptive window narrowing
//! - A stale-while-revalidate cache with client-side pagination
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through four stages:
//! - **Source:** paged HTTP endpoint yielding raw entries, newest first
//! - **Fetcher:** sequential page loop enforcing volume and page caps
//! - **Rule engine:** classification plus derived display fields
//! - **Cache:** per-window snapshots with freshness-driven refresh
//!
//! ## Example
//!
//! ```rust,no_run
//! use auditlens_core::{Config, LogCache};
//!
//! # async fn example() -> auditlens_core::Result<()> {
//! let config = Config::load()?;
//! let cache = LogCache::from_config(&config)?;
//!
//! let window = cache.get(3).await?;
//! println!("{} entries, {} system errors",
//!     window.statistics.total, window.statistics.system_errors);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use cache::{CacheEntry, CacheSubscription, LogCache};
pub use classify::{ClassificationRule, Predicate, RuleCatalog};
pub use config::Config;
pub use error::{Error, Result};
pub use fetch::{BoundedFetcher, FetchOutcome};
pub use source::{HttpLogSource, LogSource, PageQuery, QueryFilter};
pub use types::*;

// Public modules
pub mod analytics;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod source;
pub mod types;
