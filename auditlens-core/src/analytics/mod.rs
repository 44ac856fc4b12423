//! Aggregate statistics and pure post-filters over classified entries.
//!
//! Everything here is a deterministic fold or filter: no IO, no state, and
//! no dependence on input order.

pub mod pagination;

pub use pagination::Paginator;

use crate::types::{Category, ClassifiedEntry, Statistics};

/// Fold a classified result set into its fixed-shape statistics.
///
/// Order-independent: shuffling the input never changes the counters.
/// Entries in [`Category::Other`] count only toward `total`.
pub fn aggregate(entries: &[ClassifiedEntry]) -> Statistics {
    let mut stats = Statistics {
        total: entries.len(),
        ..Default::default()
    };

    for entry in entries {
        match entry.category {
            Category::SystemError => stats.system_errors += 1,
            Category::FailedLogin => stats.failed_logins += 1,
            Category::EmailSent => stats.emails_sent += 1,
            Category::SuccessfulLogin => stats.successful_logins += 1,
            Category::PersonViewed => stats.persons_viewed += 1,
            Category::Other => {}
        }
    }

    stats
}

/// Keep only entries of one category.
pub fn filter_by_category(entries: &[ClassifiedEntry], category: Category) -> Vec<ClassifiedEntry> {
    entries
        .iter()
        .filter(|entry| entry.category == category)
        .cloned()
        .collect()
}

/// Free-text search over message, source, detail, and the display actor id.
///
/// Case-insensitive; a blank or whitespace-only term matches everything.
pub fn filter_by_search(entries: &[ClassifiedEntry], term: &str) -> Vec<ClassifiedEntry> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return entries.to_vec();
    }

    entries
        .iter()
        .filter(|entry| matches_search(entry, &term))
        .cloned()
        .collect()
}

fn matches_search(entry: &ClassifiedEntry, term: &str) -> bool {
    if entry.message.to_lowercase().contains(term) {
        return true;
    }
    if entry.source.to_lowercase().contains(term) {
        return true;
    }
    if let Some(detail) = &entry.detail {
        if detail.to_lowercase().contains(term) {
            return true;
        }
    }
    if let Some(actor_id) = entry.display_actor_id {
        if actor_id.to_string().contains(term) {
            return true;
        }
    }
    false
}
