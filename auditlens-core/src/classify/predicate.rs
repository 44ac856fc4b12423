//! Predicate primitives for classification rules.
//!
//! Predicates are pure data: evaluating one against an entry has no side
//! effects, and composition (`all`/`any`) nests arbitrarily. Keywords are
//! lowercased at construction so matching stays case-insensitive without
//! re-allocating per entry.

use crate::types::RawLogEntry;

/// A condition over a raw log entry.
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Every inner predicate must hold
    All(Vec<Predicate>),
    /// At least one inner predicate must hold
    Any(Vec<Predicate>),
    /// Message contains at least one keyword (case-insensitive)
    MessageContains(Vec<String>),
    /// Domain type contains at least one keyword (case-insensitive)
    DomainTypeContains(Vec<String>),
    /// Raw severity level equals the given value
    LevelIs(i64),
    /// Matches nothing; used by the fallback rule
    Never,
}

impl Predicate {
    pub fn all(inner: Vec<Predicate>) -> Self {
        Predicate::All(inner)
    }

    pub fn any(inner: Vec<Predicate>) -> Self {
        Predicate::Any(inner)
    }

    pub fn message_contains(keywords: &[&str]) -> Self {
        Predicate::MessageContains(lowercased(keywords))
    }

    pub fn domain_type_contains(keywords: &[&str]) -> Self {
        Predicate::DomainTypeContains(lowercased(keywords))
    }

    pub fn level_is(level: i64) -> Self {
        Predicate::LevelIs(level)
    }

    /// Evaluate this predicate against an entry.
    pub fn matches(&self, entry: &RawLogEntry) -> bool {
        match self {
            Predicate::All(inner) => inner.iter().all(|p| p.matches(entry)),
            Predicate::Any(inner) => inner.iter().any(|p| p.matches(entry)),
            Predicate::MessageContains(keywords) => {
                let message = entry.message.to_lowercase();
                keywords.iter().any(|k| message.contains(k.as_str()))
            }
            Predicate::DomainTypeContains(keywords) => {
                let domain_type = entry.domain_type.to_lowercase();
                keywords.iter().any(|k| domain_type.contains(k.as_str()))
            }
            Predicate::LevelIs(level) => entry.level == *level,
            Predicate::Never => false,
        }
    }
}

fn lowercased(keywords: &[&str]) -> Vec<String> {
    keywords.iter().map(|k| k.to_lowercase()).collect()
}
