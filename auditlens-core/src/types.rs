//! Core domain types for auditlens
//!
//! These types represent the canonical data model that normalizes the
//! upstream activity log into categorized, display-ready entries.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Entry** | One unit of upstream activity/audit data |
//! | **Category** | The closed classification label assigned to an entry |
//! | **Rule** | A prioritized, named predicate that assigns a category |
//! | **Window** | The requested/actual time span covered by a fetch |
//! | **Actor** | The account that triggered an entry; `-1` means the system itself |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved actor id denoting a system-generated entry.
pub const SYSTEM_ACTOR: i64 = -1;

// ============================================
// Raw entries (wire format)
// ============================================

/// One activity log entry as returned by the upstream API.
///
/// Immutable once received; the raw severity `level` is a small integer
/// (1 = warning, 2 = notice, 3 = info) but unknown values are preserved
/// rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogEntry {
    /// Upstream-assigned entry id
    pub id: i64,
    /// When the entry was produced
    pub date: DateTime<Utc>,
    /// Raw severity level (1 = warning, 2 = notice, 3 = info)
    pub level: i64,
    /// Free-text message
    pub message: String,
    /// Subsystem that produced the entry (e.g. "login", "system", "mail")
    #[serde(default)]
    pub domain_type: String,
    /// Context-specific id within the producing subsystem
    #[serde(default)]
    pub domain_id: i64,
    /// Actor that triggered the entry; [`SYSTEM_ACTOR`] for the system itself
    #[serde(default)]
    pub actor_id: i64,
    /// Present when an administrator acted on behalf of another actor
    #[serde(default)]
    pub simulated_actor_id: Option<i64>,
}

// ============================================
// Categories
// ============================================

/// Closed set of semantic categories an entry can be assigned to.
///
/// Exactly one category per entry; [`Category::Other`] is the universal
/// fallback and never fails to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SystemError,
    FailedLogin,
    EmailSent,
    SuccessfulLogin,
    PersonViewed,
    Other,
}

impl Category {
    /// Returns the identifier used in filters and serialized output
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::SystemError => "system_error",
            Category::FailedLogin => "failed_login",
            Category::EmailSent => "email_sent",
            Category::SuccessfulLogin => "successful_login",
            Category::PersonViewed => "person_viewed",
            Category::Other => "other",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "system_error" => Ok(Category::SystemError),
            "failed_login" => Ok(Category::FailedLogin),
            "email_sent" => Ok(Category::EmailSent),
            "successful_login" => Ok(Category::SuccessfulLogin),
            "person_viewed" => Ok(Category::PersonViewed),
            "other" => Ok(Category::Other),
            _ => Err(format!("unknown category: {}", s)),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Display severity
// ============================================

/// Severity used for display, derived from the category rather than the
/// raw level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplaySeverity {
    Info,
    Warning,
    Error,
    Success,
}

impl DisplaySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplaySeverity::Info => "info",
            DisplaySeverity::Warning => "warning",
            DisplaySeverity::Error => "error",
            DisplaySeverity::Success => "success",
        }
    }

    /// Fallback mapping from the raw severity level, used only for entries
    /// that land in [`Category::Other`].
    pub fn from_raw_level(level: i64) -> Self {
        match level {
            1 => DisplaySeverity::Error,
            _ => DisplaySeverity::Info,
        }
    }
}

impl std::fmt::Display for DisplaySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================
// Classified entries
// ============================================

/// A raw entry combined with its resolved category and derived display
/// fields. Created once by the rule engine; never mutated afterward.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedEntry {
    /// Upstream entry id
    pub id: i64,
    /// Display severity derived from the category
    pub severity: DisplaySeverity,
    /// Resolved category
    pub category: Category,
    /// Original free-text message
    pub message: String,
    /// Synthesized detail string, when any detail part applies
    pub detail: Option<String>,
    /// Producing subsystem, or "System" when the upstream left it blank
    pub source: String,
    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
    /// Actor shown to the consumer; None for system-generated entries
    pub display_actor_id: Option<i64>,
    /// Raw actor id including the system sentinel
    pub actor_id: i64,
    /// Present when an administrator acted on behalf of another actor
    pub simulated_actor_id: Option<i64>,
    /// Raw severity level as received
    pub original_level: i64,
    /// Raw domain type as received
    pub domain_type: String,
    /// Raw domain id as received
    pub domain_id: i64,
}

// ============================================
// Statistics
// ============================================

/// Fixed-shape aggregate over a classified result set.
///
/// One counter per non-fallback category; entries in [`Category::Other`]
/// are reflected only in `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total: usize,
    pub system_errors: usize,
    pub failed_logins: usize,
    pub emails_sent: usize,
    pub successful_logins: usize,
    pub persons_viewed: usize,
}

impl Statistics {
    /// Counter for a specific category; None for [`Category::Other`], which
    /// has no dedicated counter.
    pub fn count_for(&self, category: Category) -> Option<usize> {
        match category {
            Category::SystemError => Some(self.system_errors),
            Category::FailedLogin => Some(self.failed_logins),
            Category::EmailSent => Some(self.emails_sent),
            Category::SuccessfulLogin => Some(self.successful_logins),
            Category::PersonViewed => Some(self.persons_viewed),
            Category::Other => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_round_trip() {
        for category in [
            Category::SystemError,
            Category::FailedLogin,
            Category::EmailSent,
            Category::SuccessfulLogin,
            Category::PersonViewed,
            Category::Other,
        ] {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
        assert!("nonsense".parse::<Category>().is_err());
    }

    #[test]
    fn test_raw_level_fallback_mapping() {
        assert_eq!(DisplaySeverity::from_raw_level(1), DisplaySeverity::Error);
        assert_eq!(DisplaySeverity::from_raw_level(2), DisplaySeverity::Info);
        assert_eq!(DisplaySeverity::from_raw_level(3), DisplaySeverity::Info);
        assert_eq!(DisplaySeverity::from_raw_level(99), DisplaySeverity::Info);
    }

    #[test]
    fn test_raw_entry_wire_names() {
        let json = r#"{
            "id": 42,
            "date": "2026-07-01T10:30:00Z",
            "level": 2,
            "message": "settings updated",
            "domainType": "settings",
            "domainId": 7,
            "actorId": 12,
            "simulatedActorId": 99
        }"#;
        let entry: RawLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, 42);
        assert_eq!(entry.level, 2);
        assert_eq!(entry.domain_type, "settings");
        assert_eq!(entry.actor_id, 12);
        assert_eq!(entry.simulated_actor_id, Some(99));
    }

    #[test]
    fn test_raw_entry_missing_optional_fields() {
        let json = r#"{
            "id": 1,
            "date": "2026-07-01T10:30:00Z",
            "level": 3,
            "message": "ping"
        }"#;
        let entry: RawLogEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.domain_type, "");
        assert_eq!(entry.domain_id, 0);
        assert_eq!(entry.actor_id, 0);
        assert_eq!(entry.simulated_actor_id, None);
    }

    #[test]
    fn test_statistics_count_for() {
        let stats = Statistics {
            total: 10,
            system_errors: 2,
            failed_logins: 3,
            ..Default::default()
        };
        assert_eq!(stats.count_for(Category::SystemError), Some(2));
        assert_eq!(stats.count_for(Category::FailedLogin), Some(3));
        assert_eq!(stats.count_for(Category::EmailSent), Some(0));
        assert_eq!(stats.count_for(Category::Other), None);
    }
}
