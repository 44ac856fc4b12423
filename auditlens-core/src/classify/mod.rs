//! Rule engine: assigns each raw entry exactly one category.
//!
//! The catalog is an explicitly constructed, immutable object. Every rule's
//! predicate is evaluated against the entry; among the matching rules the
//! highest priority wins, with ties resolved in favor of the
//! earlier-declared rule. The fallback rule carries a never-matching
//! predicate, so it applies only when nothing else does.

pub mod predicate;

pub use predicate::Predicate;

use crate::types::{
    Category, ClassifiedEntry, DisplaySeverity, RawLogEntry, SYSTEM_ACTOR,
};

/// Delimiter between synthesized detail parts.
const DETAIL_SEPARATOR: &str = " | ";

/// Presentation metadata attached to a rule.
#[derive(Debug, Clone, Copy)]
pub struct RuleDisplay {
    pub display_name: &'static str,
    pub icon: &'static str,
    pub css_class: &'static str,
}

/// A prioritized, named predicate that assigns a category when matched.
///
/// Rules form a static, read-only catalog; there is no create/update/delete
/// lifecycle at runtime.
#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub category: Category,
    pub priority: u32,
    predicate: Predicate,
    pub description: &'static str,
    pub display: RuleDisplay,
}

impl ClassificationRule {
    pub fn new(
        category: Category,
        priority: u32,
        predicate: Predicate,
        description: &'static str,
        display: RuleDisplay,
    ) -> Self {
        Self {
            category,
            priority,
            predicate,
            description,
            display,
        }
    }

    /// Whether this rule's predicate holds for the entry.
    pub fn matches(&self, entry: &RawLogEntry) -> bool {
        self.predicate.matches(entry)
    }
}

/// Priority-ordered rule catalog.
pub struct RuleCatalog {
    rules: Vec<ClassificationRule>,
}

impl RuleCatalog {
    /// Build a catalog from an explicit rule list. Declaration order is the
    /// tie-break order for equal priorities.
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self { rules }
    }

    /// The canonical catalog.
    pub fn standard() -> Self {
        Self::new(vec![
            ClassificationRule::new(
                Category::FailedLogin,
                100,
                Predicate::all(vec![
                    Predicate::message_contains(&["Username or password"]),
                    Predicate::domain_type_contains(&["login"]),
                ]),
                "Failed login attempts",
                RuleDisplay {
                    display_name: "Login failures",
                    icon: "\u{1F512}",
                    css_class: "category-warning",
                },
            ),
            ClassificationRule::new(
                Category::SuccessfulLogin,
                90,
                Predicate::all(vec![
                    Predicate::message_contains(&["Erfolgreich angemeldet"]),
                    Predicate::domain_type_contains(&["login"]),
                ]),
                "Successful sign-ins",
                RuleDisplay {
                    display_name: "Sign-ins",
                    icon: "\u{2705}",
                    css_class: "category-success",
                },
            ),
            ClassificationRule::new(
                Category::SystemError,
                80,
                Predicate::all(vec![
                    Predicate::level_is(1),
                    Predicate::domain_type_contains(&["system"]),
                ]),
                "System errors and exceptions",
                RuleDisplay {
                    display_name: "System errors",
                    icon: "\u{1F6A8}",
                    css_class: "category-error",
                },
            ),
            ClassificationRule::new(
                Category::EmailSent,
                70,
                Predicate::all(vec![
                    Predicate::any(vec![
                        Predicate::domain_type_contains(&["mail", "email"]),
                        Predicate::message_contains(&["mail", "email"]),
                    ]),
                    Predicate::message_contains(&["Speichere Mail an"]),
                ]),
                "Outgoing emails",
                RuleDisplay {
                    display_name: "Emails",
                    icon: "\u{1F4E7}",
                    css_class: "category-info",
                },
            ),
            ClassificationRule::new(
                Category::PersonViewed,
                60,
                Predicate::all(vec![
                    Predicate::level_is(3),
                    Predicate::message_contains(&["getPersonDetails"]),
                ]),
                "Person profiles viewed",
                RuleDisplay {
                    display_name: "Persons viewed",
                    icon: "\u{1F464}",
                    css_class: "category-info",
                },
            ),
            ClassificationRule::new(
                Category::Other,
                10,
                Predicate::Never,
                "Everything else",
                RuleDisplay {
                    display_name: "Other",
                    icon: "\u{2139}\u{FE0F}",
                    css_class: "category-neutral",
                },
            ),
        ])
    }

    /// Assign exactly one category to an entry.
    ///
    /// Highest matching priority wins; ties go to the earlier-declared rule.
    /// When no rule matches, the fallback category applies.
    pub fn classify(&self, entry: &RawLogEntry) -> Category {
        let mut best: Option<&ClassificationRule> = None;
        for rule in &self.rules {
            if !rule.matches(entry) {
                continue;
            }
            // Strictly-greater comparison keeps the first-declared rule on
            // equal priorities.
            match best {
                Some(current) if rule.priority <= current.priority => {}
                _ => best = Some(rule),
            }
        }
        best.map(|rule| rule.category).unwrap_or(Category::Other)
    }

    /// Classify an entry and derive its display fields.
    pub fn process(&self, entry: &RawLogEntry) -> ClassifiedEntry {
        let category = self.classify(entry);

        let source = if entry.domain_type.is_empty() {
            "System".to_string()
        } else {
            entry.domain_type.clone()
        };

        let display_actor_id = match entry.actor_id {
            0 | SYSTEM_ACTOR => None,
            id => Some(id),
        };

        ClassifiedEntry {
            id: entry.id,
            severity: display_severity(category, entry.level),
            category,
            message: entry.message.clone(),
            detail: entry_detail(entry),
            source,
            timestamp: entry.date,
            display_actor_id,
            actor_id: entry.actor_id,
            simulated_actor_id: entry.simulated_actor_id,
            original_level: entry.level,
            domain_type: entry.domain_type.clone(),
            domain_id: entry.domain_id,
        }
    }

    /// The rule that owns a category, if any.
    pub fn rule_for(&self, category: Category) -> Option<&ClassificationRule> {
        self.rules.iter().find(|rule| rule.category == category)
    }

    /// All categories in declaration order.
    pub fn categories(&self) -> Vec<Category> {
        self.rules.iter().map(|rule| rule.category).collect()
    }

    /// Display name for a category, falling back to its identifier.
    pub fn display_name(&self, category: Category) -> &str {
        self.rule_for(category)
            .map(|rule| rule.display.display_name)
            .unwrap_or_else(|| category.as_str())
    }

    /// Icon glyph for a category.
    pub fn icon(&self, category: Category) -> &'static str {
        self.rule_for(category)
            .map(|rule| rule.display.icon)
            .unwrap_or("\u{2139}\u{FE0F}")
    }

    /// Style class for a category.
    pub fn css_class(&self, category: Category) -> &'static str {
        self.rule_for(category)
            .map(|rule| rule.display.css_class)
            .unwrap_or("category-neutral")
    }
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

/// Display severity for a category.
///
/// Only [`Category::Other`] falls back to the raw-level mapping.
pub fn display_severity(category: Category, raw_level: i64) -> DisplaySeverity {
    match category {
        Category::SystemError => DisplaySeverity::Error,
        Category::FailedLogin => DisplaySeverity::Warning,
        Category::EmailSent => DisplaySeverity::Info,
        Category::SuccessfulLogin => DisplaySeverity::Success,
        Category::PersonViewed => DisplaySeverity::Info,
        Category::Other => DisplaySeverity::from_raw_level(raw_level),
    }
}

/// Synthesize the detail string for an entry.
///
/// Parts, in order: "<domainType> ID: <domainId>" when both are present,
/// the simulating actor when present, and a system-generated marker when
/// the actor is the reserved sentinel. None when no part applies.
pub fn entry_detail(entry: &RawLogEntry) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();

    if !entry.domain_type.is_empty() && entry.domain_id != 0 {
        parts.push(format!("{} ID: {}", entry.domain_type, entry.domain_id));
    }

    if let Some(simulated) = entry.simulated_actor_id {
        if simulated != 0 {
            parts.push(format!("Simulated by actor ID: {}", simulated));
        }
    }

    if entry.actor_id == SYSTEM_ACTOR {
        parts.push("System-generated".to_string());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(DETAIL_SEPARATOR))
    }
}
