use std::sync::OnceLock;

use clap::ValueEnum;
use regex::Regex;
use serde::Serialize;

use crate::result::EvaluationResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub name: String,
    pub value: usize,
}

/// Jurisdiction bucket encoded in a rule id such as `state:CA:ccpa`.
pub fn jurisdiction_from_rule_id(rule_id: &str) -> String {
    let lower = rule_id.to_ascii_lowercase();
    if lower.starts_with("federal") {
        return "Federal".to_string();
    }
    if lower.starts_with("state:") {
        let code = rule_id
            .split(':')
            .nth(1)
            .map(|code| code.trim().to_ascii_uppercase())
            .unwrap_or_default();
        if code.is_empty() {
            return "State".to_string();
        }
        return format!("State ({code})");
    }
    if lower.starts_with("city:") {
        return "City".to_string();
    }
    "General".to_string()
}

fn category_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                "Employment",
                r"wage|overtime|employee|osha|eeoc|i-9|form i-9|paid leave|workers' comp|workers comp|unemployment",
            ),
            (
                "Privacy",
                r"privacy|ccpa|cpra|gdpr|hipaa|phi|ferpa|biometric|bipa|ssn|coppa|children",
            ),
            ("Tax", r"sales tax|tax|withholding|nexus"),
            ("Licensing", r"alcohol|food|permit|license|health department"),
        ]
        .into_iter()
        .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
        .collect()
    })
}

/// Topic bucket for an obligation or rule title, by keyword.
pub fn categorize(title: &str) -> &'static str {
    let lower = title.to_lowercase();
    category_patterns()
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(name, _)| *name)
        .unwrap_or("General")
}

/// Obligation grouping used by `summarize_by`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    #[default]
    Jurisdiction,
    Category,
}

/// Narrows the obligations counted by `summarize_by`. Names compare
/// case-insensitively against `jurisdiction_from_rule_id` and `categorize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObligationFilter {
    pub jurisdiction: Option<String>,
    pub category: Option<String>,
}

impl ObligationFilter {
    fn admits(&self, jurisdiction: &str, category: &str) -> bool {
        let matches = |wanted: &Option<String>, actual: &str| {
            wanted
                .as_deref()
                .is_none_or(|wanted| wanted.trim().eq_ignore_ascii_case(actual))
        };
        matches(&self.jurisdiction, jurisdiction) && matches(&self.category, category)
    }
}

/// Obligation counts per jurisdiction, in order of first appearance.
pub fn summarize(result: Option<&EvaluationResult>) -> Vec<GroupCount> {
    summarize_by(result, GroupBy::Jurisdiction, &ObligationFilter::default())
}

/// Obligation counts per jurisdiction or category, in order of first
/// appearance. Obligations without a rule id are skipped.
pub fn summarize_by(
    result: Option<&EvaluationResult>,
    group_by: GroupBy,
    filter: &ObligationFilter,
) -> Vec<GroupCount> {
    let mut counts: Vec<GroupCount> = Vec::new();
    let Some(result) = result else {
        return counts;
    };

    for obligation in &result.obligations {
        let Some(rule_id) = obligation.rule_id.as_deref() else {
            continue;
        };
        let jurisdiction = jurisdiction_from_rule_id(rule_id);
        let category = categorize(obligation.title.as_deref().unwrap_or_default());
        if !filter.admits(&jurisdiction, category) {
            continue;
        }

        let name = match group_by {
            GroupBy::Jurisdiction => jurisdiction,
            GroupBy::Category => category.to_string(),
        };
        match counts.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => entry.value += 1,
            None => counts.push(GroupCount { name, value: 1 }),
        }
    }
    counts
}
