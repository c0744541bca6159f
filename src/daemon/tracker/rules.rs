use regex::RegexBuilder;

use crate::daemon::storage::entities::{MatchKind, Rule};

/// Category attached to gaps with no qualifying user input.
pub const IDLE_CATEGORY: &str = "Idle";

/// Category for observations no rule claims.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Labels offered by the presentation layer when editing rules.
pub const DEFAULT_CATEGORIES: [&str; 8] = [
    "Work",
    "Social",
    "Video",
    "Gaming",
    "Reading",
    "Communication",
    IDLE_CATEGORY,
    FALLBACK_CATEGORY,
];

/// What a rule is matched against: one foreground observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppContext {
    pub process_name: String,
    pub window_title: String,
}

impl AppContext {
    pub fn new(process_name: impl Into<String>, window_title: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            window_title: window_title.into(),
        }
    }
}

/// A rule matches when every pattern it carries matches its field. A rule
/// with no patterns matches everything, which makes a low-priority catch-all
/// rule possible.
pub fn match_rule(rule: &Rule, context: &AppContext) -> bool {
    if !rule.enabled {
        return false;
    }
    let process_ok = match pattern_of(&rule.process_pattern) {
        Some(pattern) => matches_value(rule.match_kind, pattern, &context.process_name),
        None => true,
    };
    let title_ok = match pattern_of(&rule.title_pattern) {
        Some(pattern) => matches_value(rule.match_kind, pattern, &context.window_title),
        None => true,
    };
    process_ok && title_ok
}

/// Classifies an observation: the first matching rule in (priority, id)
/// order decides the category, otherwise [FALLBACK_CATEGORY]. Rows may
/// arrive in any order; the ordering happens here.
pub fn apply_rules(rules: &[Rule], context: &AppContext) -> String {
    let mut ordered: Vec<&Rule> = rules.iter().collect();
    ordered.sort_by_key(|rule| (rule.priority, rule.rule_id));
    ordered
        .into_iter()
        .find(|rule| match_rule(rule, context))
        .map(|rule| rule.category.clone())
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string())
}

/// An empty stored pattern means "no pattern".
fn pattern_of(pattern: &Option<String>) -> Option<&str> {
    pattern.as_deref().filter(|p| !p.is_empty())
}

fn matches_value(kind: MatchKind, pattern: &str, value: &str) -> bool {
    match kind {
        MatchKind::Regex => RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(value))
            // A pattern the user broke must never take classification down.
            .unwrap_or(false),
        MatchKind::Substring => value.to_lowercase().contains(&pattern.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use crate::daemon::storage::entities::{MatchKind, Rule};

    use super::{apply_rules, match_rule, AppContext, FALLBACK_CATEGORY};

    fn rule(
        rule_id: i64,
        enabled: bool,
        match_kind: MatchKind,
        process_pattern: Option<&str>,
        title_pattern: Option<&str>,
        category: &str,
        priority: i64,
    ) -> Rule {
        Rule {
            rule_id,
            enabled,
            match_kind,
            process_pattern: process_pattern.map(str::to_string),
            title_pattern: title_pattern.map(str::to_string),
            category: category.to_string(),
            priority,
        }
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let r = rule(1, true, MatchKind::Substring, Some("CHROME.exe"), None, "Video", 1);
        let context = AppContext::new("chrome.exe", "YouTube - Video");
        assert!(match_rule(&r, &context));
    }

    #[test]
    fn regex_matches_title() {
        let r = rule(1, true, MatchKind::Regex, None, Some("you ?tube"), "Video", 1);
        let context = AppContext::new("chrome.exe", "YouTube - Video");
        assert!(match_rule(&r, &context));
    }

    #[test]
    fn disabled_rule_never_matches() {
        let r = rule(1, false, MatchKind::Substring, Some("chrome.exe"), None, "Video", 1);
        let context = AppContext::new("chrome.exe", "YouTube");
        assert!(!match_rule(&r, &context));
    }

    #[test]
    fn both_patterns_must_match() {
        let r = rule(
            1,
            true,
            MatchKind::Substring,
            Some("chrome.exe"),
            Some("YouTube"),
            "Video",
            1,
        );
        assert!(match_rule(&r, &AppContext::new("chrome.exe", "YouTube - Cats")));
        assert!(!match_rule(&r, &AppContext::new("chrome.exe", "Docs")));
        assert!(!match_rule(&r, &AppContext::new("firefox", "YouTube - Cats")));
    }

    #[test]
    fn patternless_rule_matches_everything() {
        let r = rule(1, true, MatchKind::Substring, None, None, "Work", 99);
        assert!(match_rule(&r, &AppContext::new("anything", "at all")));
    }

    #[test]
    fn empty_pattern_text_counts_as_absent() {
        let r = rule(1, true, MatchKind::Substring, Some(""), Some(""), "Work", 1);
        assert!(match_rule(&r, &AppContext::new("anything", "at all")));
    }

    #[test]
    fn invalid_regex_is_a_non_match() {
        let r = rule(1, true, MatchKind::Regex, Some("(unclosed"), None, "Video", 1);
        assert!(!match_rule(&r, &AppContext::new("(unclosed", "title")));
    }

    #[test]
    fn lowest_priority_wins() {
        let rules = vec![
            rule(2, true, MatchKind::Substring, Some("chrome.exe"), None, "Work", 2),
            rule(
                1,
                true,
                MatchKind::Substring,
                Some("chrome.exe"),
                Some("YouTube"),
                "Video",
                1,
            ),
        ];
        let context = AppContext::new("chrome.exe", "YouTube - Video");
        assert_eq!(apply_rules(&rules, &context), "Video");
    }

    #[test]
    fn priority_tie_breaks_by_id() {
        let rules = vec![
            rule(7, true, MatchKind::Substring, Some("chrome.exe"), None, "Work", 3),
            rule(2, true, MatchKind::Substring, Some("chrome.exe"), None, "Video", 3),
        ];
        let context = AppContext::new("chrome.exe", "whatever");
        assert_eq!(apply_rules(&rules, &context), "Video");
    }

    #[test]
    fn no_match_falls_back_to_other() {
        let rules = vec![rule(
            1,
            true,
            MatchKind::Substring,
            Some("chrome.exe"),
            None,
            "Video",
            1,
        )];
        let context = AppContext::new("code.exe", "main.py - editor");
        assert_eq!(apply_rules(&rules, &context), FALLBACK_CATEGORY);
        assert_eq!(apply_rules(&[], &context), FALLBACK_CATEGORY);
    }
}
