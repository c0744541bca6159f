use std::{fmt::Display, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// How a rule pattern is applied to an observed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Case-insensitive containment.
    Substring,
    /// Case-insensitive regex search; a pattern that fails to compile simply
    /// never matches.
    Regex,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::Substring => "substring",
            MatchKind::Regex => "regex",
        }
    }

    /// Stored rows may carry arbitrary text. Anything unrecognized behaves
    /// as a substring rule, matching how existing databases are read.
    pub fn from_stored(value: &str) -> Self {
        if value.eq_ignore_ascii_case("regex") {
            MatchKind::Regex
        } else {
            MatchKind::Substring
        }
    }
}

impl Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "substring" => Ok(MatchKind::Substring),
            "regex" => Ok(MatchKind::Regex),
            other => Err(anyhow!("Unknown match kind {other}, expected substring or regex")),
        }
    }
}

/// User-defined pattern-to-category mapping. Lower priority runs first, ties
/// broken by id ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub rule_id: i64,
    pub enabled: bool,
    pub match_kind: MatchKind,
    pub process_pattern: Option<String>,
    pub title_pattern: Option<String>,
    pub category: String,
    pub priority: i64,
}

/// Session row ready to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_sec: i64,
    pub process_name: String,
    pub exe_path: String,
    pub window_title: String,
    pub category: String,
    pub intent_tag: Option<String>,
}

/// Persisted session as read back for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub session_id: i64,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub duration_sec: i64,
    pub process_name: String,
    pub exe_path: String,
    pub window_title: String,
    pub category: String,
    pub intent_tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total_sec: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppTotal {
    pub process_name: String,
    pub total_sec: i64,
}
