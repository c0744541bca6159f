use std::time::Duration;

use anyhow::Result;
use chrono::NaiveTime;
use tracing::warn;

use super::database::Database;

pub const KEY_SAMPLING_INTERVAL: &str = "sampling_interval_sec";
pub const KEY_IDLE_THRESHOLD: &str = "idle_threshold_min";
pub const KEY_RETENTION_DAYS: &str = "retention_days";
pub const KEY_CLOSE_TO_TRAY: &str = "close_to_tray";
pub const KEY_FOCUS_START: &str = "focus_start";
pub const KEY_FOCUS_END: &str = "focus_end";
pub const KEY_PROMPTS_ENABLED: &str = "prompts_enabled";
pub const KEY_DISTRACTION_CATEGORIES: &str = "distraction_categories";

/// Immutable snapshot of the scalar settings. The tracker reads a fresh one
/// at every tick; edits land in the settings table and become visible on the
/// next tick, so there is no shared mutable state to guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub sampling_interval_sec: i64,
    pub idle_threshold_min: i64,
    pub retention_days: i64,
    /// Presentation-only flag, stored here so every frontend sees the same
    /// value.
    pub close_to_tray: bool,
    pub focus_start: NaiveTime,
    pub focus_end: NaiveTime,
    pub prompts_enabled: bool,
    pub distraction_categories: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sampling_interval_sec: 1,
            idle_threshold_min: 3,
            retention_days: 0,
            close_to_tray: true,
            focus_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            focus_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            prompts_enabled: true,
            distraction_categories: vec!["Social".into(), "Video".into(), "Gaming".into()],
        }
    }
}

impl Settings {
    pub fn idle_threshold_secs(&self) -> i64 {
        self.idle_threshold_min * 60
    }

    /// Sampling interval with the 1-second floor applied.
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_sec.max(1) as u64)
    }

    /// Reads the snapshot, seeding defaults for missing keys. A stored value
    /// that fails to parse keeps its default; the CLI validates before
    /// writing, so this only fires on hand-edited rows.
    pub fn load(db: &Database) -> Result<Settings> {
        let mut settings = Settings::default();
        for (key, default_value) in settings.encoded() {
            let stored = match db.get_setting(key)? {
                Some(v) => v,
                None => {
                    db.set_setting(key, &default_value)?;
                    default_value
                }
            };
            settings.apply(key, &stored);
        }
        Ok(settings)
    }

    pub fn store(&self, db: &Database) -> Result<()> {
        for (key, value) in self.encoded() {
            db.set_setting(key, &value)?;
        }
        Ok(())
    }

    fn encoded(&self) -> Vec<(&'static str, String)> {
        vec![
            (KEY_SAMPLING_INTERVAL, self.sampling_interval_sec.to_string()),
            (KEY_IDLE_THRESHOLD, self.idle_threshold_min.to_string()),
            (KEY_RETENTION_DAYS, self.retention_days.to_string()),
            (KEY_CLOSE_TO_TRAY, encode_bool(self.close_to_tray)),
            (KEY_FOCUS_START, self.focus_start.format("%H:%M").to_string()),
            (KEY_FOCUS_END, self.focus_end.format("%H:%M").to_string()),
            (KEY_PROMPTS_ENABLED, encode_bool(self.prompts_enabled)),
            (
                KEY_DISTRACTION_CATEGORIES,
                serde_json::to_string(&self.distraction_categories)
                    .expect("Plain strings always serialize"),
            ),
        ]
    }

    fn apply(&mut self, key: &str, value: &str) {
        let parsed = match key {
            KEY_SAMPLING_INTERVAL => parse_int(value).map(|v| self.sampling_interval_sec = v),
            KEY_IDLE_THRESHOLD => parse_int(value).map(|v| self.idle_threshold_min = v),
            KEY_RETENTION_DAYS => parse_int(value).map(|v| self.retention_days = v),
            KEY_CLOSE_TO_TRAY => parse_bool(value).map(|v| self.close_to_tray = v),
            KEY_FOCUS_START => parse_time_of_day(value).map(|v| self.focus_start = v),
            KEY_FOCUS_END => parse_time_of_day(value).map(|v| self.focus_end = v),
            KEY_PROMPTS_ENABLED => parse_bool(value).map(|v| self.prompts_enabled = v),
            KEY_DISTRACTION_CATEGORIES => serde_json::from_str::<Vec<String>>(value)
                .ok()
                .map(|v| self.distraction_categories = v),
            _ => None,
        };
        if parsed.is_none() {
            warn!("Keeping the default for setting {key}, stored value is malformed: {value}");
        }
    }
}

fn encode_bool(value: bool) -> String {
    if value { "1".to_string() } else { "0".to_string() }
}

fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Accepts `true`/`false` in any case as well as numeric flags, matching the
/// value shapes older databases contain.
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        other => other.parse::<i64>().ok().map(|v| v != 0),
    }
}

pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::NaiveTime;

    use crate::daemon::storage::database::Database;

    use super::{parse_time_of_day, Settings, KEY_IDLE_THRESHOLD, KEY_SAMPLING_INTERVAL};

    #[test]
    fn load_seeds_defaults_into_an_empty_store() -> Result<()> {
        let db = Database::open_in_memory()?;
        let settings = Settings::load(&db)?;
        assert_eq!(settings, Settings::default());
        assert_eq!(db.get_setting(KEY_SAMPLING_INTERVAL)?.as_deref(), Some("1"));
        assert_eq!(db.get_setting(KEY_IDLE_THRESHOLD)?.as_deref(), Some("3"));
        Ok(())
    }

    #[test]
    fn store_and_load_roundtrip() -> Result<()> {
        let db = Database::open_in_memory()?;
        let settings = Settings {
            sampling_interval_sec: 5,
            idle_threshold_min: 10,
            retention_days: 30,
            close_to_tray: false,
            focus_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            focus_end: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            prompts_enabled: false,
            distraction_categories: vec!["Video".into()],
        };
        settings.store(&db)?;
        assert_eq!(Settings::load(&db)?, settings);
        Ok(())
    }

    #[test]
    fn malformed_values_keep_defaults() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.set_setting(KEY_SAMPLING_INTERVAL, "not a number")?;
        db.set_setting(KEY_IDLE_THRESHOLD, "7")?;
        let settings = Settings::load(&db)?;
        assert_eq!(settings.sampling_interval_sec, 1);
        assert_eq!(settings.idle_threshold_min, 7);
        Ok(())
    }

    #[test]
    fn sampling_interval_has_a_one_second_floor() {
        let settings = Settings {
            sampling_interval_sec: 0,
            ..Settings::default()
        };
        assert_eq!(settings.sampling_interval(), Duration::from_secs(1));
    }

    #[test]
    fn threshold_converts_to_seconds() {
        let settings = Settings {
            idle_threshold_min: 3,
            ..Settings::default()
        };
        assert_eq!(settings.idle_threshold_secs(), 180);
    }

    #[test]
    fn time_of_day_parsing() {
        assert_eq!(
            parse_time_of_day("09:30"),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
        assert_eq!(parse_time_of_day("24:00"), None);
        assert_eq!(parse_time_of_day("soon"), None);
    }
}
