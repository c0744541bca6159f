use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::utils::time::{parse_iso, to_iso};

use super::entities::{AppTotal, CategoryTotal, MatchKind, NewSession, Rule, SessionRow};

pub const SCHEMA_VERSION: i32 = 1;

/// SQLite store for sessions, rules and settings.
///
/// The connection sits behind a mutex: every operation is one lock
/// acquisition around one statement, so each call is atomic on its own and
/// tracker writes interleave safely with presentation-driven reads and
/// intent-tag updates. Durability comes from SQLite's commit-per-statement
/// behavior; there is no write batching.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Can't create database directory {parent:?}"))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("Can't open database at {path:?}"))?;
        Self::from_connection(conn)
    }

    /// In-memory database, gone when dropped. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.initialize()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (key TEXT PRIMARY KEY, value TEXT);

            CREATE TABLE IF NOT EXISTS sessions (
                session_id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_ts TEXT NOT NULL,
                end_ts TEXT NOT NULL,
                duration_sec INTEGER NOT NULL,
                process_name TEXT NOT NULL,
                exe_path TEXT NOT NULL,
                window_title TEXT NOT NULL,
                category TEXT NOT NULL,
                intent_tag TEXT
            );

            CREATE TABLE IF NOT EXISTS rules (
                rule_id INTEGER PRIMARY KEY AUTOINCREMENT,
                enabled INTEGER NOT NULL,
                match_type TEXT NOT NULL,
                process_pattern TEXT,
                title_pattern TEXT,
                category TEXT NOT NULL,
                priority INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        if self.get_meta("schema_version")?.is_none() {
            self.set_meta("schema_version", &SCHEMA_VERSION.to_string())?;
        }
        Ok(())
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM meta WHERE key=?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT value FROM settings WHERE key=?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn add_session(&self, record: &NewSession) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sessions (
                start_ts, end_ts, duration_sec, process_name, exe_path,
                window_title, category, intent_tag
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                to_iso(record.start_ts),
                to_iso(record.end_ts),
                record.duration_sec,
                record.process_name,
                record.exe_path,
                record.window_title,
                record.category,
                record.intent_tag,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rewrites a session's end bound. A missing id is a no-op: the row may
    /// have been removed by retention cleanup while the tracker still held a
    /// handle to it.
    pub fn update_session_end(
        &self,
        session_id: i64,
        end_ts: DateTime<Utc>,
        duration_sec: i64,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET end_ts=?1, duration_sec=?2 WHERE session_id=?3",
            params![to_iso(end_ts), duration_sec, session_id],
        )?;
        Ok(())
    }

    /// Attaches an intent tag to a session. Same no-op semantics for missing
    /// ids; prompt responses can arrive long after the row is gone.
    pub fn update_session_intent(&self, session_id: i64, intent_tag: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sessions SET intent_tag=?1 WHERE session_id=?2",
            params![intent_tag, session_id],
        )?;
        Ok(())
    }

    pub fn add_rule(
        &self,
        enabled: bool,
        match_kind: MatchKind,
        process_pattern: Option<&str>,
        title_pattern: Option<&str>,
        category: &str,
        priority: i64,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO rules (enabled, match_type, process_pattern, title_pattern, category, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                enabled as i64,
                match_kind.as_str(),
                process_pattern,
                title_pattern,
                category,
                priority
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_rule(&self, rule: &Rule) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE rules
             SET enabled=?1, match_type=?2, process_pattern=?3, title_pattern=?4, category=?5, priority=?6
             WHERE rule_id=?7",
            params![
                rule.enabled as i64,
                rule.match_kind.as_str(),
                rule.process_pattern,
                rule.title_pattern,
                rule.category,
                rule.priority,
                rule.rule_id
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn set_rule_enabled(&self, rule_id: i64, enabled: bool) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE rules SET enabled=?1 WHERE rule_id=?2",
            params![enabled as i64, rule_id],
        )?;
        Ok(changed > 0)
    }

    pub fn delete_rule(&self, rule_id: i64) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM rules WHERE rule_id=?1", params![rule_id])?;
        Ok(changed > 0)
    }

    /// All rules in classification order, enabled or not.
    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT rule_id, enabled, match_type, process_pattern, title_pattern, category, priority
             FROM rules ORDER BY priority ASC, rule_id ASC",
        )?;
        let rules = stmt
            .query_map([], rule_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rules)
    }

    pub fn fetch_sessions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SessionRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT session_id, start_ts, end_ts, duration_sec, process_name, exe_path,
                    window_title, category, intent_tag
             FROM sessions
             WHERE start_ts >= ?1 AND end_ts <= ?2
             ORDER BY start_ts ASC",
        )?;
        let mut rows = stmt.query(params![to_iso(start), to_iso(end)])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(session_from_row(row)?);
        }
        Ok(sessions)
    }

    pub fn summarize_categories(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategoryTotal>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT category, COALESCE(SUM(duration_sec), 0) AS total
             FROM sessions
             WHERE start_ts >= ?1 AND end_ts <= ?2
             GROUP BY category
             ORDER BY total DESC",
        )?;
        let totals = stmt
            .query_map(params![to_iso(start), to_iso(end)], |row| {
                Ok(CategoryTotal {
                    category: row.get(0)?,
                    total_sec: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }

    /// Applications by accumulated time, busiest first. Idle spans carry no
    /// process name and are left out.
    pub fn top_apps(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AppTotal>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT process_name, COALESCE(SUM(duration_sec), 0) AS total
             FROM sessions
             WHERE start_ts >= ?1 AND end_ts <= ?2 AND category != 'Idle'
             GROUP BY process_name
             ORDER BY total DESC
             LIMIT ?3",
        )?;
        let totals = stmt
            .query_map(params![to_iso(start), to_iso(end), limit as i64], |row| {
                Ok(AppTotal {
                    process_name: row.get(0)?,
                    total_sec: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(totals)
    }

    pub fn total_idle(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let total = self.conn().query_row(
            "SELECT COALESCE(SUM(duration_sec), 0)
             FROM sessions
             WHERE start_ts >= ?1 AND end_ts <= ?2 AND category = 'Idle'",
            params![to_iso(start), to_iso(end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    pub fn total_active(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let total = self.conn().query_row(
            "SELECT COALESCE(SUM(duration_sec), 0)
             FROM sessions
             WHERE start_ts >= ?1 AND end_ts <= ?2 AND category != 'Idle'",
            params![to_iso(start), to_iso(end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Deletes sessions that ended before the retention horizon. Disabled
    /// retention (`days <= 0`) removes nothing.
    pub fn cleanup_retention(&self, days: i64) -> Result<usize> {
        if days <= 0 {
            return Ok(0);
        }
        let cutoff = Utc::now() - Duration::days(days);
        let removed = self.conn().execute(
            "DELETE FROM sessions WHERE end_ts < ?1",
            params![to_iso(cutoff)],
        )?;
        Ok(removed)
    }

    pub fn ensure_default_rules(&self) -> Result<()> {
        if !self.list_rules()?.is_empty() {
            return Ok(());
        }
        debug!("Seeding default rules");
        self.add_rule(
            true,
            MatchKind::Substring,
            Some("chrome.exe"),
            Some("YouTube"),
            "Video",
            1,
        )?;
        self.add_rule(true, MatchKind::Substring, Some("spotify.exe"), None, "Social", 2)?;
        Ok(())
    }
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    let match_type: String = row.get("match_type")?;
    Ok(Rule {
        rule_id: row.get("rule_id")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        match_kind: MatchKind::from_stored(&match_type),
        process_pattern: row.get("process_pattern")?,
        title_pattern: row.get("title_pattern")?,
        category: row.get("category")?,
        priority: row.get("priority")?,
    })
}

fn session_from_row(row: &Row<'_>) -> Result<SessionRow> {
    let start_ts: String = row.get("start_ts")?;
    let end_ts: String = row.get("end_ts")?;
    Ok(SessionRow {
        session_id: row.get("session_id")?,
        start_ts: parse_iso(&start_ts)?,
        end_ts: parse_iso(&end_ts)?,
        duration_sec: row.get("duration_sec")?,
        process_name: row.get("process_name")?,
        exe_path: row.get("exe_path")?,
        window_title: row.get("window_title")?,
        category: row.get("category")?,
        intent_tag: row.get("intent_tag")?,
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, Utc};

    use crate::daemon::storage::entities::{MatchKind, NewSession};

    use super::Database;

    fn sample_session(category: &str, process: &str, age: Duration) -> NewSession {
        let end = Utc::now() - age;
        NewSession {
            start_ts: end - Duration::seconds(60),
            end_ts: end,
            duration_sec: 60,
            process_name: process.to_string(),
            exe_path: format!("C:\\apps\\{process}"),
            window_title: "window".to_string(),
            category: category.to_string(),
            intent_tag: None,
        }
    }

    #[test]
    fn schema_version_is_seeded() -> Result<()> {
        let db = Database::open_in_memory()?;
        assert_eq!(db.get_meta("schema_version")?.as_deref(), Some("1"));
        Ok(())
    }

    #[test]
    fn session_roundtrip_and_end_rewrite() -> Result<()> {
        let db = Database::open_in_memory()?;
        let record = sample_session("Work", "code.exe", Duration::zero());
        let id = db.add_session(&record)?;

        let new_end = record.end_ts + Duration::seconds(30);
        db.update_session_end(id, new_end, 90)?;

        let sessions =
            db.fetch_sessions(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))?;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, id);
        assert_eq!(sessions[0].end_ts, new_end);
        assert_eq!(sessions[0].duration_sec, 90);
        Ok(())
    }

    #[test]
    fn amending_missing_session_is_a_noop() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.update_session_end(4242, Utc::now(), 10)?;
        db.update_session_intent(4242, "focus")?;
        Ok(())
    }

    #[test]
    fn intent_tag_is_stored() -> Result<()> {
        let db = Database::open_in_memory()?;
        let id = db.add_session(&sample_session("Social", "slack.exe", Duration::zero()))?;
        db.update_session_intent(id, "work chat")?;
        let sessions =
            db.fetch_sessions(Utc::now() - Duration::hours(1), Utc::now() + Duration::hours(1))?;
        assert_eq!(sessions[0].intent_tag.as_deref(), Some("work chat"));
        Ok(())
    }

    #[test]
    fn rules_are_ordered_by_priority_then_id() -> Result<()> {
        let db = Database::open_in_memory()?;
        let late = db.add_rule(true, MatchKind::Substring, Some("a"), None, "Work", 5)?;
        let first = db.add_rule(true, MatchKind::Substring, Some("b"), None, "Video", 1)?;
        let tie = db.add_rule(true, MatchKind::Substring, Some("c"), None, "Social", 5)?;

        let ids = db
            .list_rules()?
            .into_iter()
            .map(|r| r.rule_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![first, late, tie]);
        Ok(())
    }

    #[test]
    fn unknown_match_type_reads_as_substring() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.conn().execute(
            "INSERT INTO rules (enabled, match_type, process_pattern, title_pattern, category, priority)
             VALUES (1, 'glob', 'a', NULL, 'Work', 1)",
            [],
        )?;
        assert_eq!(db.list_rules()?[0].match_kind, MatchKind::Substring);
        Ok(())
    }

    #[test]
    fn retention_removes_only_expired_sessions() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.add_session(&sample_session("Work", "old.exe", Duration::days(10)))?;
        db.add_session(&sample_session("Work", "new.exe", Duration::days(1)))?;

        assert_eq!(db.cleanup_retention(7)?, 1);

        let remaining =
            db.fetch_sessions(Utc::now() - Duration::days(30), Utc::now() + Duration::hours(1))?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].process_name, "new.exe");
        Ok(())
    }

    #[test]
    fn disabled_retention_removes_nothing() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.add_session(&sample_session("Work", "old.exe", Duration::days(100)))?;
        assert_eq!(db.cleanup_retention(0)?, 0);
        assert_eq!(db.cleanup_retention(-3)?, 0);
        Ok(())
    }

    #[test]
    fn totals_split_idle_from_active() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.add_session(&sample_session("Work", "code.exe", Duration::zero()))?;
        db.add_session(&NewSession {
            process_name: String::new(),
            exe_path: String::new(),
            window_title: String::new(),
            category: "Idle".to_string(),
            ..sample_session("Idle", "", Duration::zero())
        })?;

        let start = Utc::now() - Duration::hours(1);
        let end = Utc::now() + Duration::hours(1);
        assert_eq!(db.total_active(start, end)?, 60);
        assert_eq!(db.total_idle(start, end)?, 60);

        let apps = db.top_apps(start, end, 10)?;
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].process_name, "code.exe");
        Ok(())
    }

    #[test]
    fn category_summary_accumulates() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.add_session(&sample_session("Work", "code.exe", Duration::zero()))?;
        db.add_session(&sample_session("Work", "terminal.exe", Duration::zero()))?;
        db.add_session(&sample_session("Video", "chrome.exe", Duration::zero()))?;

        let totals = db.summarize_categories(
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
        )?;
        assert_eq!(totals[0].category, "Work");
        assert_eq!(totals[0].total_sec, 120);
        assert_eq!(totals[1].category, "Video");
        Ok(())
    }

    #[test]
    fn default_rules_are_seeded_once() -> Result<()> {
        let db = Database::open_in_memory()?;
        db.ensure_default_rules()?;
        db.ensure_default_rules()?;
        let rules = db.list_rules()?;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].category, "Video");
        assert_eq!(rules[1].category, "Social");
        Ok(())
    }
}
