//! Append-only event log.
//!
//! `events.db` holds one row per lifecycle, tool, mail, or error event.
//! Rows are never updated or deleted; ids are the SQLite autoincrement and
//! chronological order is `created_at` with ties broken by id. Follow-mode
//! consumers poll with a growing `since` bound and filter `id >
//! last_seen_id` client-side.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::model::{StoredEvent, format_ts, parse_ts};

use super::{bad_col, open_database, store_err};

const DB: &str = "events";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT,
    agent_name TEXT NOT NULL,
    session_id TEXT,
    event_type TEXT NOT NULL
        CHECK (event_type IN ('tool_start','tool_end','session_start','session_end',
                              'mail_sent','mail_received','spawn','error','custom')),
    tool_name TEXT,
    tool_args TEXT,
    tool_duration_ms INTEGER,
    level TEXT NOT NULL CHECK (level IN ('info','warn','error')),
    data TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_events_agent ON events(agent_name, created_at);
CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, created_at);
CREATE INDEX IF NOT EXISTS idx_events_created ON events(created_at);
";

// ---------------------------------------------------------------------------
// EventQuery
// ---------------------------------------------------------------------------

/// Bounds for a timeline query.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventQuery {
    /// Only events at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only events at or before this instant.
    pub until: Option<DateTime<Utc>>,
    /// Maximum rows returned (applied after ordering).
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// EventStore
// ---------------------------------------------------------------------------

/// Append-only store over `events.db`.
pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open (and create if needed) the event log at `path`.
    ///
    /// # Errors
    /// Returns a store error when the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_database(path, DB)?;
        conn.execute_batch(SCHEMA).map_err(store_err(DB))?;
        Ok(Self { conn })
    }

    /// Close the store.
    pub fn close(self) {
        drop(self.conn);
    }

    /// Append an event, assigning its id and timestamp.
    ///
    /// # Errors
    /// Returns a store error on insert failure.
    pub fn insert(&self, draft: &StoredEvent) -> Result<StoredEvent> {
        let created_at = Utc::now();
        self.conn
            .execute(
                "INSERT INTO events
                 (run_id, agent_name, session_id, event_type, tool_name, tool_args,
                  tool_duration_ms, level, data, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    draft.run_id,
                    draft.agent_name,
                    draft.session_id,
                    draft.event_type.as_str(),
                    draft.tool_name,
                    draft.tool_args,
                    draft.tool_duration_ms,
                    draft.level.as_str(),
                    draft.data,
                    format_ts(created_at),
                ],
            )
            .map_err(store_err(DB))?;
        let id = self.conn.last_insert_rowid();
        let mut stored = draft.clone();
        stored.id = id;
        stored.created_at = created_at;
        Ok(stored)
    }

    /// Events for one agent, chronological.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_by_agent(&self, agent: &str, query: EventQuery) -> Result<Vec<StoredEvent>> {
        self.select(
            "WHERE agent_name = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)",
            params![
                agent,
                query.since.map(format_ts),
                query.until.map(format_ts)
            ],
            query.limit,
        )
    }

    /// Events for one run, chronological.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_by_run(&self, run_id: &str, query: EventQuery) -> Result<Vec<StoredEvent>> {
        self.select(
            "WHERE run_id = ?1
               AND (?2 IS NULL OR created_at >= ?2)
               AND (?3 IS NULL OR created_at <= ?3)",
            params![
                run_id,
                query.since.map(format_ts),
                query.until.map(format_ts)
            ],
            query.limit,
        )
    }

    /// The global timeline, chronological.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_timeline(&self, query: EventQuery) -> Result<Vec<StoredEvent>> {
        self.select(
            "WHERE (?1 IS NULL OR created_at >= ?1)
               AND (?2 IS NULL OR created_at <= ?2)",
            params![query.since.map(format_ts), query.until.map(format_ts)],
            query.limit,
        )
    }

    fn select(
        &self,
        filter: &str,
        args: impl rusqlite::Params,
        limit: Option<u32>,
    ) -> Result<Vec<StoredEvent>> {
        let limit_clause = limit.map_or(String::new(), |n| format!(" LIMIT {n}"));
        let sql = format!(
            "SELECT id, run_id, agent_name, session_id, event_type, tool_name,
                    tool_args, tool_duration_ms, level, data, created_at
             FROM events {filter}
             ORDER BY created_at ASC, id ASC{limit_clause}"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err(DB))?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(StoredEvent {
                    id: row.get(0)?,
                    run_id: row.get(1)?,
                    agent_name: row.get(2)?,
                    session_id: row.get(3)?,
                    event_type: row.get::<_, String>(4)?.parse().map_err(bad_col)?,
                    tool_name: row.get(5)?,
                    tool_args: row.get(6)?,
                    tool_duration_ms: row.get(7)?,
                    level: row.get::<_, String>(8)?.parse().map_err(bad_col)?,
                    data: row.get(9)?,
                    created_at: parse_ts(&row.get::<_, String>(10)?).map_err(bad_col)?,
                })
            })
            .map_err(store_err(DB))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err(DB))?;
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventLevel, EventType};

    fn store() -> (tempfile::TempDir, EventStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_assigns_monotonic_ids() {
        let (_dir, store) = store();
        let a = store
            .insert(&StoredEvent::new("alice", EventType::Spawn))
            .unwrap();
        let b = store
            .insert(&StoredEvent::new("alice", EventType::ToolStart))
            .unwrap();
        assert!(b.id > a.id, "ids must grow: {} then {}", a.id, b.id);
    }

    #[test]
    fn get_by_agent_filters_and_orders() {
        let (_dir, store) = store();
        store
            .insert(&StoredEvent::new("alice", EventType::Spawn))
            .unwrap();
        store
            .insert(&StoredEvent::new("bob", EventType::Spawn))
            .unwrap();
        store
            .insert(&StoredEvent::new("alice", EventType::ToolStart))
            .unwrap();

        let events = store.get_by_agent("alice", EventQuery::default()).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id < events[1].id);
        assert!(events.iter().all(|e| e.agent_name == "alice"));
    }

    #[test]
    fn get_by_run_scopes_to_run() {
        let (_dir, store) = store();
        store
            .insert(&StoredEvent::new("alice", EventType::Spawn).with_run(Some("run-1".into())))
            .unwrap();
        store
            .insert(&StoredEvent::new("bob", EventType::Spawn).with_run(Some("run-2".into())))
            .unwrap();
        let events = store.get_by_run("run-1", EventQuery::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent_name, "alice");
    }

    #[test]
    fn timeline_since_bound_and_limit() {
        let (_dir, store) = store();
        for _ in 0..5 {
            store
                .insert(&StoredEvent::new("alice", EventType::Custom))
                .unwrap();
        }
        let all = store.get_timeline(EventQuery::default()).unwrap();
        assert_eq!(all.len(), 5);

        let limited = store
            .get_timeline(EventQuery {
                limit: Some(2),
                ..EventQuery::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 2);

        // A `since` in the future excludes everything.
        let none = store
            .get_timeline(EventQuery {
                since: Some(Utc::now() + chrono::Duration::hours(1)),
                ..EventQuery::default()
            })
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn follow_mode_id_filter_sees_only_new_events() {
        let (_dir, store) = store();
        let first = store
            .insert(&StoredEvent::new("alice", EventType::Custom))
            .unwrap();
        store
            .insert(&StoredEvent::new("alice", EventType::Custom))
            .unwrap();

        let all = store.get_timeline(EventQuery::default()).unwrap();
        let fresh: Vec<_> = all.iter().filter(|e| e.id > first.id).collect();
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn tool_metadata_roundtrip() {
        let (_dir, store) = store();
        let draft = StoredEvent::new("alice", EventType::ToolEnd)
            .with_tool("Bash", Some("{}".to_owned()), Some(1234))
            .with_level(EventLevel::Warn)
            .with_session("sess-1");
        let stored = store.insert(&draft).unwrap();
        let events = store.get_by_agent("alice", EventQuery::default()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], stored);
        assert_eq!(events[0].tool_name.as_deref(), Some("Bash"));
        assert_eq!(events[0].tool_duration_ms, Some(1234));
        assert_eq!(events[0].level, EventLevel::Warn);
    }
}
