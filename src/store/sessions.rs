//! Session registry: the authoritative record of live agents.
//!
//! Backed by `sessions.db` with two tables: `sessions` (one row per agent
//! session) and `runs` (one row per swarm invocation). Agent names are
//! unique among non-terminal sessions; history rows for completed or zombie
//! sessions stay queryable forever.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{OverstoryError, Result};
use crate::model::{AgentSession, Run, RunStatus, SessionState, format_ts, parse_ts};

use super::{bad_col, open_database, store_err};

const DB: &str = "sessions";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    agent_name TEXT NOT NULL,
    capability TEXT NOT NULL,
    worktree_path TEXT NOT NULL,
    branch_name TEXT NOT NULL,
    task_id TEXT NOT NULL,
    tmux_session TEXT NOT NULL,
    state TEXT NOT NULL
        CHECK (state IN ('booting','working','stalled','zombie','completed')),
    pid INTEGER,
    parent_agent TEXT,
    depth INTEGER NOT NULL DEFAULT 0,
    run_id TEXT,
    started_at TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    escalation_level INTEGER NOT NULL DEFAULT 0,
    stalled_since TEXT
);
CREATE INDEX IF NOT EXISTS idx_sessions_agent_name ON sessions(agent_name);
CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    agent_count INTEGER NOT NULL DEFAULT 0,
    coordinator_session_id TEXT,
    status TEXT NOT NULL CHECK (status IN ('active','completed'))
);
";

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Durable registry of agent sessions and runs.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (and create if needed) the registry at `path`.
    ///
    /// # Errors
    /// Returns a store error when the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_database(path, DB)?;
        conn.execute_batch(SCHEMA).map_err(store_err(DB))?;
        Ok(Self { conn })
    }

    /// Close the store. Dropping has the same effect; this makes the
    /// open/close pairing explicit at call sites.
    pub fn close(self) {
        drop(self.conn);
    }

    // -- sessions -----------------------------------------------------------

    /// Insert or replace a session by id.
    ///
    /// # Errors
    /// Rejects the write when a *different* active session already holds the
    /// same agent name.
    pub fn upsert(&self, session: &AgentSession) -> Result<()> {
        let holder: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM sessions
                 WHERE agent_name = ?1
                   AND state IN ('booting','working','stalled')
                   AND id != ?2",
                params![session.agent_name, session.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err(DB))?;
        if holder.is_some() {
            return Err(OverstoryError::agent(
                &session.agent_name,
                "an active session with this name already exists",
            ));
        }

        self.conn
            .execute(
                "INSERT OR REPLACE INTO sessions
                 (id, agent_name, capability, worktree_path, branch_name, task_id,
                  tmux_session, state, pid, parent_agent, depth, run_id,
                  started_at, last_activity, escalation_level, stalled_since)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16)",
                params![
                    session.id,
                    session.agent_name,
                    session.capability.as_str(),
                    session.worktree_path.to_string_lossy().into_owned(),
                    session.branch_name,
                    session.task_id,
                    session.tmux_session,
                    session.state.as_str(),
                    session.pid,
                    session.parent_agent,
                    session.depth,
                    session.run_id,
                    format_ts(session.started_at),
                    format_ts(session.last_activity),
                    session.escalation_level,
                    session.stalled_since.map(format_ts),
                ],
            )
            .map_err(store_err(DB))?;
        Ok(())
    }

    /// Most recent session for an agent name, active or not.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_by_name(&self, name: &str) -> Result<Option<AgentSession>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM sessions WHERE agent_name = ?1
                     ORDER BY started_at DESC, rowid DESC LIMIT 1"
                ),
                params![name],
                row_to_session,
            )
            .optional()
            .map_err(store_err(DB))
    }

    /// All sessions currently in an active state (booting, working,
    /// stalled), oldest first.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_active(&self) -> Result<Vec<AgentSession>> {
        self.select_sessions(
            "WHERE state IN ('booting','working','stalled')
             ORDER BY started_at ASC, rowid ASC",
            params![],
        )
    }

    /// Every session row, oldest first.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_all(&self) -> Result<Vec<AgentSession>> {
        self.select_sessions("ORDER BY started_at ASC, rowid ASC", params![])
    }

    /// Transition the named agent's most recent session to a new state.
    ///
    /// Terminal sessions are never mutated. Moving into `stalled` stamps
    /// `stalled_since` from the session's last activity; moving anywhere
    /// else clears it.
    ///
    /// # Errors
    /// Fails when the agent is unknown or its session is already terminal.
    pub fn update_state(&self, name: &str, new_state: SessionState) -> Result<()> {
        let Some(current) = self.get_by_name(name)? else {
            return Err(OverstoryError::agent(name, "no session found"));
        };
        if current.state.is_terminal() {
            return Err(OverstoryError::agent(
                name,
                format!(
                    "session is already terminal ({}); it cannot transition to {new_state}",
                    current.state
                ),
            ));
        }
        let stalled_since = if new_state == SessionState::Stalled {
            Some(format_ts(current.last_activity))
        } else {
            None
        };
        self.conn
            .execute(
                "UPDATE sessions SET state = ?1, stalled_since = ?2 WHERE id = ?3",
                params![new_state.as_str(), stalled_since, current.id],
            )
            .map_err(store_err(DB))?;
        Ok(())
    }

    /// Advance the named agent's last-activity timestamp.
    ///
    /// Monotonic: a timestamp at or before the stored one is ignored, so
    /// out-of-order hook invocations never move activity backward.
    ///
    /// # Errors
    /// Fails when the agent is unknown.
    pub fn update_last_activity(&self, name: &str, ts: DateTime<Utc>) -> Result<()> {
        let Some(current) = self.get_by_name(name)? else {
            return Err(OverstoryError::agent(name, "no session found"));
        };
        if ts <= current.last_activity {
            return Ok(());
        }
        self.conn
            .execute(
                "UPDATE sessions SET last_activity = ?1 WHERE id = ?2",
                params![format_ts(ts), current.id],
            )
            .map_err(store_err(DB))?;
        Ok(())
    }

    /// Record the agent's process id (or clear it after termination).
    ///
    /// # Errors
    /// Fails when the agent is unknown.
    pub fn update_pid(&self, name: &str, pid: Option<u32>) -> Result<()> {
        let Some(current) = self.get_by_name(name)? else {
            return Err(OverstoryError::agent(name, "no session found"));
        };
        self.conn
            .execute(
                "UPDATE sessions SET pid = ?1 WHERE id = ?2",
                params![pid, current.id],
            )
            .map_err(store_err(DB))?;
        Ok(())
    }

    /// Bump the escalation level of the named agent's session.
    ///
    /// # Errors
    /// Fails when the agent is unknown.
    pub fn bump_escalation(&self, name: &str) -> Result<u32> {
        let Some(current) = self.get_by_name(name)? else {
            return Err(OverstoryError::agent(name, "no session found"));
        };
        let next = current.escalation_level + 1;
        self.conn
            .execute(
                "UPDATE sessions SET escalation_level = ?1 WHERE id = ?2",
                params![next, current.id],
            )
            .map_err(store_err(DB))?;
        Ok(next)
    }

    fn select_sessions(
        &self,
        tail: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<AgentSession>> {
        let sql = format!("SELECT {COLUMNS} FROM sessions {tail}");
        let mut stmt = self.conn.prepare(&sql).map_err(store_err(DB))?;
        let rows = stmt
            .query_map(args, row_to_session)
            .map_err(store_err(DB))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err(DB))?;
        Ok(rows)
    }

    // -- runs ---------------------------------------------------------------

    /// Create a new active run.
    ///
    /// # Errors
    /// Fails when a run with this id already exists.
    pub fn create_run(&self, id: &str) -> Result<Run> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO runs (id, started_at, status) VALUES (?1, ?2, 'active')",
                params![id, format_ts(now)],
            )
            .map_err(store_err(DB))?;
        Ok(Run {
            id: id.to_owned(),
            started_at: now,
            completed_at: None,
            agent_count: 0,
            coordinator_session_id: None,
            status: RunStatus::Active,
        })
    }

    /// Close out a run: stamp completion time and the final session count.
    ///
    /// # Errors
    /// Fails when the run is unknown.
    pub fn complete_run(&self, id: &str) -> Result<()> {
        let count: u32 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM sessions WHERE run_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(store_err(DB))?;
        let changed = self
            .conn
            .execute(
                "UPDATE runs
                 SET completed_at = ?1, agent_count = ?2, status = 'completed'
                 WHERE id = ?3",
                params![format_ts(Utc::now()), count, id],
            )
            .map_err(store_err(DB))?;
        if changed == 0 {
            return Err(OverstoryError::validation("run id", id, "no such run"));
        }
        Ok(())
    }

    /// Record the coordinator session driving a run.
    ///
    /// # Errors
    /// Fails when the run is unknown.
    pub fn set_run_coordinator(&self, id: &str, session_id: &str) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE runs SET coordinator_session_id = ?1 WHERE id = ?2",
                params![session_id, id],
            )
            .map_err(store_err(DB))?;
        if changed == 0 {
            return Err(OverstoryError::validation("run id", id, "no such run"));
        }
        Ok(())
    }

    /// All runs, newest first.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn list_runs(&self) -> Result<Vec<Run>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, started_at, completed_at, agent_count,
                        coordinator_session_id, status
                 FROM runs ORDER BY started_at DESC, rowid DESC",
            )
            .map_err(store_err(DB))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Run {
                    id: row.get(0)?,
                    started_at: parse_ts(&row.get::<_, String>(1)?).map_err(bad_col)?,
                    completed_at: row
                        .get::<_, Option<String>>(2)?
                        .map(|s| parse_ts(&s))
                        .transpose()
                        .map_err(bad_col)?,
                    agent_count: row.get(3)?,
                    coordinator_session_id: row.get(4)?,
                    status: row.get::<_, String>(5)?.parse().map_err(bad_col)?,
                })
            })
            .map_err(store_err(DB))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err(DB))?;
        Ok(rows)
    }

    /// Count active sessions attributed to a run.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn count_run_sessions(&self, run_id: &str) -> Result<u32> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sessions
                 WHERE run_id = ?1 AND state IN ('booting','working','stalled')",
                params![run_id],
                |row| row.get(0),
            )
            .map_err(store_err(DB))
    }
}

const COLUMNS: &str = "id, agent_name, capability, worktree_path, branch_name, task_id, \
                       tmux_session, state, pid, parent_agent, depth, run_id, \
                       started_at, last_activity, escalation_level, stalled_since";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<AgentSession> {
    Ok(AgentSession {
        id: row.get(0)?,
        agent_name: row.get(1)?,
        capability: row.get::<_, String>(2)?.parse().map_err(bad_col)?,
        worktree_path: PathBuf::from(row.get::<_, String>(3)?),
        branch_name: row.get(4)?,
        task_id: row.get(5)?,
        tmux_session: row.get(6)?,
        state: row.get::<_, String>(7)?.parse().map_err(bad_col)?,
        pid: row.get(8)?,
        parent_agent: row.get(9)?,
        depth: row.get(10)?,
        run_id: row.get(11)?,
        started_at: parse_ts(&row.get::<_, String>(12)?).map_err(bad_col)?,
        last_activity: parse_ts(&row.get::<_, String>(13)?).map_err(bad_col)?,
        escalation_level: row.get(14)?,
        stalled_since: row
            .get::<_, Option<String>>(15)?
            .map(|s| parse_ts(&s))
            .transpose()
            .map_err(bad_col)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Capability;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::open(&dir.path().join("sessions.db")).unwrap();
        (dir, store)
    }

    fn session(name: &str) -> AgentSession {
        AgentSession::new(
            name,
            Capability::Builder,
            PathBuf::from(format!("/wt/{name}")),
            format!("overstory/{name}/t-1"),
            "t-1",
            format!("overstory-proj-{name}"),
            Some("lead".to_owned()),
            1,
            None,
        )
    }

    #[test]
    fn upsert_and_get_by_name_roundtrip() {
        let (_dir, store) = store();
        let s = session("alice");
        store.upsert(&s).unwrap();
        let loaded = store.get_by_name("alice").unwrap().unwrap();
        assert_eq!(loaded, s);
    }

    #[test]
    fn get_by_name_missing_is_none() {
        let (_dir, store) = store();
        assert!(store.get_by_name("ghost").unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_same_id() {
        let (_dir, store) = store();
        let mut s = session("alice");
        store.upsert(&s).unwrap();
        s.task_id = "t-2".to_owned();
        store.upsert(&s).unwrap();
        let loaded = store.get_by_name("alice").unwrap().unwrap();
        assert_eq!(loaded.task_id, "t-2");
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn upsert_rejects_duplicate_active_name() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        let err = store.upsert(&session("alice")).unwrap_err();
        assert_eq!(err.code(), "AGENT");
        assert!(format!("{err}").contains("already exists"));
    }

    #[test]
    fn upsert_allows_name_reuse_after_terminal() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store
            .update_state("alice", SessionState::Completed)
            .unwrap();
        store.upsert(&session("alice")).unwrap();
        assert_eq!(store.get_all().unwrap().len(), 2);
    }

    #[test]
    fn get_active_excludes_terminal_states() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store.upsert(&session("bob")).unwrap();
        store.update_state("bob", SessionState::Zombie).unwrap();
        let active = store.get_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].agent_name, "alice");
    }

    #[test]
    fn active_names_unique_invariant() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store
            .update_state("alice", SessionState::Completed)
            .unwrap();
        store.upsert(&session("alice")).unwrap();
        let active = store.get_active().unwrap();
        let count = active.iter().filter(|s| s.agent_name == "alice").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn update_state_sets_and_clears_stalled_since() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store.update_state("alice", SessionState::Stalled).unwrap();
        let s = store.get_by_name("alice").unwrap().unwrap();
        assert_eq!(s.state, SessionState::Stalled);
        let stalled_since = s.stalled_since.expect("stalled_since should be set");
        assert_eq!(
            stalled_since.timestamp_millis(),
            s.last_activity.timestamp_millis()
        );

        store.update_state("alice", SessionState::Working).unwrap();
        let s = store.get_by_name("alice").unwrap().unwrap();
        assert!(s.stalled_since.is_none());
        s.check_invariants().unwrap();
    }

    #[test]
    fn update_state_rejects_terminal_mutation() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store.update_state("alice", SessionState::Zombie).unwrap();
        let err = store
            .update_state("alice", SessionState::Working)
            .unwrap_err();
        assert_eq!(err.code(), "AGENT");
        assert!(format!("{err}").contains("terminal"));
    }

    #[test]
    fn update_state_unknown_agent_fails() {
        let (_dir, store) = store();
        let err = store
            .update_state("ghost", SessionState::Working)
            .unwrap_err();
        assert_eq!(err.code(), "AGENT");
    }

    #[test]
    fn last_activity_is_monotonic() {
        let (_dir, store) = store();
        let s = session("alice");
        store.upsert(&s).unwrap();

        let forward = s.last_activity + chrono::Duration::seconds(10);
        store.update_last_activity("alice", forward).unwrap();
        let loaded = store.get_by_name("alice").unwrap().unwrap();
        assert_eq!(
            loaded.last_activity.timestamp_millis(),
            forward.timestamp_millis()
        );

        // An older timestamp never moves the clock backward.
        let backward = forward - chrono::Duration::seconds(60);
        store.update_last_activity("alice", backward).unwrap();
        let loaded = store.get_by_name("alice").unwrap().unwrap();
        assert_eq!(
            loaded.last_activity.timestamp_millis(),
            forward.timestamp_millis()
        );
    }

    #[test]
    fn update_pid_roundtrip() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        store.update_pid("alice", Some(4242)).unwrap();
        assert_eq!(
            store.get_by_name("alice").unwrap().unwrap().pid,
            Some(4242)
        );
        store.update_pid("alice", None).unwrap();
        assert_eq!(store.get_by_name("alice").unwrap().unwrap().pid, None);
    }

    #[test]
    fn bump_escalation_increments() {
        let (_dir, store) = store();
        store.upsert(&session("alice")).unwrap();
        assert_eq!(store.bump_escalation("alice").unwrap(), 1);
        assert_eq!(store.bump_escalation("alice").unwrap(), 2);
        assert_eq!(
            store.get_by_name("alice").unwrap().unwrap().escalation_level,
            2
        );
    }

    // -- runs --

    #[test]
    fn run_lifecycle() {
        let (_dir, store) = store();
        let run = store.create_run("run-1").unwrap();
        assert_eq!(run.status, RunStatus::Active);

        let mut s = session("alice");
        s.run_id = Some("run-1".to_owned());
        store.upsert(&s).unwrap();

        store.complete_run("run-1").unwrap();
        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Completed);
        assert_eq!(runs[0].agent_count, 1);
        assert!(runs[0].completed_at.is_some());
    }

    #[test]
    fn complete_unknown_run_fails() {
        let (_dir, store) = store();
        assert!(store.complete_run("ghost").is_err());
    }

    #[test]
    fn count_run_sessions_only_active() {
        let (_dir, store) = store();
        store.create_run("run-1").unwrap();
        for name in ["a", "b"] {
            let mut s = session(name);
            s.run_id = Some("run-1".to_owned());
            store.upsert(&s).unwrap();
        }
        store.update_state("a", SessionState::Completed).unwrap();
        assert_eq!(store.count_run_sessions("run-1").unwrap(), 1);
    }

    #[test]
    fn set_run_coordinator_records_session() {
        let (_dir, store) = store();
        store.create_run("run-1").unwrap();
        store.set_run_coordinator("run-1", "sess-abc").unwrap();
        let runs = store.list_runs().unwrap();
        assert_eq!(runs[0].coordinator_session_id.as_deref(), Some("sess-abc"));
    }
}
