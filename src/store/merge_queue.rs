//! FIFO merge queue.
//!
//! `merge-queue.db` holds one row per completed branch awaiting merge,
//! ordered by the autoincrement id. Pop order strictly follows insertion
//! order; `update_status` drives the entry state machine.
//!
//! One schema migration is carried: early releases stored the task id in a
//! `bead_id` column (after the task tracker of the era); if that column is
//! present and `task_id` is not, it is renamed in place.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{OverstoryError, Result};
use crate::model::{MergeEntry, MergeStatus, ResolvedTier, format_ts, parse_ts};

use super::{bad_col, open_database, store_err};

const DB: &str = "merge-queue";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS merge_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    branch_name TEXT NOT NULL,
    task_id TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    files_modified TEXT NOT NULL,
    enqueued_at TEXT NOT NULL,
    status TEXT NOT NULL
        CHECK (status IN ('pending','merging','merged','conflict','failed')),
    resolved_tier TEXT
        CHECK (resolved_tier IS NULL
               OR resolved_tier IN ('clean-merge','auto-resolve','ai-resolve','reimagine'))
);
CREATE INDEX IF NOT EXISTS idx_merge_queue_status ON merge_queue(status);
CREATE INDEX IF NOT EXISTS idx_merge_queue_branch ON merge_queue(branch_name);
";

// ---------------------------------------------------------------------------
// MergeQueue
// ---------------------------------------------------------------------------

/// Store over `merge-queue.db`.
pub struct MergeQueue {
    conn: Connection,
}

/// Fields supplied when enqueuing a branch.
#[derive(Clone, Debug)]
pub struct EnqueueRequest {
    /// Branch to merge.
    pub branch_name: String,
    /// Task the branch implements.
    pub task_id: String,
    /// Agent that produced the branch.
    pub agent_name: String,
    /// Files modified relative to canonical.
    pub files_modified: Vec<String>,
}

impl MergeQueue {
    /// Open (and create if needed) the queue at `path`, applying the
    /// `bead_id` migration when a legacy table is found.
    ///
    /// # Errors
    /// Returns a store error when the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_database(path, DB)?;
        migrate_bead_id(&conn)?;
        conn.execute_batch(SCHEMA).map_err(store_err(DB))?;
        Ok(Self { conn })
    }

    /// Close the store.
    pub fn close(self) {
        drop(self.conn);
    }

    /// Append a branch to the queue with status `pending`.
    ///
    /// # Errors
    /// Returns a store error on insert failure.
    pub fn enqueue(&self, request: &EnqueueRequest) -> Result<MergeEntry> {
        let enqueued_at = Utc::now();
        let files =
            serde_json::to_string(&request.files_modified).map_err(|e| OverstoryError::Merge {
                branch: request.branch_name.clone(),
                conflict_files: vec![],
                detail: format!("could not encode modified-file list: {e}"),
            })?;
        self.conn
            .execute(
                "INSERT INTO merge_queue
                 (branch_name, task_id, agent_name, files_modified, enqueued_at, status)
                 VALUES (?1,?2,?3,?4,?5,'pending')",
                params![
                    request.branch_name,
                    request.task_id,
                    request.agent_name,
                    files,
                    format_ts(enqueued_at),
                ],
            )
            .map_err(store_err(DB))?;
        Ok(MergeEntry {
            id: self.conn.last_insert_rowid(),
            branch_name: request.branch_name.clone(),
            task_id: request.task_id.clone(),
            agent_name: request.agent_name.clone(),
            files_modified: request.files_modified.clone(),
            enqueued_at,
            status: MergeStatus::Pending,
            resolved_tier: None,
        })
    }

    /// The lowest-id pending entry, without removing it.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn peek(&self) -> Result<Option<MergeEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM merge_queue
                     WHERE status = 'pending' ORDER BY id ASC LIMIT 1"
                ),
                [],
                row_to_entry,
            )
            .optional()
            .map_err(store_err(DB))
    }

    /// Remove and return the lowest-id pending entry.
    ///
    /// # Errors
    /// Returns a store error on query or delete failure.
    pub fn dequeue(&mut self) -> Result<Option<MergeEntry>> {
        let tx = self.conn.transaction().map_err(store_err(DB))?;
        let entry = tx
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM merge_queue
                     WHERE status = 'pending' ORDER BY id ASC LIMIT 1"
                ),
                [],
                row_to_entry,
            )
            .optional()
            .map_err(store_err(DB))?;
        if let Some(entry) = &entry {
            tx.execute("DELETE FROM merge_queue WHERE id = ?1", params![entry.id])
                .map_err(store_err(DB))?;
        }
        tx.commit().map_err(store_err(DB))?;
        Ok(entry)
    }

    /// Entries, optionally filtered by status, FIFO order.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn list(&self, status: Option<MergeStatus>) -> Result<Vec<MergeEntry>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM merge_queue
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(store_err(DB))?;
        let rows = stmt
            .query_map(params![status.map(MergeStatus::as_str)], row_to_entry)
            .map_err(store_err(DB))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err(DB))?;
        Ok(rows)
    }

    /// Most recent entry for a branch, regardless of status.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get_by_branch(&self, branch: &str) -> Result<Option<MergeEntry>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM merge_queue
                     WHERE branch_name = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![branch],
                row_to_entry,
            )
            .optional()
            .map_err(store_err(DB))
    }

    /// Update the status (and optionally the resolved tier) of the most
    /// recent entry for a branch.
    ///
    /// # Errors
    /// Fails with a "no entry" error when the branch is not in the queue.
    pub fn update_status(
        &self,
        branch: &str,
        status: MergeStatus,
        tier: Option<ResolvedTier>,
    ) -> Result<()> {
        let Some(entry) = self.get_by_branch(branch)? else {
            return Err(OverstoryError::Merge {
                branch: branch.to_owned(),
                conflict_files: vec![],
                detail: "no entry in the merge queue for this branch".to_owned(),
            });
        };
        self.conn
            .execute(
                "UPDATE merge_queue
                 SET status = ?1,
                     resolved_tier = COALESCE(?2, resolved_tier)
                 WHERE id = ?3",
                params![status.as_str(), tier.map(ResolvedTier::as_str), entry.id],
            )
            .map_err(store_err(DB))?;
        Ok(())
    }
}

const COLUMNS: &str =
    "id, branch_name, task_id, agent_name, files_modified, enqueued_at, status, resolved_tier";

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MergeEntry> {
    let files_raw: String = row.get(4)?;
    let files_modified: Vec<String> = serde_json::from_str(&files_raw).map_err(bad_col)?;
    Ok(MergeEntry {
        id: row.get(0)?,
        branch_name: row.get(1)?,
        task_id: row.get(2)?,
        agent_name: row.get(3)?,
        files_modified,
        enqueued_at: parse_ts(&row.get::<_, String>(5)?).map_err(bad_col)?,
        status: row.get::<_, String>(6)?.parse().map_err(bad_col)?,
        resolved_tier: row
            .get::<_, Option<String>>(7)?
            .map(|s| s.parse())
            .transpose()
            .map_err(bad_col)?,
    })
}

// ---------------------------------------------------------------------------
// Migration
// ---------------------------------------------------------------------------

/// Rename a legacy `bead_id` column to `task_id` when present.
///
/// No-op when the table does not exist, already has `task_id`, or never had
/// `bead_id`.
fn migrate_bead_id(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(merge_queue)")
        .map_err(store_err(DB))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(store_err(DB))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_err(DB))?;
    let has_bead = columns.iter().any(|c| c == "bead_id");
    let has_task = columns.iter().any(|c| c == "task_id");
    if has_bead && !has_task {
        conn.execute_batch("ALTER TABLE merge_queue RENAME COLUMN bead_id TO task_id;")
            .map_err(store_err(DB))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
