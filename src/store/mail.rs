//! Durable mail store.
//!
//! `mail.db` holds one row per delivered message. Broadcast sends are
//! expanded before insertion, so every row has a single concrete recipient
//! and per-recipient delivery order is insertion order.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{OverstoryError, Result};
use crate::model::{MailMessage, MessageType, Priority, format_ts, parse_ts};

use super::{bad_col, open_database, store_err};

const DB: &str = "mail";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_agent TEXT NOT NULL,
    to_agent TEXT NOT NULL,
    subject TEXT NOT NULL,
    body TEXT NOT NULL,
    type TEXT NOT NULL
        CHECK (type IN ('status','request','dispatch','worker_done','merge_ready',
                        'error','escalation','merge_failed')),
    priority TEXT NOT NULL CHECK (priority IN ('low','normal','high','urgent')),
    thread_id INTEGER,
    payload TEXT,
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_to ON messages(to_agent, read);
CREATE INDEX IF NOT EXISTS idx_messages_from ON messages(from_agent);
";

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filter for listing messages.
#[derive(Clone, Debug, Default)]
pub struct MailFilter {
    /// Only messages from this agent.
    pub from: Option<String>,
    /// Only messages to this agent.
    pub to: Option<String>,
    /// Only unread messages.
    pub unread_only: bool,
    /// Maximum rows returned.
    pub limit: Option<u32>,
}

/// Filter for bulk deletion.
#[derive(Clone, Debug, Default)]
pub struct PurgeFilter {
    /// Delete everything.
    pub all: bool,
    /// Delete messages older than this many milliseconds.
    pub older_than_ms: Option<u64>,
    /// Delete messages to or from this agent.
    pub agent: Option<String>,
}

// ---------------------------------------------------------------------------
// MailStore
// ---------------------------------------------------------------------------

/// Store over `mail.db`.
pub struct MailStore {
    conn: Connection,
}

/// A message draft ready for insertion.
#[derive(Clone, Debug)]
pub struct MailDraft {
    /// Sending agent.
    pub from: String,
    /// Concrete recipient (groups are expanded by the client layer).
    pub to: String,
    /// One-line summary.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Semantic kind.
    pub message_type: MessageType,
    /// Delivery priority.
    pub priority: Priority,
    /// Id of the message being replied to, if any.
    pub thread_id: Option<i64>,
    /// Optional JSON payload.
    pub payload: Option<String>,
}

impl MailStore {
    /// Open (and create if needed) the mail store at `path`.
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

    /// Insert a message, returning its assigned id.
    ///
    /// # Errors
    /// Rejects drafts with an empty sender or recipient.
    pub fn insert(&self, draft: &MailDraft) -> Result<i64> {
        if draft.from.is_empty() || draft.to.is_empty() {
            return Err(OverstoryError::mail(
                "message sender and recipient must be non-empty",
            ));
        }
        self.conn
            .execute(
                "INSERT INTO messages
                 (from_agent, to_agent, subject, body, type, priority, thread_id,
                  payload, read, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,0,?9)",
                params![
                    draft.from,
                    draft.to,
                    draft.subject,
                    draft.body,
                    draft.message_type.as_str(),
                    draft.priority.as_str(),
                    draft.thread_id,
                    draft.payload,
                    format_ts(Utc::now()),
                ],
            )
            .map_err(store_err(DB))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Fetch a single message by id.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn get(&self, id: i64) -> Result<Option<MailMessage>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
            .map_err(store_err(DB))
    }

    /// Unread messages for a recipient, marking them read in the same
    /// transaction. Delivery order is insertion order.
    ///
    /// # Errors
    /// Returns a store error on query or update failure.
    pub fn take_unread(&mut self, agent: &str) -> Result<Vec<MailMessage>> {
        let tx = self.conn.transaction().map_err(store_err(DB))?;
        let messages = {
            let mut stmt = tx
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM messages
                     WHERE to_agent = ?1 AND read = 0
                     ORDER BY id ASC"
                ))
                .map_err(store_err(DB))?;
            stmt.query_map(params![agent], row_to_message)
                .map_err(store_err(DB))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err(DB))?
        };
        tx.execute(
            "UPDATE messages SET read = 1 WHERE to_agent = ?1 AND read = 0",
            params![agent],
        )
        .map_err(store_err(DB))?;
        tx.commit().map_err(store_err(DB))?;
        Ok(messages
            .into_iter()
            .map(|mut m| {
                m.read = true;
                m
            })
            .collect())
    }

    /// Unread messages for a recipient without marking them.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn peek_unread(&self, agent: &str) -> Result<Vec<MailMessage>> {
        self.select(
            "WHERE to_agent = ?1 AND read = 0 ORDER BY id ASC",
            params![agent],
        )
    }

    /// Mark one message read.
    ///
    /// Idempotent: returns `true` when the flag flipped, `false` when the
    /// message was already read.
    ///
    /// # Errors
    /// Fails when the message does not exist.
    pub fn mark_read(&self, id: i64) -> Result<bool> {
        let Some(message) = self.get(id)? else {
            return Err(OverstoryError::mail(format!("no message with id {id}")));
        };
        if message.read {
            return Ok(false);
        }
        self.conn
            .execute("UPDATE messages SET read = 1 WHERE id = ?1", params![id])
            .map_err(store_err(DB))?;
        Ok(true)
    }

    /// List messages matching a filter, insertion order.
    ///
    /// # Errors
    /// Returns a store error on query failure.
    pub fn list(&self, filter: &MailFilter) -> Result<Vec<MailMessage>> {
        let limit_clause = filter.limit.map_or(String::new(), |n| format!(" LIMIT {n}"));
        let unread = i64::from(filter.unread_only);
        let sql = format!(
            "WHERE (?1 IS NULL OR from_agent = ?1)
               AND (?2 IS NULL OR to_agent = ?2)
               AND (?3 = 0 OR read = 0)
             ORDER BY id ASC{limit_clause}"
        );
        self.select(&sql, params![filter.from, filter.to, unread])
    }

    /// Bulk-delete messages matching a filter, returning the count removed.
    ///
    /// # Errors
    /// Rejects an empty filter (nothing would be selected).
    pub fn purge(&self, filter: &PurgeFilter) -> Result<usize> {
        if !filter.all && filter.older_than_ms.is_none() && filter.agent.is_none() {
            return Err(OverstoryError::mail(
                "purge requires --all, --older-than, or --agent",
            ));
        }
        let mut clauses: Vec<String> = Vec::new();
        if let Some(ms) = filter.older_than_ms {
            let cutoff = Utc::now() - chrono::Duration::milliseconds(ms as i64);
            clauses.push(format!("created_at < '{}'", format_ts(cutoff)));
        }
        if let Some(agent) = &filter.agent {
            let escaped = agent.replace('\'', "''");
            clauses.push(format!(
                "(to_agent = '{escaped}' OR from_agent = '{escaped}')"
            ));
        }
        let sql = if clauses.is_empty() {
            "DELETE FROM messages".to_owned()
        } else {
            format!("DELETE FROM messages WHERE {}", clauses.join(" AND "))
        };
        let deleted = self.conn.execute(&sql, []).map_err(store_err(DB))?;
        Ok(deleted)
    }

    fn select(&self, tail: &str, args: impl rusqlite::Params) -> Result<Vec<MailMessage>> {
        let sql = format!("SELECT {COLUMNS} FROM messages {tail}");
        let mut stmt = self.conn.prepare(&sql).map_err(store_err(DB))?;
        let rows = stmt
            .query_map(args, row_to_message)
            .map_err(store_err(DB))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err(DB))?;
        Ok(rows)
    }
}

const COLUMNS: &str =
    "id, from_agent, to_agent, subject, body, type, priority, thread_id, payload, read, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MailMessage> {
    Ok(MailMessage {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        message_type: row.get::<_, String>(5)?.parse().map_err(bad_col)?,
        priority: row.get::<_, String>(6)?.parse().map_err(bad_col)?,
        thread_id: row.get(7)?,
        payload: row.get(8)?,
        read: row.get::<_, i64>(9)? != 0,
        created_at: parse_ts(&row.get::<_, String>(10)?).map_err(bad_col)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, MailStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MailStore::open(&dir.path().join("mail.db")).unwrap();
        (dir, store)
    }

    fn draft(from: &str, to: &str, subject: &str) -> MailDraft {
        MailDraft {
            from: from.to_owned(),
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: "body".to_owned(),
            message_type: MessageType::Status,
            priority: Priority::Normal,
            thread_id: None,
            payload: None,
        }
    }

    #[test]
    fn insert_and_get_roundtrip() {
        let (_dir, store) = store();
        let id = store.insert(&draft("alice", "bob", "hi")).unwrap();
        let msg = store.get(id).unwrap().unwrap();
        assert_eq!(msg.from, "alice");
        assert_eq!(msg.to, "bob");
        assert_eq!(msg.subject, "hi");
        assert!(!msg.read);
    }

    #[test]
    fn insert_rejects_empty_addresses() {
        let (_dir, store) = store();
        assert!(store.insert(&draft("", "bob", "x")).is_err());
        assert!(store.insert(&draft("alice", "", "x")).is_err());
    }

    #[test]
    fn take_unread_delivers_in_insertion_order_and_marks_read() {
        let (_dir, mut store) = store();
        store.insert(&draft("alice", "bob", "first")).unwrap();
        store.insert(&draft("carol", "bob", "second")).unwrap();
        store.insert(&draft("alice", "dave", "other")).unwrap();

        let delivered = store.take_unread("bob").unwrap();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].subject, "first");
        assert_eq!(delivered[1].subject, "second");
        assert!(delivered.iter().all(|m| m.read));

        // A second check sees nothing.
        assert!(store.take_unread("bob").unwrap().is_empty());
        // Other recipients are untouched.
        assert_eq!(store.peek_unread("dave").unwrap().len(), 1);
    }

    #[test]
    fn mark_read_is_idempotent_and_signals_noop() {
        let (_dir, store) = store();
        let id = store.insert(&draft("alice", "bob", "x")).unwrap();
        assert!(store.mark_read(id).unwrap());
        assert!(!store.mark_read(id).unwrap());
        assert!(store.get(id).unwrap().unwrap().read);
    }

    #[test]
    fn mark_read_unknown_id_fails() {
        let (_dir, store) = store();
        let err = store.mark_read(999).unwrap_err();
        assert_eq!(err.code(), "MAIL");
    }

    #[test]
    fn list_filters_compose() {
        let (_dir, store) = store();
        store.insert(&draft("alice", "bob", "a")).unwrap();
        store.insert(&draft("alice", "carol", "b")).unwrap();
        store.insert(&draft("bob", "carol", "c")).unwrap();

        let from_alice = store
            .list(&MailFilter {
                from: Some("alice".to_owned()),
                ..MailFilter::default()
            })
            .unwrap();
        assert_eq!(from_alice.len(), 2);

        let to_carol_from_bob = store
            .list(&MailFilter {
                from: Some("bob".to_owned()),
                to: Some("carol".to_owned()),
                ..MailFilter::default()
            })
            .unwrap();
        assert_eq!(to_carol_from_bob.len(), 1);
        assert_eq!(to_carol_from_bob[0].subject, "c");

        let limited = store
            .list(&MailFilter {
                limit: Some(1),
                ..MailFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn list_unread_only_excludes_read() {
        let (_dir, store) = store();
        let id = store.insert(&draft("alice", "bob", "a")).unwrap();
        store.insert(&draft("alice", "bob", "b")).unwrap();
        store.mark_read(id).unwrap();

        let unread = store
            .list(&MailFilter {
                to: Some("bob".to_owned()),
                unread_only: true,
                ..MailFilter::default()
            })
            .unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].subject, "b");
    }

    #[test]
    fn purge_all() {
        let (_dir, store) = store();
        store.insert(&draft("alice", "bob", "a")).unwrap();
        store.insert(&draft("alice", "bob", "b")).unwrap();
        let deleted = store
            .purge(&PurgeFilter {
                all: true,
                ..PurgeFilter::default()
            })
            .unwrap();
        assert_eq!(deleted, 2);
        assert!(store.list(&MailFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn purge_by_agent_matches_either_direction() {
        let (_dir, store) = store();
        store.insert(&draft("alice", "bob", "a")).unwrap();
        store.insert(&draft("bob", "carol", "b")).unwrap();
        store.insert(&draft("carol", "dave", "c")).unwrap();
        let deleted = store
            .purge(&PurgeFilter {
                agent: Some("bob".to_owned()),
                ..PurgeFilter::default()
            })
            .unwrap();
        assert_eq!(deleted, 2);
        let left = store.list(&MailFilter::default()).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].from, "carol");
    }

    #[test]
    fn purge_older_than_keeps_recent() {
        let (_dir, store) = store();
        store.insert(&draft("alice", "bob", "fresh")).unwrap();
        // A one-hour horizon keeps the message just inserted.
        let deleted = store
            .purge(&PurgeFilter {
                older_than_ms: Some(3_600_000),
                ..PurgeFilter::default()
            })
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn purge_requires_a_filter() {
        let (_dir, store) = store();
        let err = store.purge(&PurgeFilter::default()).unwrap_err();
        assert_eq!(err.code(), "MAIL");
    }

    #[test]
    fn thread_id_roundtrip() {
        let (_dir, store) = store();
        let first = store.insert(&draft("alice", "bob", "q")).unwrap();
        let mut reply = draft("bob", "alice", "Re: q");
        reply.thread_id = Some(first);
        let id = store.insert(&reply).unwrap();
        assert_eq!(store.get(id).unwrap().unwrap().thread_id, Some(first));
    }
}
