//! SQLite-backed stores.
//!
//! One database file per concern (`sessions.db`, `mail.db`,
//! `merge-queue.db`, `events.db`), all under the project's `.overstory`
//! directory. Multiple agent processes read and write these concurrently
//! through hook helpers, so every connection opens in WAL mode with
//! `synchronous=NORMAL` and a 5-second busy timeout — writers serialize
//! inside SQLite, readers never block writers, and no in-process locking is
//! layered on top.

pub mod events;
pub mod mail;
pub mod merge_queue;
pub mod sessions;

pub use events::{EventQuery, EventStore};
pub use mail::{MailFilter, MailStore, PurgeFilter};
pub use merge_queue::MergeQueue;
pub use sessions::SessionStore;

use std::fs;
use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::{OverstoryError, Result};

/// Busy timeout applied to every connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a database file with the shared pragmas applied.
///
/// Creates the parent directory when needed. The pragma batch mirrors the
/// concurrency contract: WAL journal, NORMAL synchronous, 5 s busy timeout.
pub(crate) fn open_database(path: &Path, db: &'static str) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path).map_err(store_err(db))?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(store_err(db))?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA foreign_keys = ON;",
    )
    .map_err(store_err(db))?;
    Ok(conn)
}

/// Build the per-database error mapper used with `map_err`.
pub(crate) fn store_err(db: &'static str) -> impl Fn(rusqlite::Error) -> OverstoryError {
    move |source| OverstoryError::Store { db, source }
}

/// Wrap a column-conversion failure so it can surface through rusqlite's
/// row-mapping closures.
pub(crate) fn bad_col<E>(err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_database_creates_parent_and_applies_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let conn = open_database(&path, "sessions").unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.exists());
    }

    #[test]
    fn store_err_tags_database_name() {
        let err = store_err("mail")(rusqlite::Error::InvalidQuery);
        assert_eq!(err.code(), "STORE");
        assert!(format!("{err}").contains("mail store error"));
    }
}
