//! Logging: tracing subscriber setup and per-agent NDJSON event logs.
//!
//! The orchestrator logs through `tracing`; verbosity comes from `RUST_LOG`
//! with a config-driven default. Independently of the event database, each
//! agent session gets an authoritative NDJSON log under
//! `logs/{agent}/{session-timestamp}/events.ndjson` — one JSON object per
//! line, append-only, readable without SQLite.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use crate::error::Result;
use crate::model::StoredEvent;
use crate::paths::StatePaths;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks debug over info.
/// Calling twice is harmless (the second install is ignored).
pub fn init(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// AgentLog
// ---------------------------------------------------------------------------

/// Append-only NDJSON log for one agent session.
pub struct AgentLog {
    path: PathBuf,
}

impl AgentLog {
    /// Open (creating directories as needed) the log for an agent session.
    /// `session_stamp` is a filesystem-safe timestamp identifying the
    /// session directory.
    ///
    /// # Errors
    /// Returns an I/O error when the directory cannot be created.
    pub fn open(paths: &StatePaths, agent: &str, session_stamp: &str) -> Result<Self> {
        let dir = paths.agent_log_dir(agent).join(session_stamp);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join("events.ndjson"),
        })
    }

    /// The log file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one event as a single JSON line.
    ///
    /// # Errors
    /// Returns an I/O error when the line cannot be written.
    pub fn append(&self, event: &StoredEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .expect("stored events are always serializable");
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Read all events back (used by log introspection and tests).
    ///
    /// # Errors
    /// Returns an I/O error when the file cannot be read; unparseable lines
    /// are skipped.
    pub fn read_all(&self) -> Result<Vec<StoredEvent>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(contents
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventType;

    fn setup() -> (tempfile::TempDir, StatePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::for_project(dir.path());
        paths.ensure_layout().unwrap();
        (dir, paths)
    }

    #[test]
    fn append_and_read_roundtrip() {
        let (_dir, paths) = setup();
        let log = AgentLog::open(&paths, "alice", "2026-03-01T12-00-00").unwrap();
        let a = StoredEvent::new("alice", EventType::SessionStart);
        let b = StoredEvent::new("alice", EventType::ToolStart).with_tool(
            "Bash",
            Some("{}".to_owned()),
            None,
        );
        log.append(&a).unwrap();
        log.append(&b).unwrap();

        let read = log.read_all().unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].event_type, EventType::SessionStart);
        assert_eq!(read[1].tool_name.as_deref(), Some("Bash"));
    }

    #[test]
    fn log_lives_under_agent_and_stamp() {
        let (_dir, paths) = setup();
        let log = AgentLog::open(&paths, "alice", "stamp-1").unwrap();
        let expected = paths
            .agent_log_dir("alice")
            .join("stamp-1")
            .join("events.ndjson");
        assert_eq!(log.path(), expected.as_path());
    }

    #[test]
    fn unreadable_lines_are_skipped() {
        let (_dir, paths) = setup();
        let log = AgentLog::open(&paths, "alice", "stamp-1").unwrap();
        log.append(&StoredEvent::new("alice", EventType::Custom))
            .unwrap();
        fs::write(
            log.path(),
            format!(
                "{}\nnot json at all\n",
                fs::read_to_string(log.path()).unwrap().trim_end()
            ),
        )
        .unwrap();
        assert_eq!(log.read_all().unwrap().len(), 1);
    }

    #[test]
    fn missing_file_reads_empty() {
        let (_dir, paths) = setup();
        let log = AgentLog::open(&paths, "alice", "stamp-1").unwrap();
        assert!(log.read_all().unwrap().is_empty());
    }
}
