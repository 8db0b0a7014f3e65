//! Pending-nudge markers.
//!
//! When an urgent message is sent, a single marker file is written under
//! `pending-nudges/` keyed by recipient. The marker is *not* delivered by
//! injecting keystrokes into the recipient's terminal — that corrupts
//! running tool I/O. Instead, the recipient's next `mail check --inject`
//! consumes the marker and prepends a priority banner to its inbox output.
//!
//! At most one marker exists per recipient: a newer nudge overwrites an
//! older one (last writer wins, like every JSON state file here).

use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{MessageType, Priority};
use crate::paths::StatePaths;

// ---------------------------------------------------------------------------
// NudgeMarker
// ---------------------------------------------------------------------------

/// The marker left for a recipient with urgent unread mail.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NudgeMarker {
    /// Who sent the triggering message.
    pub from: String,
    /// Subject of the triggering message.
    pub subject: String,
    /// Its semantic type.
    pub message_type: MessageType,
    /// Its priority.
    pub priority: Priority,
    /// When the nudge was recorded.
    pub created_at: DateTime<Utc>,
}

impl NudgeMarker {
    /// Render the one-line banner prepended to the inbox block.
    #[must_use]
    pub fn banner(&self) -> String {
        format!(
            "[PRIORITY] {} mail from {}: {} — read your inbox below before continuing.",
            self.message_type, self.from, self.subject
        )
    }
}

/// Record a nudge for `recipient`, replacing any existing marker.
///
/// Also updates the last-nudge bookkeeping in `nudge-state.json`
/// (last-writer-wins; the watchdog reads it to pace repeat nudges).
///
/// # Errors
/// Returns an I/O error when the marker cannot be written.
pub fn write_nudge(paths: &StatePaths, recipient: &str, marker: &NudgeMarker) -> Result<()> {
    fs::create_dir_all(paths.pending_nudges_dir())?;
    let encoded = serde_json::to_string_pretty(marker)
        .expect("nudge markers are always serializable");
    fs::write(paths.nudge_marker(recipient), encoded)?;
    record_nudge_time(paths, recipient, marker.created_at);
    Ok(())
}

/// Update the per-recipient last-nudge timestamp. Best-effort bookkeeping.
fn record_nudge_time(paths: &StatePaths, recipient: &str, at: DateTime<Utc>) {
    let state_file = paths.nudge_state_file();
    let mut state: std::collections::BTreeMap<String, DateTime<Utc>> =
        fs::read_to_string(&state_file)
            .ok()
            .and_then(|c| serde_json::from_str(&c).ok())
            .unwrap_or_default();
    state.insert(recipient.to_owned(), at);
    if let Ok(encoded) = serde_json::to_string_pretty(&state) {
        let _ = fs::write(&state_file, encoded);
    }
}

/// The last time a nudge was recorded for `recipient`, if any.
#[must_use]
pub fn last_nudge_time(paths: &StatePaths, recipient: &str) -> Option<DateTime<Utc>> {
    let state: std::collections::BTreeMap<String, DateTime<Utc>> =
        serde_json::from_str(&fs::read_to_string(paths.nudge_state_file()).ok()?).ok()?;
    state.get(recipient).copied()
}

/// Consume the pending nudge for `recipient`, removing the marker file.
///
/// A missing or unreadable marker yields `None`; a corrupt marker is removed
/// and dropped rather than wedging the inbox.
#[must_use]
pub fn take_nudge(paths: &StatePaths, recipient: &str) -> Option<NudgeMarker> {
    let path = paths.nudge_marker(recipient);
    let contents = fs::read_to_string(&path).ok()?;
    let _ = fs::remove_file(&path);
    match serde_json::from_str(&contents) {
        Ok(marker) => Some(marker),
        Err(err) => {
            tracing::warn!(recipient, %err, "dropping corrupt nudge marker");
            None
        }
    }
}

/// Whether a nudge is pending for `recipient`, without consuming it.
#[must_use]
pub fn has_pending_nudge(paths: &StatePaths, recipient: &str) -> bool {
    paths.nudge_marker(recipient).is_file()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, StatePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::for_project(dir.path());
        paths.ensure_layout().unwrap();
        (dir, paths)
    }

    fn marker(from: &str, subject: &str) -> NudgeMarker {
        NudgeMarker {
            from: from.to_owned(),
            subject: subject.to_owned(),
            message_type: MessageType::WorkerDone,
            priority: Priority::High,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn write_and_take_roundtrip() {
        let (_dir, paths) = setup();
        let m = marker("bob", "done with t-1");
        write_nudge(&paths, "alice", &m).unwrap();
        assert!(has_pending_nudge(&paths, "alice"));

        let taken = take_nudge(&paths, "alice").unwrap();
        assert_eq!(taken, m);
        // Consumed: the marker file is gone.
        assert!(!has_pending_nudge(&paths, "alice"));
        assert!(take_nudge(&paths, "alice").is_none());
    }

    #[test]
    fn newer_nudge_overwrites_older() {
        let (_dir, paths) = setup();
        write_nudge(&paths, "alice", &marker("bob", "first")).unwrap();
        write_nudge(&paths, "alice", &marker("carol", "second")).unwrap();

        let taken = take_nudge(&paths, "alice").unwrap();
        assert_eq!(taken.from, "carol");
        assert_eq!(taken.subject, "second");
    }

    #[test]
    fn markers_are_per_recipient() {
        let (_dir, paths) = setup();
        write_nudge(&paths, "alice", &marker("bob", "x")).unwrap();
        assert!(!has_pending_nudge(&paths, "bob"));
        assert!(take_nudge(&paths, "bob").is_none());
        assert!(has_pending_nudge(&paths, "alice"));
    }

    #[test]
    fn corrupt_marker_is_dropped_not_fatal() {
        let (_dir, paths) = setup();
        fs::write(paths.nudge_marker("alice"), "not json {{{").unwrap();
        assert!(take_nudge(&paths, "alice").is_none());
        assert!(!has_pending_nudge(&paths, "alice"));
    }

    #[test]
    fn banner_mentions_type_sender_and_subject() {
        let banner = marker("bob", "merge t-3").banner();
        assert!(banner.contains("worker_done"));
        assert!(banner.contains("bob"));
        assert!(banner.contains("merge t-3"));
    }

    #[test]
    fn nudge_bookkeeping_tracks_latest_per_recipient() {
        let (_dir, paths) = setup();
        assert_eq!(last_nudge_time(&paths, "alice"), None);

        let first = marker("bob", "one");
        write_nudge(&paths, "alice", &first).unwrap();
        assert_eq!(last_nudge_time(&paths, "alice"), Some(first.created_at));

        let second = marker("carol", "two");
        write_nudge(&paths, "alice", &second).unwrap();
        assert_eq!(last_nudge_time(&paths, "alice"), Some(second.created_at));
        // Other recipients stay untracked.
        assert_eq!(last_nudge_time(&paths, "bob"), None);
    }
}
