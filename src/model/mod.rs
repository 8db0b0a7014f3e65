//! Overstory core data model.
//!
//! Plain data types shared by the stores, the spawn coordinator, the merge
//! resolver, and the watchdog. Every enumeration here is closed: values are
//! checked at the boundary (CLI, config, database row) and invalid values
//! never circulate inside the core.

pub mod event;
pub mod mail;
pub mod merge;
pub mod session;

pub use event::{EventLevel, EventType, StoredEvent};
pub use mail::{MailMessage, MessageType, Priority, triggers_nudge};
pub use merge::{MergeEntry, MergeStatus, ResolvedTier, branch_name, parse_branch_name};
pub use session::{AgentSession, Capability, Run, RunStatus, SessionState, validate_agent_name};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{OverstoryError, Result};

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Render a timestamp the way it is stored: ISO-8601 UTC with millisecond
/// precision (`2026-03-01T12:00:00.000Z`).
///
/// The fixed width keeps lexicographic and chronological order identical,
/// which the stores rely on for `ORDER BY created_at`.
#[must_use]
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp.
///
/// # Errors
/// Returns a validation error for anything that is not RFC 3339.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OverstoryError::validation("timestamp", raw, e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_ts_has_millis_and_zulu() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(format_ts(ts), "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn ts_roundtrip() {
        let now = Utc::now();
        let parsed = parse_ts(&format_ts(now)).unwrap();
        // Millisecond precision at rest.
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn parse_ts_rejects_garbage() {
        let err = parse_ts("yesterday-ish").unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn format_ts_sorts_chronologically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let b = a + chrono::Duration::milliseconds(1);
        assert!(format_ts(a) < format_ts(b));
    }
}
