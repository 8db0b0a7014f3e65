//! Spawn pacing: stagger delay and per-run session caps.

use chrono::{DateTime, Utc};

use crate::model::AgentSession;

/// Remaining milliseconds to wait before the next spawn.
///
/// The delay is measured from the most recently started active session:
/// `max(0, delay_ms − (now − newest started_at))`. No delay when pacing is
/// disabled (`delay_ms ≤ 0`), when nothing is running, or when the newest
/// session is already old enough.
#[must_use]
pub fn calculate_stagger_delay(
    delay_ms: i64,
    sessions: &[AgentSession],
    now: DateTime<Utc>,
) -> u64 {
    if delay_ms <= 0 {
        return 0;
    }
    let Some(newest) = sessions.iter().map(|s| s.started_at).max() else {
        return 0;
    };
    let elapsed_ms = (now - newest).num_milliseconds();
    let remaining = delay_ms - elapsed_ms;
    remaining.max(0) as u64
}

/// Whether a run has reached its session cap. A `limit` of 0 means
/// unlimited.
#[must_use]
pub const fn check_run_session_limit(limit: u32, count: u32) -> bool {
    limit > 0 && count >= limit
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Capability;
    use std::path::PathBuf;

    fn session_started_at(started_at: DateTime<Utc>) -> AgentSession {
        let mut s = AgentSession::new(
            "a",
            Capability::Builder,
            PathBuf::from("/wt/a"),
            "overstory/a/t-1",
            "t-1",
            "overstory-p-a",
            Some("lead".to_owned()),
            1,
            None,
        );
        s.started_at = started_at;
        s
    }

    #[test]
    fn zero_or_negative_delay_never_waits() {
        let now = Utc::now();
        let sessions = vec![session_started_at(now)];
        assert_eq!(calculate_stagger_delay(0, &sessions, now), 0);
        assert_eq!(calculate_stagger_delay(-500, &sessions, now), 0);
    }

    #[test]
    fn empty_session_set_never_waits() {
        assert_eq!(calculate_stagger_delay(2000, &[], Utc::now()), 0);
    }

    #[test]
    fn elapsed_beyond_delay_never_waits() {
        let now = Utc::now();
        let sessions = vec![session_started_at(now - chrono::Duration::milliseconds(5000))];
        assert_eq!(calculate_stagger_delay(2000, &sessions, now), 0);
    }

    #[test]
    fn partial_elapsed_waits_the_remainder() {
        let now = Utc::now();
        let sessions = vec![session_started_at(now - chrono::Duration::milliseconds(500))];
        assert_eq!(calculate_stagger_delay(2000, &sessions, now), 1500);
    }

    #[test]
    fn newest_session_governs() {
        let now = Utc::now();
        let sessions = vec![
            session_started_at(now - chrono::Duration::milliseconds(10_000)),
            session_started_at(now - chrono::Duration::milliseconds(100)),
        ];
        assert_eq!(calculate_stagger_delay(2000, &sessions, now), 1900);
    }

    #[test]
    fn simultaneous_spawn_waits_full_delay() {
        let now = Utc::now();
        let sessions = vec![session_started_at(now)];
        assert_eq!(calculate_stagger_delay(2000, &sessions, now), 2000);
    }

    #[test]
    fn run_session_limit_boundary() {
        assert!(!check_run_session_limit(0, 100)); // 0 = unlimited
        assert!(!check_run_session_limit(5, 4));
        assert!(check_run_session_limit(5, 5));
        assert!(check_run_session_limit(5, 6));
        assert!(check_run_session_limit(1, 1));
    }
}
