//! Watchdog: periodic health evaluation and state reconciliation.
//!
//! Each sweep examines every active session and derives a health state from
//! terminal liveness and activity thresholds:
//!
//! - tmux session gone → `zombie`
//! - persistent capability (coordinator, monitor) still `booting` with a
//!   live terminal → `working` (nobody mails them awake)
//! - inactivity past the zombie threshold → `zombie`
//! - inactivity past the stale threshold → `stalled`
//! - otherwise the observed state stands
//!
//! Derived transitions apply only when they differ from the stored state,
//! and every store write is best-effort: a watchdog that trips over one
//! session keeps sweeping the rest.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::WatchdogConfig;
use crate::error::Result;
use crate::model::{AgentSession, EventLevel, EventType, SessionState, StoredEvent};
use crate::paths::StatePaths;
use crate::store::{EventStore, SessionStore};
use crate::tmux::Tmux;

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Derive the health state for one session.
///
/// Returns `Some(new_state)` only when the derived state differs from the
/// stored one. Terminal sessions always evaluate to `None`.
#[must_use]
pub fn evaluate(
    session: &AgentSession,
    tmux_alive: bool,
    now: DateTime<Utc>,
    config: &WatchdogConfig,
) -> Option<SessionState> {
    if session.state.is_terminal() {
        return None;
    }

    let derived = if !tmux_alive {
        SessionState::Zombie
    } else if session.capability.is_persistent() && session.state == SessionState::Booting {
        SessionState::Working
    } else {
        let idle_ms = (now - session.last_activity).num_milliseconds().max(0) as u64;
        if config.tier2_enabled && idle_ms > config.zombie_threshold_ms {
            SessionState::Zombie
        } else if config.tier1_enabled && idle_ms > config.stale_threshold_ms {
            SessionState::Stalled
        } else {
            session.state
        }
    };

    (derived != session.state).then_some(derived)
}

// ---------------------------------------------------------------------------
// Watchdog
// ---------------------------------------------------------------------------

/// One applied transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Agent whose session moved.
    pub agent_name: String,
    /// Previous state.
    pub from: SessionState,
    /// New state.
    pub to: SessionState,
}

/// Result of one sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions examined.
    pub examined: usize,
    /// Transitions applied.
    pub transitions: Vec<Transition>,
}

/// The watchdog over one project's session registry.
pub struct Watchdog {
    paths: StatePaths,
    config: WatchdogConfig,
}

impl Watchdog {
    /// Build a watchdog for a project.
    #[must_use]
    pub fn new(paths: StatePaths, config: WatchdogConfig) -> Self {
        Self { paths, config }
    }

    /// One sweep using real tmux liveness.
    ///
    /// # Errors
    /// Only store-open failures propagate; per-session problems are logged
    /// and skipped.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.sweep_with(|name| Tmux::is_session_alive(name))
    }

    /// One sweep with injected liveness (tests stub this).
    ///
    /// # Errors
    /// Only store-open failures propagate.
    pub fn sweep_with(&self, liveness: impl Fn(&str) -> bool) -> Result<SweepReport> {
        let sessions = SessionStore::open(&self.paths.sessions_db())?;
        let events = EventStore::open(&self.paths.events_db()).ok();
        let active = sessions.get_active()?;
        let now = Utc::now();

        let mut report = SweepReport {
            examined: active.len(),
            ..SweepReport::default()
        };

        for session in &active {
            let alive = liveness(&session.tmux_session);
            let Some(new_state) = evaluate(session, alive, now, &self.config) else {
                continue;
            };
            match sessions.update_state(&session.agent_name, new_state) {
                Ok(()) => {
                    tracing::info!(
                        agent = %session.agent_name,
                        from = %session.state,
                        to = %new_state,
                        "watchdog transition"
                    );
                    if new_state == SessionState::Zombie {
                        if let Some(events) = &events {
                            let draft = StoredEvent::new(&session.agent_name, EventType::Error)
                                .with_session(session.id.clone())
                                .with_run(session.run_id.clone())
                                .with_level(EventLevel::Warn)
                                .with_data(format!(
                                    "{{\"watchdog\":\"zombie\",\"was\":\"{}\"}}",
                                    session.state
                                ));
                            let _ = events.insert(&draft);
                        }
                    }
                    report.transitions.push(Transition {
                        agent_name: session.agent_name.clone(),
                        from: session.state,
                        to: new_state,
                    });
                }
                Err(err) => {
                    tracing::warn!(agent = %session.agent_name, %err, "watchdog update failed");
                }
            }
        }
        Ok(report)
    }

    /// Run sweeps forever at the configured interval.
    ///
    /// # Errors
    /// Propagates only store-open failures from the first sweep; later
    /// failures are logged and the loop keeps going.
    pub fn run_loop(&self) -> Result<()> {
        let interval = Duration::from_millis(self.config.tier0_interval_ms.max(1000));
        loop {
            match self.sweep() {
                Ok(report) if !report.transitions.is_empty() => {
                    tracing::info!(
                        transitions = report.transitions.len(),
                        examined = report.examined,
                        "watchdog sweep"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "watchdog sweep failed"),
            }
            std::thread::sleep(interval);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
