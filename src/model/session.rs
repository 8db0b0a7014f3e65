//! Agent sessions, capabilities, and runs.
//!
//! An [`AgentSession`] is the registry row for one running agent: its
//! identity, execution environment (worktree + branch + tmux session), place
//! in the spawn hierarchy, and health state. A [`Run`] groups the sessions of
//! one swarm invocation.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{OverstoryError, Result};

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// The role an agent plays in the fleet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// Coordinates a subtree of workers; the only top-level capability.
    Lead,
    /// Writes code.
    Builder,
    /// Read-only exploration and research.
    Scout,
    /// Read-only code review.
    Reviewer,
    /// Drives the merge queue.
    Merger,
    /// Long-lived swarm coordinator.
    Coordinator,
    /// Long-lived observer.
    Monitor,
    /// Project-defined role from the agent manifest.
    Custom,
}

impl Capability {
    /// All capabilities, in display order.
    pub const ALL: [Self; 8] = [
        Self::Lead,
        Self::Builder,
        Self::Scout,
        Self::Reviewer,
        Self::Merger,
        Self::Coordinator,
        Self::Monitor,
        Self::Custom,
    ];

    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Builder => "builder",
            Self::Scout => "scout",
            Self::Reviewer => "reviewer",
            Self::Merger => "merger",
            Self::Coordinator => "coordinator",
            Self::Monitor => "monitor",
            Self::Custom => "custom",
        }
    }

    /// Plural group-address form (`builders`, `scouts`, ...).
    #[must_use]
    pub fn plural(self) -> String {
        format!("{}s", self.as_str())
    }

    /// Persistent capabilities stay resident for a whole run and never
    /// receive the mail that would flip them out of `booting` themselves.
    #[must_use]
    pub const fn is_persistent(self) -> bool {
        matches!(self, Self::Coordinator | Self::Monitor)
    }

    /// Read-only capabilities get Write/Edit tools blocked at spawn time.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::Scout | Self::Reviewer)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lead" => Ok(Self::Lead),
            "builder" => Ok(Self::Builder),
            "scout" => Ok(Self::Scout),
            "reviewer" => Ok(Self::Reviewer),
            "merger" => Ok(Self::Merger),
            "coordinator" => Ok(Self::Coordinator),
            "monitor" => Ok(Self::Monitor),
            "custom" => Ok(Self::Custom),
            other => Err(OverstoryError::validation(
                "capability",
                other,
                "expected one of: lead, builder, scout, reviewer, merger, coordinator, monitor, custom",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Health state of a session.
///
/// `Completed` and `Zombie` are terminal: a session in either state is never
/// mutated again and only serves history queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Spawned but no tool activity observed yet.
    Booting,
    /// Actively reporting tool activity.
    Working,
    /// Alive but past the staleness threshold.
    Stalled,
    /// Terminal session died or inactivity passed the zombie threshold.
    Zombie,
    /// Finished cleanly.
    Completed,
}

impl SessionState {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Booting => "booting",
            Self::Working => "working",
            Self::Stalled => "stalled",
            Self::Zombie => "zombie",
            Self::Completed => "completed",
        }
    }

    /// Terminal states admit no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Zombie | Self::Completed)
    }

    /// Active states count against concurrency caps and name uniqueness.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Booting | Self::Working | Self::Stalled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionState {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "booting" => Ok(Self::Booting),
            "working" => Ok(Self::Working),
            "stalled" => Ok(Self::Stalled),
            "zombie" => Ok(Self::Zombie),
            "completed" => Ok(Self::Completed),
            other => Err(OverstoryError::validation(
                "session state",
                other,
                "expected one of: booting, working, stalled, zombie, completed",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// AgentSession
// ---------------------------------------------------------------------------

/// One running agent, as recorded in the session registry.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AgentSession {
    /// Stable unique id.
    pub id: String,
    /// Agent name, unique among active sessions in a project.
    pub agent_name: String,
    /// The agent's role.
    pub capability: Capability,
    /// Isolated working copy.
    pub worktree_path: PathBuf,
    /// Branch the agent commits to (`overstory/{agent}/{task}`).
    pub branch_name: String,
    /// Tracked work item this agent is bound to.
    pub task_id: String,
    /// Detached terminal session hosting the agent process.
    pub tmux_session: String,
    /// Current health state.
    pub state: SessionState,
    /// Agent process id; `None` after termination.
    pub pid: Option<u32>,
    /// Spawning agent; `None` for top-level agents.
    pub parent_agent: Option<String>,
    /// Distance from the top of the spawn tree.
    pub depth: u32,
    /// Run this session belongs to, if a run is active.
    pub run_id: Option<String>,
    /// Spawn time.
    pub started_at: DateTime<Utc>,
    /// Last observed activity.
    pub last_activity: DateTime<Utc>,
    /// How many times the watchdog escalated this session.
    pub escalation_level: u32,
    /// Set while (and only while) the session is stalled.
    pub stalled_since: Option<DateTime<Utc>>,
}

impl AgentSession {
    /// Create a fresh `booting` session with a generated id.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_name: impl Into<String>,
        capability: Capability,
        worktree_path: PathBuf,
        branch_name: impl Into<String>,
        task_id: impl Into<String>,
        tmux_session: impl Into<String>,
        parent_agent: Option<String>,
        depth: u32,
        run_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            capability,
            worktree_path,
            branch_name: branch_name.into(),
            task_id: task_id.into(),
            tmux_session: tmux_session.into(),
            state: SessionState::Booting,
            pid: None,
            parent_agent,
            depth,
            run_id,
            started_at: now,
            last_activity: now,
            escalation_level: 0,
            stalled_since: None,
        }
    }

    /// Check structural invariants: depth 0 iff top-level, stalled-since
    /// present iff stalled.
    ///
    /// # Errors
    /// Returns a validation error naming the violated invariant.
    pub fn check_invariants(&self) -> Result<()> {
        if (self.depth == 0) != self.parent_agent.is_none() {
            return Err(OverstoryError::validation(
                "session depth",
                self.depth.to_string(),
                "depth must be 0 exactly when the session has no parent",
            ));
        }
        if (self.state == SessionState::Stalled) != self.stalled_since.is_some() {
            return Err(OverstoryError::validation(
                "stalled_since",
                format!("{:?}", self.stalled_since),
                "stalled_since must be set exactly while state is stalled",
            ));
        }
        Ok(())
    }
}

/// Validate an agent name: lowercase alphanumeric with hyphens, 1-64 chars.
///
/// Names become branch components, directory names, and tmux session names,
/// so the grammar is the intersection of what all three accept.
///
/// # Errors
/// Returns a validation error describing the first problem found.
pub fn validate_agent_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(OverstoryError::validation(
            "agent name",
            name,
            "must be 1-64 characters",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(OverstoryError::validation(
            "agent name",
            name,
            "must be lowercase alphanumeric with hyphens",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(OverstoryError::validation(
            "agent name",
            name,
            "must not start or end with a hyphen",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Status of a swarm run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Sessions may still be spawned into this run.
    Active,
    /// The run has been closed out.
    Completed,
}

impl RunStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(OverstoryError::validation(
                "run status",
                other,
                "expected 'active' or 'completed'",
            )),
        }
    }
}

/// One swarm invocation grouping a set of sessions.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Run {
    /// Run id (referenced by `current-run.txt`).
    pub id: String,
    /// When the run was created.
    pub started_at: DateTime<Utc>,
    /// When the run was closed out, if it has been.
    pub completed_at: Option<DateTime<Utc>>,
    /// Number of sessions spawned into the run.
    pub agent_count: u32,
    /// Session id of the coordinator driving the run, if any.
    pub coordinator_session_id: Option<String>,
    /// Current status.
    pub status: RunStatus,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> AgentSession {
        AgentSession::new(
            "alice",
            Capability::Builder,
            PathBuf::from("/proj/.overstory/worktrees/alice"),
            "overstory/alice/t-1",
            "t-1",
            "overstory-proj-alice",
            Some("lead-1".to_owned()),
            1,
            None,
        )
    }

    // -- Capability --

    #[test]
    fn capability_roundtrip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
        }
    }

    #[test]
    fn capability_parse_rejects_unknown() {
        let err = "wizard".parse::<Capability>().unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        assert!(format!("{err}").contains("lead"));
    }

    #[test]
    fn capability_plural() {
        assert_eq!(Capability::Builder.plural(), "builders");
        assert_eq!(Capability::Scout.plural(), "scouts");
    }

    #[test]
    fn persistent_capabilities() {
        assert!(Capability::Coordinator.is_persistent());
        assert!(Capability::Monitor.is_persistent());
        assert!(!Capability::Lead.is_persistent());
        assert!(!Capability::Builder.is_persistent());
    }

    #[test]
    fn read_only_capabilities() {
        assert!(Capability::Scout.is_read_only());
        assert!(Capability::Reviewer.is_read_only());
        assert!(!Capability::Builder.is_read_only());
        assert!(!Capability::Merger.is_read_only());
    }

    // -- SessionState --

    #[test]
    fn state_roundtrip() {
        for state in [
            SessionState::Booting,
            SessionState::Working,
            SessionState::Stalled,
            SessionState::Zombie,
            SessionState::Completed,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
    }

    #[test]
    fn terminal_and_active_are_disjoint() {
        for state in [
            SessionState::Booting,
            SessionState::Working,
            SessionState::Stalled,
            SessionState::Zombie,
            SessionState::Completed,
        ] {
            assert!(
                state.is_terminal() != state.is_active(),
                "{state} must be exactly one of terminal/active"
            );
        }
    }

    // -- AgentSession --

    #[test]
    fn new_session_is_booting_with_fresh_id() {
        let a = sample_session();
        let b = sample_session();
        assert_eq!(a.state, SessionState::Booting);
        assert_eq!(a.escalation_level, 0);
        assert!(a.stalled_since.is_none());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn invariants_hold_for_fresh_session() {
        sample_session().check_invariants().unwrap();
    }

    #[test]
    fn invariant_depth_zero_requires_no_parent() {
        let mut s = sample_session();
        s.depth = 0;
        let err = s.check_invariants().unwrap_err();
        assert!(format!("{err}").contains("depth"));
    }

    #[test]
    fn invariant_parentless_requires_depth_zero() {
        let mut s = sample_session();
        s.parent_agent = None;
        assert!(s.check_invariants().is_err());
        s.depth = 0;
        s.check_invariants().unwrap();
    }

    #[test]
    fn invariant_stalled_since_tracks_state() {
        let mut s = sample_session();
        s.state = SessionState::Stalled;
        assert!(s.check_invariants().is_err());
        s.stalled_since = Some(Utc::now());
        s.check_invariants().unwrap();
        s.state = SessionState::Working;
        assert!(s.check_invariants().is_err());
    }

    // -- agent names --

    #[test]
    fn valid_agent_names() {
        for name in ["alice", "agent-1", "b0b", "x"] {
            validate_agent_name(name).unwrap();
        }
    }

    #[test]
    fn invalid_agent_names() {
        for name in ["", "Alice", "has space", "-lead", "tail-", "a_b"] {
            assert!(
                validate_agent_name(name).is_err(),
                "'{name}' should be rejected"
            );
        }
    }

    #[test]
    fn overlong_agent_name_rejected() {
        let name = "a".repeat(65);
        assert!(validate_agent_name(&name).is_err());
        let name = "a".repeat(64);
        validate_agent_name(&name).unwrap();
    }

    // -- RunStatus --

    #[test]
    fn run_status_roundtrip() {
        for status in [RunStatus::Active, RunStatus::Completed] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
    }
}
