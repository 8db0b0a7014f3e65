//! Merge queue entries, statuses, resolution tiers, and the branch-name
//! convention.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OverstoryError, Result};

/// Branch prefix for all agent branches.
pub const BRANCH_PREFIX: &str = "overstory";

// ---------------------------------------------------------------------------
// MergeStatus
// ---------------------------------------------------------------------------

/// Status of a merge-queue entry.
///
/// Transitions: `pending → merging → {merged | conflict | failed}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStatus {
    /// Waiting in the queue.
    Pending,
    /// The resolver is working on it.
    Merging,
    /// Landed on the canonical branch.
    Merged,
    /// All enabled tiers failed with conflicts remaining.
    Conflict,
    /// Failed for a reason other than conflicts.
    Failed,
}

impl MergeStatus {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Merging => "merging",
            Self::Merged => "merged",
            Self::Conflict => "conflict",
            Self::Failed => "failed",
        }
    }

    /// Whether this status may move to `next` under the entry state machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Merging)
                | (
                    Self::Merging,
                    Self::Merged | Self::Conflict | Self::Failed
                )
        )
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStatus {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "merging" => Ok(Self::Merging),
            "merged" => Ok(Self::Merged),
            "conflict" => Ok(Self::Conflict),
            "failed" => Ok(Self::Failed),
            other => Err(OverstoryError::validation(
                "merge status",
                other,
                "expected one of: pending, merging, merged, conflict, failed",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ResolvedTier
// ---------------------------------------------------------------------------

/// The escalation-ladder step that settled a merge (or was the last one
/// attempted before giving up).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolvedTier {
    /// `git merge` succeeded with no conflicts.
    CleanMerge,
    /// Conflict blocks rewritten keeping the incoming side.
    AutoResolve,
    /// The LLM produced resolved file contents.
    AiResolve,
    /// Both sides handed to the LLM for full reconciliation.
    Reimagine,
}

impl ResolvedTier {
    /// Ladder order, lowest first.
    pub const LADDER: [Self; 4] = [
        Self::CleanMerge,
        Self::AutoResolve,
        Self::AiResolve,
        Self::Reimagine,
    ];

    /// Canonical kebab-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CleanMerge => "clean-merge",
            Self::AutoResolve => "auto-resolve",
            Self::AiResolve => "ai-resolve",
            Self::Reimagine => "reimagine",
        }
    }
}

impl fmt::Display for ResolvedTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolvedTier {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "clean-merge" => Ok(Self::CleanMerge),
            "auto-resolve" => Ok(Self::AutoResolve),
            "ai-resolve" => Ok(Self::AiResolve),
            "reimagine" => Ok(Self::Reimagine),
            other => Err(OverstoryError::validation(
                "resolution tier",
                other,
                "expected one of: clean-merge, auto-resolve, ai-resolve, reimagine",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// MergeEntry
// ---------------------------------------------------------------------------

/// A completed branch awaiting merge.
///
/// FIFO order is the store's autoincrement `id`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MergeEntry {
    /// Store-assigned id; pop order strictly follows it.
    pub id: i64,
    /// Branch to merge.
    pub branch_name: String,
    /// Task the branch implements.
    pub task_id: String,
    /// Agent that produced the branch.
    pub agent_name: String,
    /// Files the branch modified relative to canonical.
    pub files_modified: Vec<String>,
    /// When the entry joined the queue.
    pub enqueued_at: DateTime<Utc>,
    /// Queue status.
    pub status: MergeStatus,
    /// Set once a tier settled (or was the last attempted for) this entry.
    pub resolved_tier: Option<ResolvedTier>,
}

// ---------------------------------------------------------------------------
// Branch-name convention
// ---------------------------------------------------------------------------

/// Render the branch name for an agent/task pair:
/// `overstory/{agent}/{task}`.
#[must_use]
pub fn branch_name(agent: &str, task_id: &str) -> String {
    format!("{BRANCH_PREFIX}/{agent}/{task_id}")
}

/// Parse a branch name of the convention, returning `(agent, task_id)`.
///
/// Accepts the pattern strictly: the literal prefix, then a non-empty agent
/// segment, then a non-empty task id (which may itself contain slashes).
#[must_use]
pub fn parse_branch_name(branch: &str) -> Option<(&str, &str)> {
    let rest = branch.strip_prefix(BRANCH_PREFIX)?.strip_prefix('/')?;
    let (agent, task_id) = rest.split_once('/')?;
    if agent.is_empty() || task_id.is_empty() {
        return None;
    }
    Some((agent, task_id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
