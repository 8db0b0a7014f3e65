//! State-directory layout for an Overstory project.
//!
//! All runtime state lives under `{project}/.overstory`. This module is the
//! single place that knows the layout; everything else asks [`StatePaths`]
//! instead of joining path segments by hand.
//!
//! ```text
//! .overstory/
//!   config.yaml            configuration
//!   current-run.txt        optional: active run id (one line)
//!   session-branch.txt     optional: orchestrator's current branch
//!   sessions.db            session registry + runs table
//!   mail.db                mail messages
//!   merge-queue.db         merge queue
//!   events.db              append-only event log
//!   metrics.db             session metrics (read-only here)
//!   logs/{agent}/{ts}/events.ndjson
//!   specs/{task-id}.md
//!   agents/{name}/identity.yaml
//!   agents/{name}/checkpoint.json
//!   agents/{name}/handoffs.json
//!   pending-nudges/{agent}.json
//!   nudge-state.json
//!   mail-check-state.json
//!   worktrees/{agent}
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the hidden state directory under the project root.
pub const STATE_DIR_NAME: &str = ".overstory";

// ---------------------------------------------------------------------------
// StatePaths
// ---------------------------------------------------------------------------

/// Resolved paths for a project's `.overstory` state directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Build the path set for a project root.
    ///
    /// Does not touch the filesystem; use [`StatePaths::ensure_layout`] to
    /// create the directory tree.
    #[must_use]
    pub fn for_project(project_root: &Path) -> Self {
        Self {
            root: project_root.join(STATE_DIR_NAME),
        }
    }

    /// The `.overstory` directory itself.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.root
    }

    /// `config.yaml`.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.yaml")
    }

    /// `current-run.txt` — single line holding the active run id.
    #[must_use]
    pub fn current_run_file(&self) -> PathBuf {
        self.root.join("current-run.txt")
    }

    /// `session-branch.txt` — the orchestrator's branch at prime time.
    #[must_use]
    pub fn session_branch_file(&self) -> PathBuf {
        self.root.join("session-branch.txt")
    }

    /// `sessions.db`.
    #[must_use]
    pub fn sessions_db(&self) -> PathBuf {
        self.root.join("sessions.db")
    }

    /// `mail.db`.
    #[must_use]
    pub fn mail_db(&self) -> PathBuf {
        self.root.join("mail.db")
    }

    /// `merge-queue.db`.
    #[must_use]
    pub fn merge_queue_db(&self) -> PathBuf {
        self.root.join("merge-queue.db")
    }

    /// `events.db`.
    #[must_use]
    pub fn events_db(&self) -> PathBuf {
        self.root.join("events.db")
    }

    /// `metrics.db` — written by the metrics collector, read-only here.
    #[must_use]
    pub fn metrics_db(&self) -> PathBuf {
        self.root.join("metrics.db")
    }

    /// `logs/{agent}` — parent of the per-session NDJSON directories.
    #[must_use]
    pub fn agent_log_dir(&self, agent: &str) -> PathBuf {
        self.root.join("logs").join(agent)
    }

    /// `specs/{task_id}.md`.
    #[must_use]
    pub fn spec_file(&self, task_id: &str) -> PathBuf {
        self.root.join("specs").join(format!("{task_id}.md"))
    }

    /// `specs/` directory.
    #[must_use]
    pub fn specs_dir(&self) -> PathBuf {
        self.root.join("specs")
    }

    /// `agents/{name}` directory.
    #[must_use]
    pub fn agent_dir(&self, agent: &str) -> PathBuf {
        self.root.join("agents").join(agent)
    }

    /// `agents/{name}/identity.yaml`.
    #[must_use]
    pub fn identity_file(&self, agent: &str) -> PathBuf {
        self.agent_dir(agent).join("identity.yaml")
    }

    /// `agents/{name}/checkpoint.json`.
    #[must_use]
    pub fn checkpoint_file(&self, agent: &str) -> PathBuf {
        self.agent_dir(agent).join("checkpoint.json")
    }

    /// `agents/{name}/handoffs.json` — append-only handoff history.
    #[must_use]
    pub fn handoffs_file(&self, agent: &str) -> PathBuf {
        self.agent_dir(agent).join("handoffs.json")
    }

    /// `pending-nudges/` directory.
    #[must_use]
    pub fn pending_nudges_dir(&self) -> PathBuf {
        self.root.join("pending-nudges")
    }

    /// `pending-nudges/{agent}.json` — single latest nudge marker.
    #[must_use]
    pub fn nudge_marker(&self, agent: &str) -> PathBuf {
        self.pending_nudges_dir().join(format!("{agent}.json"))
    }

    /// `nudge-state.json` — last-nudge timestamps per recipient.
    #[must_use]
    pub fn nudge_state_file(&self) -> PathBuf {
        self.root.join("nudge-state.json")
    }

    /// `mail-check-state.json` — per-agent last-check timestamps.
    #[must_use]
    pub fn mail_check_state_file(&self) -> PathBuf {
        self.root.join("mail-check-state.json")
    }

    /// `orchestrator-tmux.json` — the orchestrator's own terminal session.
    #[must_use]
    pub fn orchestrator_tmux_file(&self) -> PathBuf {
        self.root.join("orchestrator-tmux.json")
    }

    /// `worktrees/` base directory.
    #[must_use]
    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join("worktrees")
    }

    /// `worktrees/{agent}` — the agent's isolated working copy.
    #[must_use]
    pub fn worktree_dir(&self, agent: &str) -> PathBuf {
        self.worktrees_dir().join(agent)
    }

    /// Create the directory skeleton. Safe to call repeatedly.
    ///
    /// # Errors
    /// Returns the underlying I/O error if a directory cannot be created.
    pub fn ensure_layout(&self) -> io::Result<()> {
        for dir in [
            self.root.clone(),
            self.root.join("logs"),
            self.specs_dir(),
            self.root.join("agents"),
            self.pending_nudges_dir(),
            self.worktrees_dir(),
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Single-line state files
// ---------------------------------------------------------------------------

/// Read a single-line state file (`current-run.txt`, `session-branch.txt`).
///
/// Returns `None` when the file is missing or holds only whitespace. These
/// files are last-writer-wins; a stale read is acceptable.
#[must_use]
pub fn read_one_line(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let line = contents.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_owned())
    }
}

/// Write a single-line state file, replacing any previous contents.
///
/// # Errors
/// Returns the underlying I/O error on failure.
pub fn write_one_line(path: &Path, value: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{value}\n"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths_under_state_dir() {
        let paths = StatePaths::for_project(Path::new("/proj"));
        assert_eq!(paths.state_dir(), Path::new("/proj/.overstory"));
        assert_eq!(
            paths.config_file(),
            Path::new("/proj/.overstory/config.yaml")
        );
        assert_eq!(
            paths.sessions_db(),
            Path::new("/proj/.overstory/sessions.db")
        );
        assert_eq!(
            paths.merge_queue_db(),
            Path::new("/proj/.overstory/merge-queue.db")
        );
        assert_eq!(
            paths.nudge_marker("alice"),
            Path::new("/proj/.overstory/pending-nudges/alice.json")
        );
        assert_eq!(
            paths.spec_file("t-42"),
            Path::new("/proj/.overstory/specs/t-42.md")
        );
        assert_eq!(
            paths.identity_file("bob"),
            Path::new("/proj/.overstory/agents/bob/identity.yaml")
        );
        assert_eq!(
            paths.worktree_dir("bob"),
            Path::new("/proj/.overstory/worktrees/bob")
        );
    }

    #[test]
    fn ensure_layout_creates_skeleton_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::for_project(dir.path());
        paths.ensure_layout().unwrap();
        paths.ensure_layout().unwrap();
        assert!(paths.state_dir().is_dir());
        assert!(paths.specs_dir().is_dir());
        assert!(paths.pending_nudges_dir().is_dir());
        assert!(paths.worktrees_dir().is_dir());
    }

    #[test]
    fn one_line_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("current-run.txt");
        write_one_line(&file, "run-7").unwrap();
        assert_eq!(read_one_line(&file).as_deref(), Some("run-7"));
    }

    #[test]
    fn one_line_missing_file_is_none() {
        assert_eq!(read_one_line(Path::new("/nonexistent/file.txt")), None);
    }

    #[test]
    fn one_line_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("blank.txt");
        fs::write(&file, "\n\n").unwrap();
        assert_eq!(read_one_line(&file), None);
    }

    #[test]
    fn one_line_takes_first_line_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("multi.txt");
        fs::write(&file, "run-1\nrun-2\n").unwrap();
        assert_eq!(read_one_line(&file).as_deref(), Some("run-1"));
    }
}
