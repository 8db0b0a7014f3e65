//! Terminal-multiplexer wrapper.
//!
//! Agents run inside detached tmux sessions named
//! `overstory-{project}-{agent}`. All operations shell out to `tmux`;
//! stderr from a non-zero exit is propagated in the error detail.
//!
//! Session names are project-scoped so that bulk teardown can kill every
//! prefixed session without touching unrelated tmux state.

use std::path::Path;
use std::process::Command;

use crate::error::{OverstoryError, Result};

/// Prefix on every session name this orchestrator creates.
pub const SESSION_PREFIX: &str = "overstory";

/// Render the session name for a project/agent pair:
/// `overstory-{project}-{agent}`.
#[must_use]
pub fn session_name(project: &str, agent: &str) -> String {
    format!("{SESSION_PREFIX}-{project}-{agent}")
}

/// The prefix shared by all sessions of one project.
#[must_use]
pub fn project_prefix(project: &str) -> String {
    format!("{SESSION_PREFIX}-{project}-")
}

// ---------------------------------------------------------------------------
// Tmux
// ---------------------------------------------------------------------------

/// Thin wrapper over the `tmux` binary.
pub struct Tmux;

impl Tmux {
    fn run(args: &[&str]) -> Result<String> {
        let output = Command::new("tmux")
            .args(args)
            .output()
            .map_err(OverstoryError::Io)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(OverstoryError::Agent {
                agent: args.get(2).copied().unwrap_or("tmux").to_owned(),
                detail: format!(
                    "`tmux {}` failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            })
        }
    }

    /// Create a detached session running `command` in `cwd` with extra
    /// environment variables. Returns the pane's process id.
    ///
    /// # Errors
    /// Propagates tmux's stderr on failure.
    pub fn create_session(
        name: &str,
        cwd: &Path,
        command: &str,
        env: &[(String, String)],
    ) -> Result<u32> {
        let cwd_str = cwd.to_string_lossy();
        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            name.into(),
            "-c".into(),
            cwd_str.into_owned(),
        ];
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        args.push(command.into());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        Self::run(&arg_refs)?;

        let pid_out = Self::run(&["list-panes", "-t", name, "-F", "#{pane_pid}"])?;
        pid_out
            .lines()
            .next()
            .and_then(|l| l.trim().parse().ok())
            .ok_or_else(|| OverstoryError::Agent {
                agent: name.to_owned(),
                detail: format!("could not read pane pid from tmux output: {pid_out:?}"),
            })
    }

    /// Kill a session by name.
    ///
    /// # Errors
    /// Propagates tmux's stderr (including "session not found").
    pub fn kill_session(name: &str) -> Result<()> {
        Self::run(&["kill-session", "-t", name])?;
        Ok(())
    }

    /// Names of all live sessions. An unreachable tmux server (no sessions
    /// at all) reads as an empty list.
    #[must_use]
    pub fn list_sessions() -> Vec<String> {
        Self::run(&["list-sessions", "-F", "#{session_name}"])
            .map(|out| out.lines().map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Whether a session with this exact name is alive.
    #[must_use]
    pub fn is_session_alive(name: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", &format!("={name}")])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Send literal keys (plus Enter) into a session.
    ///
    /// The text must be a single line: embedded newlines split the send into
    /// separate keystroke batches and corrupt whatever the pane is running.
    ///
    /// # Errors
    /// Rejects multi-line text; propagates tmux's stderr on failure.
    pub fn send_keys(name: &str, keys: &str) -> Result<()> {
        if keys.contains('\n') {
            return Err(OverstoryError::validation(
                "keys",
                keys,
                "must be a single line; multi-line sends corrupt the pane",
            ));
        }
        Self::run(&["send-keys", "-t", name, keys, "Enter"])?;
        Ok(())
    }

    /// The session name of the surrounding tmux client, if any.
    #[must_use]
    pub fn current_session_name() -> Option<String> {
        if std::env::var_os("TMUX").is_none() {
            return None;
        }
        Self::run(&["display-message", "-p", "#{session_name}"])
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
