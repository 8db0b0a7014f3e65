//! Error types for the Overstory orchestrator.
//!
//! Defines [`OverstoryError`], the unified error type for coordination
//! operations. Error messages are designed to be agent-friendly: each variant
//! includes a clear description of what went wrong and, where it helps,
//! actionable guidance on how to fix it.
//!
//! Every variant carries a stable machine-readable code (see
//! [`OverstoryError::code`]) so callers and hook scripts can branch on the
//! failure kind without parsing prose.

use std::fmt;
use std::path::PathBuf;

/// Convenience alias used throughout the core modules.
pub type Result<T> = std::result::Result<T, OverstoryError>;

// ---------------------------------------------------------------------------
// OverstoryError
// ---------------------------------------------------------------------------

/// Unified error type for Overstory coordination operations.
///
/// Each variant is self-contained: an agent (or a human) receiving this error
/// should be able to understand what happened and what to do next without
/// additional context.
#[derive(Debug)]
pub enum OverstoryError {
    /// Bad CLI or configuration input.
    Validation {
        /// The field that failed validation.
        field: String,
        /// The offending value.
        value: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// A configuration file could not be loaded or parsed.
    Config {
        /// Path to the configuration file, when known.
        path: Option<PathBuf>,
        /// Human-readable description of the problem.
        detail: String,
    },

    /// A spawn request violated the agent hierarchy rules.
    Hierarchy {
        /// The capability that was requested.
        capability: String,
        /// The requesting parent agent, if any.
        parent: Option<String>,
        /// Why the request was rejected.
        detail: String,
    },

    /// An agent-lifecycle operation failed (spawn, not found, already
    /// terminal).
    Agent {
        /// The agent the operation concerned.
        agent: String,
        /// What went wrong.
        detail: String,
    },

    /// A git worktree or branch operation failed.
    Worktree {
        /// The command that was run (e.g. `"git worktree add"`).
        command: String,
        /// Captured stderr from the subprocess.
        stderr: String,
        /// Process exit code, if available.
        exit_code: Option<i32>,
    },

    /// A mail store access or protocol error.
    Mail {
        /// What went wrong.
        detail: String,
    },

    /// A merge resolver or merge queue failure.
    Merge {
        /// The branch being merged.
        branch: String,
        /// Files still in conflict when the resolver gave up.
        conflict_files: Vec<String>,
        /// What went wrong.
        detail: String,
    },

    /// A checkpoint or handoff operation failed.
    Lifecycle {
        /// The agent whose lifecycle record was involved.
        agent: String,
        /// What went wrong.
        detail: String,
    },

    /// An invalid or unknown mail address group.
    Group {
        /// The address that failed to resolve.
        address: String,
        /// Why it is invalid.
        detail: String,
    },

    /// A SQLite store operation failed.
    Store {
        /// Which database (`"sessions"`, `"mail"`, `"merge-queue"`,
        /// `"events"`).
        db: &'static str,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// An I/O error occurred.
    Io(std::io::Error),
}

impl OverstoryError {
    /// Stable machine-readable code for this error kind.
    ///
    /// Codes never change between releases; scripts may match on them.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION",
            Self::Config { .. } => "CONFIG",
            Self::Hierarchy { .. } => "HIERARCHY_VIOLATION",
            Self::Agent { .. } => "AGENT",
            Self::Worktree { .. } => "WORKTREE",
            Self::Mail { .. } => "MAIL",
            Self::Merge { .. } => "MERGE",
            Self::Lifecycle { .. } => "LIFECYCLE",
            Self::Group { .. } => "GROUP",
            Self::Store { .. } => "STORE",
            Self::Io(_) => "IO",
        }
    }

    /// Build a validation error from a field name and offending value.
    pub fn validation(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Build a mail error from a detail message.
    pub fn mail(detail: impl Into<String>) -> Self {
        Self::Mail {
            detail: detail.into(),
        }
    }

    /// Build an agent error from a name and detail message.
    pub fn agent(agent: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Agent {
            agent: agent.into(),
            detail: detail.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Display — agent-friendly error messages
// ---------------------------------------------------------------------------

impl fmt::Display for OverstoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation {
                field,
                value,
                reason,
            } => {
                write!(f, "invalid value '{value}' for {field}: {reason}")
            }
            Self::Config { path, detail } => {
                if let Some(p) = path {
                    write!(
                        f,
                        "configuration error in '{}': {detail}\n  To fix: edit the config file and correct the issue.",
                        p.display()
                    )
                } else {
                    write!(f, "configuration error: {detail}")
                }
            }
            Self::Hierarchy {
                capability,
                parent,
                detail,
            } => {
                write!(f, "hierarchy violation spawning '{capability}'")?;
                if let Some(p) = parent {
                    write!(f, " under '{p}'")?;
                }
                write!(
                    f,
                    ": {detail}\n  To fix: spawn a lead first, or pass --force to override."
                )
            }
            Self::Agent { agent, detail } => {
                write!(f, "agent '{agent}': {detail}")
            }
            Self::Worktree {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                write!(
                    f,
                    "\n  To fix: check git state and retry. Run `git status` for details."
                )
            }
            Self::Mail { detail } => write!(f, "mail error: {detail}"),
            Self::Merge {
                branch,
                conflict_files,
                detail,
            } => {
                write!(f, "merge of '{branch}' failed: {detail}")?;
                if !conflict_files.is_empty() {
                    write!(f, "\n  conflicting files:")?;
                    for file in conflict_files {
                        write!(f, "\n    - {file}")?;
                    }
                }
                Ok(())
            }
            Self::Lifecycle { agent, detail } => {
                write!(f, "lifecycle error for agent '{agent}': {detail}")
            }
            Self::Group { address, detail } => {
                write!(
                    f,
                    "unknown address group '{address}': {detail}\n  Recognized groups: all, group:<name>, or a capability plural (builders, scouts, ...)."
                )
            }
            Self::Store { db, source } => {
                write!(f, "{db} store error: {source}")
            }
            Self::Io(err) => {
                write!(
                    f,
                    "I/O error: {err}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for OverstoryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<std::io::Error> for OverstoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
