//! One-shot LLM CLI invocation.
//!
//! The merge resolver's upper tiers hand a prompt to the LLM CLI in
//! non-interactive mode and read the raw response from stdout. The binary
//! is replaceable (tests point it at a stub script); the default is the
//! `claude` CLI that also runs the agents themselves.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from an LLM CLI invocation.
///
/// These never escape the resolver: a failed invocation fails the tier and
/// the ladder moves on.
#[derive(Debug)]
pub enum LlmError {
    /// The binary could not be spawned.
    Spawn(std::io::Error),
    /// The CLI exited non-zero.
    Failed {
        /// Exit code, if available.
        exit_code: Option<i32>,
        /// Captured stderr.
        stderr: String,
    },
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "could not start the LLM CLI: {e}"),
            Self::Failed { exit_code, stderr } => {
                write!(f, "LLM CLI failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for LlmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            Self::Failed { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// LlmCli
// ---------------------------------------------------------------------------

/// Handle to the LLM CLI binary.
pub struct LlmCli {
    binary: PathBuf,
}

/// Default binary name.
pub const DEFAULT_BINARY: &str = "claude";

impl Default for LlmCli {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

impl LlmCli {
    /// Use a specific binary (absolute path or something on PATH).
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one prompt non-interactively and return stdout.
    ///
    /// # Errors
    /// Returns [`LlmError`] when the binary cannot be spawned or exits
    /// non-zero.
    pub fn invoke(&self, prompt: &str, cwd: &Path) -> Result<String, LlmError> {
        let output = Command::new(&self.binary)
            .arg("-p")
            .arg(prompt)
            .current_dir(cwd)
            .output()
            .map_err(LlmError::Spawn)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(LlmError::Failed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
