//! Checkpoint and handoff persistence.
//!
//! A checkpoint externalizes an agent's progress so a future session can
//! resume the work; a handoff chains a dying session to its replacement.
//! Both live as JSON under `agents/{name}/`, written atomically (temp file
//! then rename) so a crashed writer never leaves a half-written record.
//! Handoff history is append-only.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OverstoryError, Result};
use crate::paths::StatePaths;

// ---------------------------------------------------------------------------
// SessionCheckpoint
// ---------------------------------------------------------------------------

/// Resumable snapshot of an agent's progress.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCheckpoint {
    /// Agent the checkpoint belongs to.
    pub agent_name: String,
    /// Task being worked.
    pub task_id: String,
    /// Free-form progress summary.
    pub progress_summary: String,
    /// Files modified so far.
    pub files_modified: Vec<String>,
    /// Work still outstanding.
    pub pending_work: Vec<String>,
    /// Branch the work lives on.
    pub current_branch: String,
    /// Knowledge-store domains relevant to the work.
    pub knowledge_domains: Vec<String>,
    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// SessionHandoff
// ---------------------------------------------------------------------------

/// A recorded takeover from one session to another.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandoff {
    /// Session handing the work off.
    pub from_session: String,
    /// Session taking over; `None` until the takeover completes.
    pub to_session: Option<String>,
    /// Why the handoff happened.
    pub reason: String,
    /// When the handoff was recorded.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

fn lifecycle_err(agent: &str, detail: impl Into<String>) -> OverstoryError {
    OverstoryError::Lifecycle {
        agent: agent.to_owned(),
        detail: detail.into(),
    }
}

/// Write a JSON value atomically: temp file in the same directory, then
/// rename over the target.
fn write_atomic<T: Serialize>(path: &Path, agent: &str, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| lifecycle_err(agent, "record path has no parent directory"))?;
    fs::create_dir_all(parent)?;
    let encoded = serde_json::to_string_pretty(value)
        .map_err(|e| lifecycle_err(agent, format!("could not encode record: {e}")))?;
    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    fs::write(tmp.path(), encoded)?;
    tmp.persist(path)
        .map_err(|e| lifecycle_err(agent, format!("could not persist record: {e}")))?;
    Ok(())
}

/// Save an agent's checkpoint, replacing any previous one.
///
/// # Errors
/// Returns a lifecycle error when the record cannot be written.
pub fn save_checkpoint(paths: &StatePaths, checkpoint: &SessionCheckpoint) -> Result<()> {
    write_atomic(
        &paths.checkpoint_file(&checkpoint.agent_name),
        &checkpoint.agent_name,
        checkpoint,
    )
}

/// Load an agent's checkpoint, if one exists.
///
/// # Errors
/// Returns a lifecycle error for unreadable or corrupt records; a missing
/// file is `None`.
pub fn load_checkpoint(paths: &StatePaths, agent: &str) -> Result<Option<SessionCheckpoint>> {
    let path = paths.checkpoint_file(agent);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| lifecycle_err(agent, format!("corrupt checkpoint: {e}")))
}

/// Remove an agent's checkpoint. Missing files are fine.
///
/// # Errors
/// Returns an I/O error for anything but a missing file.
pub fn clear_checkpoint(paths: &StatePaths, agent: &str) -> Result<()> {
    match fs::remove_file(paths.checkpoint_file(agent)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Append a handoff to an agent's history.
///
/// # Errors
/// Returns a lifecycle error when the history cannot be read or written.
pub fn append_handoff(paths: &StatePaths, agent: &str, handoff: &SessionHandoff) -> Result<()> {
    let mut history = load_handoffs(paths, agent)?;
    history.push(handoff.clone());
    write_atomic(&paths.handoffs_file(agent), agent, &history)
}

/// Load an agent's handoff history (empty when none recorded).
///
/// # Errors
/// Returns a lifecycle error for unreadable or corrupt records.
pub fn load_handoffs(paths: &StatePaths, agent: &str) -> Result<Vec<SessionHandoff>> {
    let path = paths.handoffs_file(agent);
    let contents = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&contents)
        .map_err(|e| lifecycle_err(agent, format!("corrupt handoff history: {e}")))
}

/// Complete the most recent open handoff by recording the taking-over
/// session.
///
/// # Errors
/// Fails when there is no open handoff to complete.
pub fn complete_handoff(paths: &StatePaths, agent: &str, to_session: &str) -> Result<()> {
    let mut history = load_handoffs(paths, agent)?;
    let open = history
        .iter_mut()
        .rev()
        .find(|h| h.to_session.is_none())
        .ok_or_else(|| lifecycle_err(agent, "no open handoff to complete"))?;
    open.to_session = Some(to_session.to_owned());
    write_atomic(&paths.handoffs_file(agent), agent, &history)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
