//! Spawn-hierarchy rules.
//!
//! Top-level agents (no parent) must be leads — everything else hangs off a
//! lead's subtree. The rule is overridable with a force flag for manual
//! intervention. A lead spawning builders before any scouts gets an
//! advisory warning (research-first is the intended flow), never a
//! rejection.

use crate::error::{OverstoryError, Result};
use crate::model::{AgentSession, Capability};

/// Enforce the top-level rule: parentless spawns must be leads.
///
/// # Errors
/// Returns a `HIERARCHY_VIOLATION` error unless `force` is set.
pub fn validate_hierarchy(
    capability: Capability,
    parent: Option<&str>,
    force: bool,
) -> Result<()> {
    if parent.is_none() && capability != Capability::Lead && !force {
        return Err(OverstoryError::Hierarchy {
            capability: capability.to_string(),
            parent: None,
            detail: format!(
                "a top-level agent must have capability 'lead', not '{capability}'"
            ),
        });
    }
    Ok(())
}

/// Enforce the spawn-tree depth cap.
///
/// # Errors
/// Returns a `HIERARCHY_VIOLATION` error when `depth` exceeds `max_depth`.
pub fn validate_depth(depth: u32, max_depth: u32, capability: Capability) -> Result<()> {
    if depth > max_depth {
        return Err(OverstoryError::Hierarchy {
            capability: capability.to_string(),
            parent: None,
            detail: format!("depth {depth} exceeds the configured maximum of {max_depth}"),
        });
    }
    Ok(())
}

/// Whether `parent` has spawned at least one active scout.
#[must_use]
pub fn parent_has_scouts(parent: &str, active: &[AgentSession]) -> bool {
    active.iter().any(|s| {
        s.capability == Capability::Scout && s.parent_agent.as_deref() == Some(parent)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
