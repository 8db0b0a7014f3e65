//! Session-start context prime.
//!
//! Invoked by the LLM CLI's session-start hook. For the orchestrator it
//! captures the current branch (the default merge target for this session)
//! and summarizes the project; for an agent it assembles identity,
//! activation, and recovery context from the state directory.

use std::fs;
use std::path::Path;

use crate::config::OverstoryConfig;
use crate::error::Result;
use crate::gitx::Git;
use crate::lifecycle::load_checkpoint;
use crate::paths::{StatePaths, write_one_line};
use crate::store::SessionStore;
use crate::tmux::Tmux;

/// Assemble the context block printed at session start.
///
/// `agent` is `None` when priming the orchestrator session itself.
///
/// # Errors
/// Store failures propagate; git and manifest lookups are best-effort.
pub fn prime(
    project_root: &Path,
    config: &OverstoryConfig,
    agent: Option<&str>,
) -> Result<String> {
    let paths = StatePaths::for_project(project_root);
    heal_gitignore(project_root)?;

    match agent {
        None => prime_orchestrator(project_root, config, &paths),
        Some(agent) => prime_agent(config, &paths, agent),
    }
}

/// Make sure the state directory is ignored by git. Idempotent.
fn heal_gitignore(project_root: &Path) -> Result<()> {
    let gitignore = project_root.join(".gitignore");
    let entry = ".overstory/";
    let contents = fs::read_to_string(&gitignore).unwrap_or_default();
    if contents.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    let mut updated = contents;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    fs::write(&gitignore, updated)?;
    Ok(())
}

fn prime_orchestrator(
    project_root: &Path,
    config: &OverstoryConfig,
    paths: &StatePaths,
) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("# Overstory: {}\n\n", config.project.name));
    out.push_str(&format!(
        "Canonical branch: {}\n",
        config.project.canonical_branch
    ));

    // Capture the session branch; merges this session default to it when it
    // differs from canonical. Not being in a git repo is fine.
    let git = Git::new(project_root);
    if let Ok(branch) = git.current_branch() {
        write_one_line(&paths.session_branch_file(), &branch)?;
        out.push_str(&format!("Session branch: {branch}\n"));
    }

    // Register the orchestrator's own terminal session, when there is one.
    if let Some(tmux_session) = Tmux::current_session_name() {
        let record = serde_json::json!({ "sessionName": tmux_session });
        fs::write(paths.orchestrator_tmux_file(), record.to_string())?;
    }

    let manifest = project_root.join(&config.agents.manifest_path);
    if manifest.is_file() {
        out.push_str(&format!(
            "Agent manifest: {}\n",
            config.agents.manifest_path
        ));
    }

    let sessions = SessionStore::open(&paths.sessions_db())?;
    let all = sessions.get_all()?;
    let active = all.iter().filter(|s| s.state.is_active()).count();
    out.push_str(&format!(
        "Sessions: {active} active, {} total recorded\n",
        all.len()
    ));
    for session in all.iter().filter(|s| s.state.is_active()) {
        out.push_str(&format!(
            "  - {} ({}, {}) on task {}\n",
            session.agent_name, session.capability, session.state, session.task_id
        ));
    }

    if config.mulch.enabled && !config.mulch.domains.is_empty() {
        out.push_str(&format!(
            "Knowledge domains: {}\n",
            config.mulch.domains.join(", ")
        ));
    }
    Ok(out)
}

fn prime_agent(config: &OverstoryConfig, paths: &StatePaths, agent: &str) -> Result<String> {
    let mut out = String::new();
    out.push_str(&format!("# You are agent '{agent}'\n\n"));

    let identity = paths.identity_file(agent);
    if let Ok(contents) = fs::read_to_string(&identity) {
        out.push_str("## Identity\n");
        out.push_str(&contents);
        if !contents.ends_with('\n') {
            out.push('\n');
        }
    }

    let sessions = SessionStore::open(&paths.sessions_db())?;
    if let Some(session) = sessions.get_by_name(agent)? {
        if session.state.is_active() {
            out.push_str(&format!(
                "\n## Activation\nYou are bound to task '{}' on branch '{}'. \
                 Commit to that branch only; mail '{}' when done.\n",
                session.task_id,
                session.branch_name,
                session.parent_agent.as_deref().unwrap_or("orchestrator"),
            ));
        }
    }

    if let Some(checkpoint) = load_checkpoint(paths, agent)? {
        out.push_str("\n## Session recovery\n");
        out.push_str(&format!(
            "A previous session checkpointed this work: {}\n",
            checkpoint.progress_summary
        ));
        if !checkpoint.pending_work.is_empty() {
            out.push_str("Pending work:\n");
            for item in &checkpoint.pending_work {
                out.push_str(&format!("  - {item}\n"));
            }
        }
        if !checkpoint.files_modified.is_empty() {
            out.push_str(&format!(
                "Files already modified: {}\n",
                checkpoint.files_modified.join(", ")
            ));
        }
    }

    if config.mulch.enabled && !config.mulch.domains.is_empty() {
        out.push_str(&format!(
            "\nKnowledge domains: {}\n",
            config.mulch.domains.join(", ")
        ));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
