//! `ov clean` — bulk teardown of agent execution state.
//!
//! Kills the project's tmux sessions, removes worktrees and their
//! branches, marks sessions terminal, and clears pending-nudge markers.
//! Tmux kills are scoped by the project prefix and cross-checked against
//! the session store so unrelated sessions survive; when the store is
//! unreadable, everything carrying the prefix goes.

use std::fs;

use anyhow::Result;
use clap::Args;

use crate::gitx::Git;
use crate::model::SessionState;
use crate::store::SessionStore;
use crate::tmux::{Tmux, project_prefix};

use super::load_context;

/// Tear down agent sessions, worktrees, and branches
#[derive(Args, Debug)]
pub struct CleanArgs {
    /// Also purge all mail
    #[arg(long)]
    pub purge_mail: bool,
}

pub fn run(args: &CleanArgs) -> Result<()> {
    let ctx = load_context()?;
    let prefix = project_prefix(&ctx.config.project.name);
    let git = Git::new(&ctx.root);

    let store = SessionStore::open(&ctx.paths.sessions_db()).ok();
    let known_tmux: Option<Vec<String>> = store
        .as_ref()
        .and_then(|s| s.get_all().ok())
        .map(|sessions| sessions.iter().map(|s| s.tmux_session.clone()).collect());

    // Kill tmux sessions: prefix-scoped, store-checked when possible.
    let mut killed = 0;
    for name in Tmux::list_sessions() {
        if !name.starts_with(&prefix) {
            continue;
        }
        let known = known_tmux.as_ref().is_none_or(|k| k.contains(&name));
        if known && Tmux::kill_session(&name).is_ok() {
            killed += 1;
        }
    }

    // Remove worktrees and their branches.
    let mut removed = 0;
    if let Some(store) = &store {
        for session in store.get_all()? {
            if session.worktree_path.exists() {
                match git.worktree_remove(&session.worktree_path, true, Some(&session.branch_name))
                {
                    Ok(()) => removed += 1,
                    Err(err) => tracing::warn!(%err, "worktree removal failed"),
                }
            }
            if session.state.is_active() {
                let _ = store.update_state(&session.agent_name, SessionState::Completed);
            }
        }
    }

    // Drop pending nudges; they reference agents that no longer run.
    if let Ok(entries) = fs::read_dir(ctx.paths.pending_nudges_dir()) {
        for entry in entries.flatten() {
            let _ = fs::remove_file(entry.path());
        }
    }

    if args.purge_mail {
        let client = crate::mail::MailClient::open(&ctx.paths)?;
        let purged = client.purge(&crate::store::PurgeFilter {
            all: true,
            ..crate::store::PurgeFilter::default()
        })?;
        client.close();
        println!("purged {purged} message(s)");
    }

    println!("cleaned: {killed} tmux session(s), {removed} worktree(s)");
    Ok(())
}
