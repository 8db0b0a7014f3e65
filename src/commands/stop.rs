//! `ov stop` — graceful per-agent teardown.
//!
//! Kills the agent's tmux session and marks its registry row completed.
//! The worktree and branch stay: the agent's work may still be waiting in
//! the merge queue. `ov clean` does the bulk teardown.

use anyhow::{Result, bail};
use clap::Args;

use crate::model::{EventType, SessionState, StoredEvent};
use crate::store::{EventStore, SessionStore};
use crate::tmux::Tmux;

use super::load_context;

/// Stop one agent
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Agent to stop
    pub agent: String,
}

pub fn run(args: &StopArgs) -> Result<()> {
    let ctx = load_context()?;
    let store = SessionStore::open(&ctx.paths.sessions_db())?;
    let Some(session) = store.get_by_name(&args.agent)? else {
        bail!("no session found for agent '{}'", args.agent);
    };
    if session.state.is_terminal() {
        bail!(
            "agent '{}' is already {}; nothing to stop",
            args.agent,
            session.state
        );
    }

    if Tmux::is_session_alive(&session.tmux_session) {
        Tmux::kill_session(&session.tmux_session)?;
        println!("killed tmux session {}", session.tmux_session);
    }

    store.update_state(&args.agent, SessionState::Completed)?;
    store.update_pid(&args.agent, None)?;
    store.close();

    if let Ok(events) = EventStore::open(&ctx.paths.events_db()) {
        let draft = StoredEvent::new(&args.agent, EventType::SessionEnd)
            .with_session(session.id.clone())
            .with_run(session.run_id.clone());
        let _ = events.insert(&draft);
    }

    println!(
        "stopped {} — worktree {} kept for merging",
        args.agent,
        session.worktree_path.display()
    );
    Ok(())
}
