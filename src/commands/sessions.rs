//! `ov sessions` and `ov runs` — registry introspection.

use anyhow::Result;
use clap::Args;

use crate::model::format_ts;
use crate::store::SessionStore;

use super::load_context;

/// List agent sessions
#[derive(Args, Debug)]
pub struct SessionsArgs {
    /// Include terminal (completed/zombie) sessions
    #[arg(long)]
    pub all: bool,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &SessionsArgs) -> Result<()> {
    let ctx = load_context()?;
    let store = SessionStore::open(&ctx.paths.sessions_db())?;
    let sessions = if args.all {
        store.get_all()?
    } else {
        store.get_active()?
    };
    store.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for session in &sessions {
        println!(
            "{:<20} {:<12} {:<9} task={:<10} depth={} parent={} last-activity={}",
            session.agent_name,
            session.capability,
            session.state,
            session.task_id,
            session.depth,
            session.parent_agent.as_deref().unwrap_or("-"),
            format_ts(session.last_activity),
        );
    }
    println!("{} session(s)", sessions.len());
    Ok(())
}

/// List swarm runs
#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run_runs(args: &RunsArgs) -> Result<()> {
    let ctx = load_context()?;
    let store = SessionStore::open(&ctx.paths.sessions_db())?;
    let runs = store.list_runs()?;
    store.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("no runs recorded");
        return Ok(());
    }
    for run in &runs {
        println!(
            "{:<16} {:<9} agents={:<4} started={} completed={}",
            run.id,
            run.status,
            run.agent_count,
            format_ts(run.started_at),
            run.completed_at.map_or("-".to_owned(), format_ts),
        );
    }
    Ok(())
}
