//! `ov hook` — helpers invoked from agent hook settings.
//!
//! These run as child processes inside agent worktrees. Output goes to
//! stdout, where the LLM CLI splices it into the session; state changes go
//! through the WAL-mode stores.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::hooks::{prime, write_spec};
use crate::model::SessionState;
use crate::store::SessionStore;

use super::load_context;

/// Hook-invoked helpers (prime, activity, spec)
#[derive(Subcommand, Debug)]
pub enum HookCommands {
    /// Print the session-start context block
    Prime(PrimeArgs),

    /// Report agent activity (advances the watchdog clock)
    Activity(ActivityArgs),

    /// Write a task spec atomically
    #[command(name = "spec-write")]
    SpecWrite(SpecWriteArgs),
}

#[derive(Args, Debug)]
pub struct PrimeArgs {
    /// Agent being primed (omit for the orchestrator session)
    #[arg(long, env = "OVERSTORY_AGENT_NAME")]
    pub agent: Option<String>,
}

#[derive(Args, Debug)]
pub struct ActivityArgs {
    /// Reporting agent
    #[arg(long, env = "OVERSTORY_AGENT_NAME")]
    pub agent: String,
}

#[derive(Args, Debug)]
pub struct SpecWriteArgs {
    /// Task id the spec belongs to
    pub task_id: String,

    /// Spec body (markdown)
    #[arg(long)]
    pub body: String,

    /// Attribution recorded in the header comment
    #[arg(long)]
    pub attribution: Option<String>,
}

pub fn run(command: &HookCommands) -> Result<()> {
    let ctx = load_context()?;
    match command {
        HookCommands::Prime(args) => {
            let block = prime(&ctx.root, &ctx.config, args.agent.as_deref())?;
            print!("{block}");
        }
        HookCommands::Activity(args) => {
            let store = SessionStore::open(&ctx.paths.sessions_db())?;
            store.update_last_activity(&args.agent, chrono::Utc::now())?;
            // First observed tool activity flips a booting session awake.
            if let Some(session) = store.get_by_name(&args.agent)? {
                if session.state == SessionState::Booting {
                    store.update_state(&args.agent, SessionState::Working)?;
                }
            }
            store.close();
        }
        HookCommands::SpecWrite(args) => {
            let path = write_spec(
                &ctx.paths,
                &args.task_id,
                &args.body,
                args.attribution.as_deref(),
            )?;
            println!("wrote {}", path.display());
        }
    }
    Ok(())
}
