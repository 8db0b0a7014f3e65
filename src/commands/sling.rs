//! `ov sling` — spawn an agent.

use anyhow::Result;
use clap::Args;

use crate::model::Capability;
use crate::sling::{Sling, SpawnRequest};

use super::load_context;

/// Spawn an agent bound to a task
///
/// Creates an isolated worktree on branch overstory/<name>/<task>, deploys
/// hook settings, pre-loads a dispatch mail, and launches the agent in a
/// detached tmux session. Top-level agents must be leads; workers hang off
/// a parent.
///
/// Examples:
///   ov sling lead-1 lead t-100
///   ov sling builder-a builder t-101 --parent lead-1 --depth 1
#[derive(Args, Debug)]
pub struct SlingArgs {
    /// Agent name (lowercase alphanumeric with hyphens)
    pub name: String,

    /// Capability: lead, builder, scout, reviewer, merger, coordinator,
    /// monitor, custom
    pub capability: Capability,

    /// Task id the agent works on
    pub task: String,

    /// Spawning parent agent
    #[arg(long)]
    pub parent: Option<String>,

    /// Spawn-tree depth (default: 0 for top-level, 1 with a parent)
    #[arg(long)]
    pub depth: Option<u32>,

    /// Task-spec file handed to the agent
    #[arg(long)]
    pub spec: Option<String>,

    /// Bypass the hierarchy rule
    #[arg(long)]
    pub force: bool,

    /// Allow spawning as root (containers)
    #[arg(long)]
    pub allow_root: bool,

    /// Print the created session as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &SlingArgs) -> Result<()> {
    let ctx = load_context()?;
    let mut sling = Sling::new(&ctx.root, ctx.config);
    if args.allow_root {
        sling = sling.without_root_guard();
    }
    let request = SpawnRequest {
        agent_name: args.name.clone(),
        capability: args.capability,
        task_id: args.task.clone(),
        parent: args.parent.clone(),
        depth: args
            .depth
            .unwrap_or(u32::from(args.parent.is_some())),
        spec_path: args.spec.clone(),
        force: args.force,
    };
    let session = sling.spawn(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!(
            "spawned {} ({}) on task {} — worktree {}, tmux {}",
            session.agent_name,
            session.capability,
            session.task_id,
            session.worktree_path.display(),
            session.tmux_session,
        );
    }
    Ok(())
}
