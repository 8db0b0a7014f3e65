//! `ov trace` — event-log introspection for one agent or run.

use anyhow::Result;
use clap::Args;

use crate::model::format_ts;
use crate::store::{EventQuery, EventStore};

use super::load_context;

/// Show the event timeline for an agent or run
///
/// Examples:
///   ov trace --agent builder-a --limit 50
///   ov trace --run run-7 --json
///   ov trace                       # global timeline
#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Agent to trace
    #[arg(long)]
    pub agent: Option<String>,

    /// Run to trace
    #[arg(long, conflicts_with = "agent")]
    pub run: Option<String>,

    /// Only events from the last this-many milliseconds
    #[arg(long)]
    pub since_ms: Option<u64>,

    /// Maximum events
    #[arg(long, default_value_t = 100)]
    pub limit: u32,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &TraceArgs) -> Result<()> {
    let ctx = load_context()?;
    let store = EventStore::open(&ctx.paths.events_db())?;
    let query = EventQuery {
        since: args
            .since_ms
            .map(|ms| chrono::Utc::now() - chrono::Duration::milliseconds(ms as i64)),
        until: None,
        limit: Some(args.limit),
    };
    let events = if let Some(agent) = &args.agent {
        store.get_by_agent(agent, query)?
    } else if let Some(run) = &args.run {
        store.get_by_run(run, query)?
    } else {
        store.get_timeline(query)?
    };
    store.close();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&events)?);
        return Ok(());
    }
    for event in &events {
        let tool = event
            .tool_name
            .as_deref()
            .map(|t| format!(" tool={t}"))
            .unwrap_or_default();
        println!(
            "[{}] {} {:<13} {:<6}{tool} {}",
            event.id,
            format_ts(event.created_at),
            event.event_type,
            event.level,
            event.agent_name,
        );
        if let Some(data) = &event.data {
            println!("      {data}");
        }
    }
    println!("{} event(s)", events.len());
    Ok(())
}
