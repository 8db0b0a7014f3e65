//! `ov feed` — follow-mode event stream.
//!
//! Polls the event store with a growing `since` bound and filters already-
//! seen ids client-side, so each event prints exactly once even when two
//! events share a timestamp.

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use crate::model::format_ts;
use crate::store::{EventQuery, EventStore};

use super::load_context;

/// Follow the event log as it grows
///
/// Prints new events as agents produce them. Use --once to print the
/// current tail and exit.
#[derive(Args, Debug)]
pub struct FeedArgs {
    /// Only events for this agent
    #[arg(long)]
    pub agent: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Print the current tail and exit instead of following
    #[arg(long)]
    pub once: bool,

    /// How many events of history to start with
    #[arg(long, default_value_t = 20)]
    pub tail: u32,
}

pub fn run(args: &FeedArgs) -> Result<()> {
    let ctx = load_context()?;
    let store = EventStore::open(&ctx.paths.events_db())?;

    let mut last_seen_id: i64 = 0;
    let mut since = None;

    // Initial tail.
    let initial = fetch(&store, args, EventQuery {
        since,
        until: None,
        limit: None,
    })?;
    let skip = initial.len().saturating_sub(args.tail as usize);
    for event in initial.iter().skip(skip) {
        print_event(event);
        last_seen_id = last_seen_id.max(event.id);
        since = Some(event.created_at);
    }

    if args.once {
        store.close();
        return Ok(());
    }

    loop {
        let batch = fetch(&store, args, EventQuery {
            since,
            until: None,
            limit: None,
        })?;
        for event in &batch {
            if event.id <= last_seen_id {
                continue;
            }
            print_event(event);
            last_seen_id = event.id;
            since = Some(event.created_at);
        }
        std::thread::sleep(Duration::from_millis(args.poll_ms.max(100)));
    }
}

fn fetch(
    store: &EventStore,
    args: &FeedArgs,
    query: EventQuery,
) -> Result<Vec<crate::model::StoredEvent>> {
    Ok(match &args.agent {
        Some(agent) => store.get_by_agent(agent, query)?,
        None => store.get_timeline(query)?,
    })
}

fn print_event(event: &crate::model::StoredEvent) {
    let tool = event
        .tool_name
        .as_deref()
        .map(|t| format!(" {t}"))
        .unwrap_or_default();
    println!(
        "{} {:<13} {}{tool}",
        format_ts(event.created_at),
        event.event_type,
        event.agent_name,
    );
}
