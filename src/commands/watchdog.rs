//! `ov watchdog` — health sweeps.

use anyhow::Result;
use clap::Args;

use crate::watchdog::Watchdog;

use super::load_context;

/// Evaluate agent health and reconcile session states
///
/// One sweep checks every active session's tmux liveness and activity
/// thresholds, marking sessions working, stalled, or zombie as warranted.
/// Without --once the watchdog loops at the configured interval until
/// interrupted.
#[derive(Args, Debug)]
pub struct WatchdogArgs {
    /// Run a single sweep and exit
    #[arg(long)]
    pub once: bool,

    /// Print the sweep report as JSON (implies --once)
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &WatchdogArgs) -> Result<()> {
    let ctx = load_context()?;
    let watchdog = Watchdog::new(ctx.paths.clone(), ctx.config.watchdog.clone());

    if args.once || args.json {
        let report = watchdog.sweep()?;
        if args.json {
            let transitions: Vec<_> = report
                .transitions
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "agent": t.agent_name,
                        "from": t.from.as_str(),
                        "to": t.to.as_str(),
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "examined": report.examined,
                    "transitions": transitions,
                })
            );
        } else {
            println!(
                "examined {} session(s), {} transition(s)",
                report.examined,
                report.transitions.len()
            );
            for t in &report.transitions {
                println!("  {}: {} -> {}", t.agent_name, t.from, t.to);
            }
        }
        return Ok(());
    }

    if !ctx.config.watchdog.tier0_enabled {
        println!("watchdog tier 0 is disabled in config; nothing to do");
        return Ok(());
    }
    Ok(watchdog.run_loop()?)
}
