use anyhow::Result;
use clap::{Parser, Subcommand};

use overstory::commands::{
    clean, doctor, feed, hook, init, mail, merge, sessions, sling, stop, trace, watchdog,
};
use overstory::logging;

/// Overstory — LLM agent fleet orchestrator
///
/// ov coordinates long-running LLM coding agents working in parallel on
/// one repository. Each agent runs in an isolated git worktree on its own
/// branch inside a detached tmux session; ov spawns them, carries their
/// mail, watches their health, and merges their branches back.
///
/// QUICK START:
///
///   ov init
///   ov sling lead-1 lead t-100
///   ov sling builder-a builder t-101 --parent lead-1
///
///   # watch the fleet
///   ov sessions
///   ov feed
///
///   # land finished work
///   ov merge --all
///
/// Agents report completion by mail (worker_done); urgent mail leaves a
/// nudge that lands in the recipient's next prompt. The merge resolver
/// escalates through clean-merge, auto-resolve, and (when enabled in
/// .overstory/config.yaml) ai-resolve and reimagine.
#[derive(Parser)]
#[command(name = "ov")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'ov <command> --help' for more on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize Overstory in the current repository
    Init(init::InitArgs),

    /// Spawn an agent bound to a task
    Sling(sling::SlingArgs),

    /// Inter-agent mail
    #[command(subcommand)]
    Mail(mail::MailCommands),

    /// Merge completed agent branches
    Merge(merge::MergeArgs),

    /// Evaluate agent health
    Watchdog(watchdog::WatchdogArgs),

    /// List agent sessions
    Sessions(sessions::SessionsArgs),

    /// List swarm runs
    Runs(sessions::RunsArgs),

    /// Show an event timeline
    Trace(trace::TraceArgs),

    /// Follow the event log
    Feed(feed::FeedArgs),

    /// Stop one agent
    Stop(stop::StopArgs),

    /// Tear down sessions, worktrees, and branches
    Clean(clean::CleanArgs),

    /// Check external tools and project state
    Doctor(doctor::DoctorArgs),

    /// Hook-invoked helpers
    #[command(subcommand)]
    Hook(hook::HookCommands),
}

fn main() -> Result<()> {
    logging::init(std::env::var_os("OVERSTORY_VERBOSE").is_some());
    let cli = Cli::parse();

    match cli.command {
        Commands::Init(ref args) => init::run(args),
        Commands::Sling(ref args) => sling::run(args),
        Commands::Mail(ref command) => mail::run(command),
        Commands::Merge(ref args) => merge::run(args),
        Commands::Watchdog(ref args) => watchdog::run(args),
        Commands::Sessions(ref args) => sessions::run(args),
        Commands::Runs(ref args) => sessions::run_runs(args),
        Commands::Trace(ref args) => trace::run(args),
        Commands::Feed(ref args) => feed::run(args),
        Commands::Stop(ref args) => stop::run(args),
        Commands::Clean(ref args) => clean::run(args),
        Commands::Doctor(ref args) => doctor::run(args),
        Commands::Hook(ref command) => hook::run(command),
    }
}
