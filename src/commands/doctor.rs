//! `ov doctor` — environment checks.
//!
//! Verifies the external tools and state the orchestrator depends on.
//! Exits 2 when any check fails, so scripts can distinguish a broken
//! environment from an ordinary command failure.

use std::process::Command;

use anyhow::Result;
use clap::Args;

use crate::config::{OverstoryConfig, resolve_project_root};
use crate::paths::StatePaths;
use crate::store::{EventStore, MailStore, MergeQueue, SessionStore};

/// Check external tools and project state
///
/// Verifies git and tmux on PATH, the .overstory directory, config.yaml,
/// and every database. Exits 2 when any check fails.
#[derive(Args, Debug)]
pub struct DoctorArgs {}

pub fn run(_args: &DoctorArgs) -> Result<()> {
    let mut all_ok = true;
    let mut check = |name: &str, ok: bool, detail: String| {
        let mark = if ok { "ok " } else { "FAIL" };
        println!("[{mark}] {name}{}", if detail.is_empty() {
            String::new()
        } else {
            format!(" — {detail}")
        });
        all_ok &= ok;
    };

    check(
        "git on PATH",
        binary_works("git", &["--version"]),
        String::new(),
    );
    check(
        "tmux on PATH",
        binary_works("tmux", &["-V"]),
        String::new(),
    );

    let cwd = std::env::current_dir()?;
    match resolve_project_root(&cwd) {
        Ok(root) => {
            check("state directory", true, root.join(".overstory").display().to_string());
            let paths = StatePaths::for_project(&root);

            match OverstoryConfig::load(&paths.config_file()).and_then(|c| {
                c.validate()?;
                Ok(c)
            }) {
                Ok(_) => check("config.yaml", true, String::new()),
                Err(err) => check("config.yaml", false, err.to_string()),
            }

            check(
                "sessions.db",
                SessionStore::open(&paths.sessions_db()).is_ok(),
                String::new(),
            );
            check(
                "mail.db",
                MailStore::open(&paths.mail_db()).is_ok(),
                String::new(),
            );
            check(
                "merge-queue.db",
                MergeQueue::open(&paths.merge_queue_db()).is_ok(),
                String::new(),
            );
            check(
                "events.db",
                EventStore::open(&paths.events_db()).is_ok(),
                String::new(),
            );
        }
        Err(err) => check("state directory", false, err.to_string()),
    }

    if !all_ok {
        // Exit code 2 is the doctor's contract for "environment broken".
        std::process::exit(2);
    }
    println!("all checks passed");
    Ok(())
}

fn binary_works(binary: &str, args: &[&str]) -> bool {
    Command::new(binary)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
