//! Inbox injection with a per-agent debounce.
//!
//! Agents check mail from their prompt-submit hook, which can fire many
//! times a minute. The debounce tracks the last check per agent in
//! `mail-check-state.json` and skips checks inside the window — without
//! draining the inbox or the pending-nudge marker, so nothing is lost, only
//! deferred. The state file is last-writer-wins; a lost update means one
//! extra check, which is harmless.

use std::collections::BTreeMap;
use std::fs;

use chrono::Utc;

use crate::error::Result;
use crate::mail::MailClient;
use crate::paths::StatePaths;

type CheckState = BTreeMap<String, i64>;

fn load_state(paths: &StatePaths) -> CheckState {
    fs::read_to_string(paths.mail_check_state_file())
        .ok()
        .and_then(|contents| serde_json::from_str(&contents).ok())
        .unwrap_or_default()
}

fn store_state(paths: &StatePaths, state: &CheckState) -> Result<()> {
    let encoded =
        serde_json::to_string_pretty(state).expect("check state is always serializable");
    fs::write(paths.mail_check_state_file(), encoded)?;
    Ok(())
}

/// Whether a check for `agent` is due, given the debounce window.
///
/// A window of 0 disables debouncing entirely.
#[must_use]
pub fn should_check(paths: &StatePaths, agent: &str, debounce_ms: u64, now_ms: i64) -> bool {
    if debounce_ms == 0 {
        return true;
    }
    let state = load_state(paths);
    match state.get(agent) {
        Some(last) => now_ms.saturating_sub(*last) >= debounce_ms as i64,
        None => true,
    }
}

/// Record that `agent` checked mail at `now_ms`.
///
/// # Errors
/// Returns an I/O error when the state file cannot be written.
pub fn record_check(paths: &StatePaths, agent: &str, now_ms: i64) -> Result<()> {
    let mut state = load_state(paths);
    state.insert(agent.to_owned(), now_ms);
    store_state(paths, &state)
}

/// The `mail check --inject` flow: render the inbox block unless the agent
/// checked within the debounce window.
///
/// # Errors
/// Returns store errors from the mail subsystem.
pub fn check_inject_with_debounce(
    paths: &StatePaths,
    agent: &str,
    debounce_ms: u64,
) -> Result<String> {
    let now_ms = Utc::now().timestamp_millis();
    if !should_check(paths, agent, debounce_ms, now_ms) {
        return Ok(String::new());
    }
    let mut client = MailClient::open(paths)?;
    let block = client.check_inject(agent)?;
    client.close();
    record_check(paths, agent, now_ms)?;
    Ok(block)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
