//! Spawn coordinator.
//!
//! Turns a spawn request (name, capability, task, parent, depth) into a live
//! agent: an isolated worktree on its own branch, a detached tmux session
//! running the LLM CLI, hook settings wiring the agent back into `ov`, a
//! dispatch mail waiting in its inbox, and a registry row.
//!
//! The steps run in a fixed order; everything before worktree creation
//! leaves no durable state, and any failure after it rolls the worktree and
//! branch back.

pub mod domains;
pub mod hierarchy;
pub mod hookgen;
pub mod stagger;

pub use domains::infer_domains;
pub use hierarchy::{parent_has_scouts, validate_depth, validate_hierarchy};
pub use hookgen::deploy_hook_settings;
pub use stagger::{calculate_stagger_delay, check_run_session_limit};

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use chrono::Utc;

use crate::config::OverstoryConfig;
use crate::error::{OverstoryError, Result};
use crate::gitx::Git;
use crate::mail::{MailClient, SendRequest};
use crate::model::{
    AgentSession, Capability, EventType, MessageType, Priority, StoredEvent, branch_name,
    validate_agent_name,
};
use crate::paths::{StatePaths, read_one_line};
use crate::provider::resolve_model;
use crate::store::{EventStore, MergeQueue, SessionStore};
use crate::tmux::{Tmux, session_name};

/// Sender recorded on dispatch mail for top-level spawns.
const ORCHESTRATOR: &str = "orchestrator";

// ---------------------------------------------------------------------------
// SpawnRequest
// ---------------------------------------------------------------------------

/// Parameters of one spawn.
#[derive(Clone, Debug)]
pub struct SpawnRequest {
    /// Requested agent name.
    pub agent_name: String,
    /// Capability to spawn with.
    pub capability: Capability,
    /// Task the agent is bound to.
    pub task_id: String,
    /// Spawning agent, when not top-level.
    pub parent: Option<String>,
    /// Spawn-tree depth.
    pub depth: u32,
    /// Optional task-spec file handed to the agent.
    pub spec_path: Option<String>,
    /// Bypass the hierarchy rule.
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Sling
// ---------------------------------------------------------------------------

/// The spawn coordinator.
pub struct Sling {
    config: OverstoryConfig,
    project_root: PathBuf,
    paths: StatePaths,
    root_guard: bool,
}

impl Sling {
    /// Build a coordinator for a project.
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>, config: OverstoryConfig) -> Self {
        let project_root = project_root.into();
        let paths = StatePaths::for_project(&project_root);
        Self {
            config,
            project_root,
            paths,
            root_guard: true,
        }
    }

    /// Disable the UID-0 refusal, for containers where everything runs as
    /// root.
    #[must_use]
    pub fn without_root_guard(mut self) -> Self {
        self.root_guard = false;
        self
    }

    /// Run the spawn pipeline.
    ///
    /// # Errors
    /// Validation, hierarchy, concurrency, and lock failures reject the
    /// request before any durable state exists. Failures after worktree
    /// creation roll the worktree and branch back before propagating.
    pub fn spawn(&self, request: &SpawnRequest) -> Result<AgentSession> {
        validate_agent_name(&request.agent_name)?;

        // 1. Hierarchy validation (with the advisory scout check).
        validate_hierarchy(request.capability, request.parent.as_deref(), request.force)?;
        validate_depth(request.depth, self.config.agents.max_depth, request.capability)?;

        // 2. Never spawn a fleet as root.
        if self.root_guard && running_as_root() {
            return Err(OverstoryError::validation(
                "uid",
                "0",
                "refusing to spawn agents as root",
            ));
        }

        let sessions = SessionStore::open(&self.paths.sessions_db())?;
        let active = sessions.get_active()?;

        if let Some(parent) = &request.parent {
            let parent_is_lead = active
                .iter()
                .any(|s| &s.agent_name == parent && s.capability == Capability::Lead);
            if parent_is_lead
                && request.capability == Capability::Builder
                && !parent_has_scouts(parent, &active)
            {
                tracing::warn!(
                    parent,
                    "lead is spawning builders without any scout findings to build on"
                );
            }
        }

        // 3. Concurrency caps: global, then per-run.
        if active.len() as u32 >= self.config.agents.max_concurrent {
            return Err(OverstoryError::agent(
                &request.agent_name,
                format!(
                    "concurrency cap reached ({} active, max {})",
                    active.len(),
                    self.config.agents.max_concurrent
                ),
            ));
        }
        let run_id = read_one_line(&self.paths.current_run_file());
        if let Some(run_id) = &run_id {
            let count = sessions.count_run_sessions(run_id)?;
            if check_run_session_limit(self.config.agents.max_sessions_per_run, count) {
                return Err(OverstoryError::agent(
                    &request.agent_name,
                    format!(
                        "run '{run_id}' reached its session cap ({})",
                        self.config.agents.max_sessions_per_run
                    ),
                ));
            }
        }

        // 4. Task lock: one task, one holder — unless the holder is the
        //    requesting parent re-entering its own task.
        if let Some(holder) = active.iter().find(|s| s.task_id == request.task_id) {
            if request.parent.as_deref() != Some(holder.agent_name.as_str()) {
                return Err(OverstoryError::agent(
                    &request.agent_name,
                    format!(
                        "task '{}' is already held by active agent '{}'",
                        request.task_id, holder.agent_name
                    ),
                ));
            }
        }

        // 5. Stagger: pace spawns so the fleet does not thundering-herd the
        //    LLM backend.
        let delay = calculate_stagger_delay(
            self.config.agents.stagger_delay_ms as i64,
            &active,
            Utc::now(),
        );
        if delay > 0 {
            tracing::debug!(delay_ms = delay, "stagger pacing before spawn");
            std::thread::sleep(Duration::from_millis(delay));
        }

        // 6. Name uniqueness among active sessions.
        if active.iter().any(|s| s.agent_name == request.agent_name) {
            return Err(OverstoryError::agent(
                &request.agent_name,
                "an active agent with this name already exists",
            ));
        }

        // 7. Domain inference for knowledge-store priming: seed from the
        //    files prior merge-queue entries of this task touched.
        let domains = self.infer_task_domains(&request.task_id)?;

        // 8. Worktree on the agent's own branch, based on canonical.
        let git = Git::new(&self.project_root);
        let branch = branch_name(&request.agent_name, &request.task_id);
        let worktree = self
            .project_root
            .join(&self.config.worktrees.base_dir)
            .join(&request.agent_name);
        git.worktree_add(&worktree, &branch, &self.config.project.canonical_branch)?;

        // Everything after this point must clean up the worktree on failure.
        match self.finalize(request, &sessions, run_id, &worktree, &branch, &domains) {
            Ok(session) => Ok(session),
            Err(err) => {
                let tmux = session_name(&self.config.project.name, &request.agent_name);
                if Tmux::is_session_alive(&tmux) {
                    let _ = Tmux::kill_session(&tmux);
                }
                if let Err(cleanup_err) = git.worktree_remove(&worktree, true, Some(&branch)) {
                    tracing::warn!(%cleanup_err, "worktree rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Steps 9-13: hook deployment, dispatch mail, tmux session, beacon,
    /// registration.
    fn finalize(
        &self,
        request: &SpawnRequest,
        sessions: &SessionStore,
        run_id: Option<String>,
        worktree: &std::path::Path,
        branch: &str,
        domains: &[String],
    ) -> Result<AgentSession> {
        // 9. Hook settings with danger-guards.
        deploy_hook_settings(worktree, &request.agent_name, request.capability)?;

        // 10. Dispatch mail waits in the inbox before the agent boots.
        let mut mail = MailClient::open(&self.paths)?;
        let dispatcher = request
            .parent
            .clone()
            .unwrap_or_else(|| ORCHESTRATOR.to_owned());
        let payload = serde_json::json!({
            "taskId": request.task_id,
            "capability": request.capability.as_str(),
            "specPath": request.spec_path,
            "domains": domains,
        });
        mail.send(&SendRequest {
            from: dispatcher,
            to: request.agent_name.clone(),
            subject: format!("Task dispatch: {}", request.task_id),
            body: format!(
                "You are '{}', a {} agent. Work task '{}' on branch '{}'. \
                 Send a worker_done mail when finished.",
                request.agent_name, request.capability, request.task_id, branch
            ),
            message_type: MessageType::Dispatch,
            priority: Priority::Normal,
            payload: Some(payload.to_string()),
        })?;

        // 11. Detached tmux session running the LLM CLI.
        let resolved = resolve_model(&self.config, request.capability)?;
        let tmux_name = session_name(&self.config.project.name, &request.agent_name);
        let mut env = resolved.env.clone();
        env.push((
            "OVERSTORY_AGENT_NAME".to_owned(),
            request.agent_name.clone(),
        ));
        env.push((
            "OVERSTORY_WORKTREE_PATH".to_owned(),
            worktree.to_string_lossy().into_owned(),
        ));
        let command = format!("claude --model {}", resolved.model);
        let pid = Tmux::create_session(&tmux_name, worktree, &command, &env)?;

        // 12. Single-line beacon; multi-line sends corrupt keystrokes.
        let beacon = format!(
            "[overstory] agent={} capability={} task={} depth={} parent={}",
            request.agent_name,
            request.capability,
            request.task_id,
            request.depth,
            request.parent.as_deref().unwrap_or("-"),
        );
        Tmux::send_keys(&tmux_name, &beacon)?;

        // 13. Registration + spawn event.
        let mut session = AgentSession::new(
            request.agent_name.clone(),
            request.capability,
            worktree.to_path_buf(),
            branch,
            request.task_id.clone(),
            tmux_name,
            request.parent.clone(),
            request.depth,
            run_id,
        );
        session.pid = Some(pid);
        session.check_invariants()?;
        sessions.upsert(&session)?;

        if let Ok(events) = EventStore::open(&self.paths.events_db()) {
            let draft = StoredEvent::new(&request.agent_name, EventType::Spawn)
                .with_run(session.run_id.clone())
                .with_session(session.id.clone())
                .with_data(
                    serde_json::json!({
                        "capability": request.capability.as_str(),
                        "taskId": request.task_id,
                        "parent": request.parent,
                        "depth": request.depth,
                    })
                    .to_string(),
                );
            if let Err(err) = events.insert(&draft) {
                tracing::debug!(%err, "spawn event not recorded");
            }
        }

        Ok(session)
    }

    /// Union of files touched by this task's prior merge-queue entries,
    /// mapped to knowledge domains.
    fn infer_task_domains(&self, task_id: &str) -> Result<Vec<String>> {
        if !self.config.mulch.enabled {
            return Ok(Vec::new());
        }
        let queue = MergeQueue::open(&self.paths.merge_queue_db())?;
        let files: Vec<String> = queue
            .list(None)?
            .into_iter()
            .filter(|e| e.task_id == task_id)
            .flat_map(|e| e.files_modified)
            .collect();
        Ok(infer_domains(&files, &self.config.mulch.domains))
    }
}

/// Whether the current process runs as UID 0.
///
/// Shells out to `id -u`; platforms without the command (or without UIDs)
/// skip the guard.
fn running_as_root() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .parse::<u32>()
                .ok()
        })
        .is_some_and(|uid| uid == 0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
