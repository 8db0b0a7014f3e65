//! `ov merge` — enqueue and resolve completed branches.
//!
//! Target-branch priority: explicit `--into`, then the orchestrator's
//! captured session branch, then the configured canonical branch. A single
//! branch not already queued is verified, parsed against the naming
//! convention, diffed for its modified-file set, and enqueued before
//! resolution. `--all` drains the pending queue in FIFO order.

use anyhow::{Result, bail};
use clap::Args;

use crate::gitx::Git;
use crate::mail::{MailClient, SendRequest};
use crate::merge::{MergeResolver, MergeResult, MulchCli};
use crate::model::{
    MergeEntry, MergeStatus, MessageType, Priority, parse_branch_name,
};
use crate::paths::read_one_line;
use crate::store::merge_queue::EnqueueRequest;
use crate::store::MergeQueue;

use super::{CommandContext, load_context};

/// Merge completed agent branches into the target branch
///
/// Runs the tiered resolver: clean merge, keep-incoming auto-resolve, then
/// the optional LLM tiers (ai-resolve, reimagine) when enabled in config.
///
/// Examples:
///   ov merge overstory/builder-a/t-101
///   ov merge --all
///   ov merge overstory/builder-a/t-101 --into release --json
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Branch to merge (omit with --all)
    pub branch: Option<String>,

    /// Drain every pending queue entry in FIFO order
    #[arg(long)]
    pub all: bool,

    /// Merge into this branch instead of the session/canonical branch
    #[arg(long)]
    pub into: Option<String>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &MergeArgs) -> Result<()> {
    let ctx = load_context()?;
    let target = resolve_target(args, &ctx);
    let resolver = build_resolver(&ctx);
    let queue = MergeQueue::open(&ctx.paths.merge_queue_db())?;

    let results = if args.all {
        let pending = queue.list(Some(MergeStatus::Pending))?;
        let mut results = Vec::with_capacity(pending.len());
        for entry in pending {
            results.push(resolve_entry(&resolver, &queue, &ctx, &entry, &target)?);
        }
        results
    } else {
        let Some(branch) = &args.branch else {
            bail!("pass a branch name or --all");
        };
        let entry = ensure_enqueued(&ctx, &queue, branch, &target)?;
        vec![resolve_entry(&resolver, &queue, &ctx, &entry, &target)?]
    };
    queue.close();

    let all_succeeded = results.iter().all(|r| r.success);
    report(&results, args.json, &target);
    if !all_succeeded {
        bail!(
            "{} of {} merge(s) failed",
            results.iter().filter(|r| !r.success).count(),
            results.len()
        );
    }
    Ok(())
}

/// Target priority: `--into` > session-branch.txt > canonical.
fn resolve_target(args: &MergeArgs, ctx: &CommandContext) -> String {
    if let Some(into) = &args.into {
        return into.clone();
    }
    if let Some(session_branch) = read_one_line(&ctx.paths.session_branch_file()) {
        return session_branch;
    }
    ctx.config.project.canonical_branch.clone()
}

fn build_resolver(ctx: &CommandContext) -> MergeResolver {
    let resolver = MergeResolver::new(&ctx.root, ctx.config.merge.clone());
    if ctx.config.mulch.enabled {
        resolver.with_knowledge(Box::new(MulchCli::new("mulch", &ctx.root)))
    } else {
        resolver
    }
}

/// Find or create the queue entry for a branch.
fn ensure_enqueued(
    ctx: &CommandContext,
    queue: &MergeQueue,
    branch: &str,
    target: &str,
) -> Result<MergeEntry> {
    if let Some(existing) = queue.get_by_branch(branch)? {
        if existing.status == MergeStatus::Pending {
            return Ok(existing);
        }
    }

    let git = Git::new(&ctx.root);
    if !git.branch_exists(branch) {
        bail!("branch '{branch}' does not exist");
    }
    let Some((agent, task_id)) = parse_branch_name(branch) else {
        bail!(
            "branch '{branch}' does not follow the overstory/<agent>/<task> convention; \
             cannot derive agent and task"
        );
    };
    let files_modified = git.diff_name_only(target, branch)?;
    Ok(queue.enqueue(&EnqueueRequest {
        branch_name: branch.to_owned(),
        task_id: task_id.to_owned(),
        agent_name: agent.to_owned(),
        files_modified,
    })?)
}

/// Drive one entry through the resolver, mirroring the outcome into the
/// queue and notifying the owning agent on failure.
fn resolve_entry(
    resolver: &MergeResolver,
    queue: &MergeQueue,
    ctx: &CommandContext,
    entry: &MergeEntry,
    target: &str,
) -> Result<MergeResult> {
    queue.update_status(&entry.branch_name, MergeStatus::Merging, None)?;
    let result = match resolver.resolve(entry, target) {
        Ok(result) => result,
        Err(err) => {
            queue.update_status(&entry.branch_name, MergeStatus::Failed, None)?;
            return Err(err.into());
        }
    };

    let status = if result.success {
        MergeStatus::Merged
    } else if result.conflict_files.is_empty() {
        MergeStatus::Failed
    } else {
        MergeStatus::Conflict
    };
    queue.update_status(&entry.branch_name, status, Some(result.tier))?;

    if !result.success {
        // Tell the owning agent its branch bounced; failures here must not
        // mask the merge outcome.
        if let Ok(mut mail) = MailClient::open(&ctx.paths) {
            let _ = mail.send(&SendRequest {
                from: "orchestrator".to_owned(),
                to: entry.agent_name.clone(),
                subject: format!("Merge failed: {}", entry.branch_name),
                body: result
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "merge failed".to_owned()),
                message_type: MessageType::MergeFailed,
                priority: Priority::High,
                payload: Some(
                    serde_json::json!({
                        "branch": entry.branch_name,
                        "tier": result.tier.as_str(),
                        "conflictFiles": result.conflict_files,
                    })
                    .to_string(),
                ),
            });
            mail.close();
        }
    }
    Ok(result)
}

fn report(results: &[MergeResult], json: bool, target: &str) {
    if json {
        let rendered: Vec<_> = results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "branch": r.entry.branch_name,
                    "success": r.success,
                    "tier": r.tier.as_str(),
                    "conflictFiles": r.conflict_files,
                    "error": r.error_message,
                })
            })
            .collect();
        let doc = if rendered.len() == 1 {
            rendered.into_iter().next().expect("one result")
        } else {
            serde_json::Value::Array(rendered)
        };
        println!("{doc}");
    } else {
        for result in results {
            if result.success {
                println!(
                    "merged {} into {target} ({})",
                    result.entry.branch_name, result.tier
                );
            } else {
                println!(
                    "FAILED {} at tier {} — {} conflicting file(s)",
                    result.entry.branch_name,
                    result.tier,
                    result.conflict_files.len()
                );
            }
        }
    }
}
