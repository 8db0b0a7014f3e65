//! Tiered merge resolver.
//!
//! Given a queue entry, a canonical branch, and a repo root, the resolver
//! walks a four-step escalation ladder:
//!
//! 1. **clean-merge** — plain `git merge --no-edit`.
//! 2. **auto-resolve** — rewrite conflict blocks keeping the incoming side.
//! 3. **ai-resolve** — ask the LLM for resolved file contents (gated by
//!    config).
//! 4. **reimagine** — abort the merge and ask the LLM to reconcile both
//!    versions of every modified file from scratch (gated by config).
//!
//! Between tiers 1 and 2 the resolver consults recorded merge-conflict
//! patterns: tiers with a losing record on overlapping files are skipped,
//! and prior successful resolutions enrich the LLM prompts. On exit the
//! outcome is recorded back as a pattern — fire and forget, and never for
//! merges that land cleanly.

pub mod conflict;
pub mod history;
pub mod prose;

pub use conflict::resolve_keep_incoming;
pub use history::{KnowledgeStore, MergeAdvice, MulchCli, PATTERN_TAG};
pub use prose::is_prose;

use std::fs;
use std::path::PathBuf;

use crate::config::MergeConfig;
use crate::error::Result;
use crate::gitx::{Git, MergeOutcome};
use crate::llm::LlmCli;
use crate::model::{MergeEntry, ResolvedTier};

use history::{PatternOutcome, derive_advice, format_pattern, parse_pattern};

// ---------------------------------------------------------------------------
// MergeResult
// ---------------------------------------------------------------------------

/// Outcome of resolving one queue entry.
#[derive(Debug)]
pub struct MergeResult {
    /// The entry that was processed.
    pub entry: MergeEntry,
    /// Whether the branch landed.
    pub success: bool,
    /// Succeeding tier, or the last tier attempted before giving up.
    pub tier: ResolvedTier,
    /// Files still conflicted when the resolver gave up.
    pub conflict_files: Vec<String>,
    /// Failure detail, when not successful.
    pub error_message: Option<String>,
}

// ---------------------------------------------------------------------------
// MergeResolver
// ---------------------------------------------------------------------------

/// The resolver: owns the git handle, tier gating, and optional
/// knowledge-store and LLM seams.
pub struct MergeResolver {
    git: Git,
    config: MergeConfig,
    llm: LlmCli,
    knowledge: Option<Box<dyn KnowledgeStore>>,
}

impl MergeResolver {
    /// Build a resolver for the repository at `repo_root`.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>, config: MergeConfig) -> Self {
        Self {
            git: Git::new(repo_root.into()),
            config,
            llm: LlmCli::default(),
            knowledge: None,
        }
    }

    /// Replace the LLM CLI handle (tests point this at a stub).
    #[must_use]
    pub fn with_llm(mut self, llm: LlmCli) -> Self {
        self.llm = llm;
        self
    }

    /// Attach a knowledge store for historical advice and pattern
    /// recording.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Box<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Resolve one entry against the canonical branch.
    ///
    /// # Errors
    /// Only infrastructure failures are errors (checkout of the canonical
    /// branch, unexpected git breakage). Conflicts that exhaust the ladder
    /// come back as an unsuccessful [`MergeResult`].
    pub fn resolve(&self, entry: &MergeEntry, canonical: &str) -> Result<MergeResult> {
        // Checkout-skip: re-checking-out a branch we are already on would
        // collide with worktrees holding it.
        let current = self.git.current_branch()?;
        if current != canonical {
            self.git.checkout(canonical)?;
        }

        // Tier 1: clean merge.
        let conflicted = match self.git.merge(&entry.branch_name)? {
            MergeOutcome::Clean => {
                return Ok(MergeResult {
                    entry: entry.clone(),
                    success: true,
                    tier: ResolvedTier::CleanMerge,
                    conflict_files: Vec::new(),
                    error_message: None,
                });
            }
            MergeOutcome::Conflicted(files) => files,
        };
        tracing::debug!(branch = %entry.branch_name, files = conflicted.len(), "clean merge failed");

        let advice = self.gather_advice(entry);
        let mut last_tier = ResolvedTier::CleanMerge;
        let mut remaining = conflicted.clone();

        // Tier 2: keep-incoming auto-resolve.
        if !advice.skips(ResolvedTier::AutoResolve) {
            last_tier = ResolvedTier::AutoResolve;
            remaining = self.auto_resolve(&remaining)?;
            if remaining.is_empty() {
                self.git.commit_merge()?;
                self.record_outcome(entry, PatternOutcome::Resolved, last_tier, &conflicted);
                return Ok(MergeResult {
                    entry: entry.clone(),
                    success: true,
                    tier: ResolvedTier::AutoResolve,
                    conflict_files: Vec::new(),
                    error_message: None,
                });
            }
        }

        // Tier 3: LLM-assisted resolve of the remaining conflicts.
        if self.config.ai_resolve_enabled && !advice.skips(ResolvedTier::AiResolve) {
            last_tier = ResolvedTier::AiResolve;
            if self.ai_resolve(&remaining, &advice) {
                self.git.commit_merge()?;
                self.record_outcome(entry, PatternOutcome::Resolved, last_tier, &conflicted);
                return Ok(MergeResult {
                    entry: entry.clone(),
                    success: true,
                    tier: ResolvedTier::AiResolve,
                    conflict_files: Vec::new(),
                    error_message: None,
                });
            }
        }

        // Tier 4: abort and re-imagine every modified file.
        if self.config.reimagine_enabled && !advice.skips(ResolvedTier::Reimagine) {
            last_tier = ResolvedTier::Reimagine;
            self.git.merge_abort();
            if self.reimagine(entry, canonical)? {
                self.record_outcome(entry, PatternOutcome::Resolved, last_tier, &conflicted);
                return Ok(MergeResult {
                    entry: entry.clone(),
                    success: true,
                    tier: ResolvedTier::Reimagine,
                    conflict_files: Vec::new(),
                    error_message: None,
                });
            }
        }

        // All enabled tiers failed.
        self.git.merge_abort();
        self.record_outcome(entry, PatternOutcome::Failed, last_tier, &conflicted);
        Ok(MergeResult {
            entry: entry.clone(),
            success: false,
            tier: last_tier,
            conflict_files: remaining.clone(),
            error_message: Some(format!(
                "{} file(s) could not be resolved by any enabled tier",
                remaining.len()
            )),
        })
    }

    // -- tier 2 --------------------------------------------------------------

    /// Rewrite each conflicted file keeping the incoming side; stage the
    /// ones that worked. Returns the files that could not be rewritten.
    fn auto_resolve(&self, conflicted: &[String]) -> Result<Vec<String>> {
        let mut unresolved = Vec::new();
        for path in conflicted {
            let full = self.git.root().join(path);
            let Ok(content) = fs::read_to_string(&full) else {
                // Deleted on one side, or binary; nothing to rewrite.
                unresolved.push(path.clone());
                continue;
            };
            match resolve_keep_incoming(&content) {
                Some(resolved) => {
                    fs::write(&full, resolved)?;
                    self.git.stage(path)?;
                }
                None => unresolved.push(path.clone()),
            }
        }
        Ok(unresolved)
    }

    // -- tier 3 --------------------------------------------------------------

    /// Ask the LLM to resolve each remaining file. All responses must
    /// validate before anything is written or staged.
    fn ai_resolve(&self, remaining: &[String], advice: &MergeAdvice) -> bool {
        let mut resolutions: Vec<(String, String)> = Vec::new();
        for path in remaining {
            let full = self.git.root().join(path);
            let Ok(content) = fs::read_to_string(&full) else {
                tracing::debug!(path, "ai-resolve cannot read conflicted file");
                return false;
            };
            let prompt = ai_resolve_prompt(path, &content, &advice.past_resolutions);
            let response = match self.llm.invoke(&prompt, self.git.root()) {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(path, %err, "ai-resolve invocation failed");
                    return false;
                }
            };
            if is_prose(&response) {
                tracing::debug!(path, "ai-resolve response rejected as prose");
                return false;
            }
            resolutions.push((path.clone(), response));
        }
        for (path, response) in &resolutions {
            let full = self.git.root().join(path);
            if fs::write(&full, response).is_err() {
                return false;
            }
            if self.git.stage(path).is_err() {
                return false;
            }
        }
        true
    }

    // -- tier 4 --------------------------------------------------------------

    /// With the merge aborted, reconcile both versions of every file the
    /// entry modified and commit the result.
    fn reimagine(&self, entry: &MergeEntry, canonical: &str) -> Result<bool> {
        let mut written: Vec<String> = Vec::new();
        for path in &entry.files_modified {
            let ours = self.git.show_file(canonical, path)?;
            let theirs = self.git.show_file(&entry.branch_name, path)?;
            let prompt = reimagine_prompt(path, ours.as_deref(), theirs.as_deref());
            let response = match self.llm.invoke(&prompt, self.git.root()) {
                Ok(response) => response,
                Err(err) => {
                    tracing::debug!(path, %err, "reimagine invocation failed");
                    self.restore(&written);
                    return Ok(false);
                }
            };
            if is_prose(&response) {
                tracing::debug!(path, "reimagine response rejected as prose");
                self.restore(&written);
                return Ok(false);
            }
            let full = self.git.root().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&full, &response)?;
            self.git.stage(path)?;
            written.push(path.clone());
        }
        self.git
            .commit(&format!("Reimagine merge: {}", entry.branch_name))?;
        Ok(true)
    }

    /// Best-effort restore of files touched by a failed re-imagine pass.
    fn restore(&self, written: &[String]) {
        for path in written {
            let _ = self.git_checkout_path(path);
        }
    }

    fn git_checkout_path(&self, path: &str) -> Result<()> {
        // Restores both index and working tree for the path.
        let _ = self.git.stage(path);
        self.git.checkout_file(path)
    }

    // -- history --------------------------------------------------------------

    fn gather_advice(&self, entry: &MergeEntry) -> MergeAdvice {
        let Some(knowledge) = &self.knowledge else {
            return MergeAdvice::default();
        };
        let lines = match knowledge.query_patterns(PATTERN_TAG) {
            Ok(lines) => lines,
            Err(err) => {
                tracing::debug!(%err, "knowledge store query failed; ignoring history");
                return MergeAdvice::default();
            }
        };
        let patterns: Vec<_> = lines.iter().filter_map(|l| parse_pattern(l)).collect();
        derive_advice(
            &patterns,
            &entry.files_modified,
            self.config.skip_failure_threshold,
        )
    }

    fn record_outcome(
        &self,
        entry: &MergeEntry,
        outcome: PatternOutcome,
        tier: ResolvedTier,
        conflicted: &[String],
    ) {
        let Some(knowledge) = &self.knowledge else {
            return;
        };
        let files: &[String] = if conflicted.is_empty() {
            &entry.files_modified
        } else {
            conflicted
        };
        let line = format_pattern(outcome, tier, &entry.branch_name, &entry.agent_name, files);
        if let Err(err) = knowledge.record_pattern(PATTERN_TAG, &line) {
            tracing::debug!(%err, "pattern recording failed; ignoring");
        }
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

fn ai_resolve_prompt(path: &str, conflicted: &str, past_resolutions: &[String]) -> String {
    let mut prompt = String::from(
        "Resolve the git merge conflict below. Output ONLY the complete resolved \
         file content — no prose, no explanation, no code fences.\n",
    );
    if !past_resolutions.is_empty() {
        prompt.push_str("\nResolutions that worked for similar conflicts:\n");
        for resolution in past_resolutions {
            prompt.push_str(&format!("- {resolution}\n"));
        }
    }
    prompt.push_str(&format!("\nFile: {path}\n\nConflicted content:\n{conflicted}"));
    prompt
}

fn reimagine_prompt(path: &str, ours: Option<&str>, theirs: Option<&str>) -> String {
    format!(
        "Two branches diverged on the file below. Produce the final reconciled \
         file content, keeping the intent of both sides. Output ONLY the complete \
         file content — no prose, no explanation, no code fences.\n\n\
         File: {path}\n\n=== canonical version ===\n{}\n\n=== branch version ===\n{}",
        ours.unwrap_or("(file absent)"),
        theirs.unwrap_or("(file absent)"),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
