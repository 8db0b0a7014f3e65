//! Historical merge-conflict learning.
//!
//! Every non-trivial merge records a pattern sentence in the knowledge
//! store under the `merge-conflict` tag. Before escalating past Tier 1, the
//! resolver queries those patterns, restricts them to ones whose file sets
//! overlap the entry's modified files, and derives advice: tiers to skip,
//! prior successful resolutions to cite in LLM prompts, and files likely to
//! conflict again.
//!
//! Knowledge-store failures are never fatal — a broken store just means an
//! empty history.

use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use crate::model::ResolvedTier;

/// Tag under which merge patterns are recorded.
pub const PATTERN_TAG: &str = "merge-conflict";

// ---------------------------------------------------------------------------
// MergePattern
// ---------------------------------------------------------------------------

/// Outcome recorded in a pattern sentence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternOutcome {
    /// The merge landed at the named tier.
    Resolved,
    /// The named tier was the last attempted and the merge failed.
    Failed,
}

/// One parsed pattern sentence.
#[derive(Clone, Debug, PartialEq)]
pub struct MergePattern {
    /// Whether that merge resolved or failed.
    pub outcome: PatternOutcome,
    /// The tier it resolved (or last failed) at.
    pub tier: ResolvedTier,
    /// Branch the pattern came from.
    pub branch: String,
    /// Agent that owned the branch.
    pub agent: String,
    /// Files that were conflicting.
    pub files: Vec<String>,
}

/// Render the pattern sentence:
/// `Merge conflict resolved at tier auto-resolve. Branch: b. Agent: a.
/// Conflicting files: x,y.`
#[must_use]
pub fn format_pattern(
    outcome: PatternOutcome,
    tier: ResolvedTier,
    branch: &str,
    agent: &str,
    files: &[String],
) -> String {
    let verb = match outcome {
        PatternOutcome::Resolved => "resolved",
        PatternOutcome::Failed => "failed",
    };
    format!(
        "Merge conflict {verb} at tier {tier}. Branch: {branch}. Agent: {agent}. Conflicting files: {}.",
        files.join(",")
    )
}

/// Parse a pattern sentence. Anything that does not match the format is
/// ignored (`None`), never an error.
#[must_use]
pub fn parse_pattern(line: &str) -> Option<MergePattern> {
    let rest = line.trim().strip_prefix("Merge conflict ")?;
    let (verb, rest) = rest.split_once(" at tier ")?;
    let outcome = match verb {
        "resolved" => PatternOutcome::Resolved,
        "failed" => PatternOutcome::Failed,
        _ => return None,
    };
    let (tier_str, rest) = rest.split_once(". Branch: ")?;
    let tier = ResolvedTier::from_str(tier_str).ok()?;
    let (branch, rest) = rest.split_once(". Agent: ")?;
    let (agent, rest) = rest.split_once(". Conflicting files: ")?;
    let files_csv = rest.strip_suffix('.')?;
    let files: Vec<String> = files_csv
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_owned)
        .collect();
    Some(MergePattern {
        outcome,
        tier,
        branch: branch.to_owned(),
        agent: agent.to_owned(),
        files,
    })
}

// ---------------------------------------------------------------------------
// MergeAdvice
// ---------------------------------------------------------------------------

/// Advice derived from relevant history.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergeAdvice {
    /// Tiers with a losing record on overlapping files.
    pub skip_tiers: Vec<ResolvedTier>,
    /// Short descriptions of prior successful resolutions, for LLM prompts.
    pub past_resolutions: Vec<String>,
    /// Union of files seen conflicting in relevant patterns.
    pub predicted_conflict_files: Vec<String>,
}

impl MergeAdvice {
    /// Whether a tier should be skipped.
    #[must_use]
    pub fn skips(&self, tier: ResolvedTier) -> bool {
        self.skip_tiers.contains(&tier)
    }
}

/// Derive advice from patterns, restricted to those overlapping `files`.
///
/// A tier is skipped once it has at least `skip_threshold` failures and no
/// successes among the relevant patterns. The threshold is a heuristic
/// default, not an invariant.
#[must_use]
pub fn derive_advice(
    patterns: &[MergePattern],
    files: &[String],
    skip_threshold: u32,
) -> MergeAdvice {
    let relevant: Vec<&MergePattern> = patterns
        .iter()
        .filter(|p| p.files.iter().any(|f| files.contains(f)))
        .collect();

    let mut skip_tiers = Vec::new();
    for tier in ResolvedTier::LADDER {
        let failures = relevant
            .iter()
            .filter(|p| p.tier == tier && p.outcome == PatternOutcome::Failed)
            .count() as u32;
        let successes = relevant
            .iter()
            .filter(|p| p.tier == tier && p.outcome == PatternOutcome::Resolved)
            .count();
        if skip_threshold > 0 && failures >= skip_threshold && successes == 0 {
            skip_tiers.push(tier);
        }
    }

    let past_resolutions = relevant
        .iter()
        .filter(|p| p.outcome == PatternOutcome::Resolved)
        .map(|p| {
            format!(
                "tier {} resolved branch {} (files: {})",
                p.tier,
                p.branch,
                p.files.join(", ")
            )
        })
        .collect();

    let mut predicted: Vec<String> = Vec::new();
    for pattern in &relevant {
        for file in &pattern.files {
            if !predicted.contains(file) {
                predicted.push(file.clone());
            }
        }
    }

    MergeAdvice {
        skip_tiers,
        past_resolutions,
        predicted_conflict_files: predicted,
    }
}

// ---------------------------------------------------------------------------
// KnowledgeStore
// ---------------------------------------------------------------------------

/// Seam to the external knowledge store.
pub trait KnowledgeStore {
    /// Raw pattern lines recorded under a tag. Errors are reported as a
    /// plain string; callers treat any failure as empty history.
    fn query_patterns(&self, tag: &str) -> Result<Vec<String>, String>;

    /// Record one pattern line under a tag.
    fn record_pattern(&self, tag: &str, line: &str) -> Result<(), String>;
}

/// The `mulch` CLI as a knowledge store.
pub struct MulchCli {
    binary: PathBuf,
    cwd: PathBuf,
}

impl MulchCli {
    /// Use the given binary, running in `cwd` (the project root).
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            cwd: cwd.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, String> {
        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.cwd)
            .output()
            .map_err(|e| e.to_string())?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_owned())
        }
    }
}

impl KnowledgeStore for MulchCli {
    fn query_patterns(&self, tag: &str) -> Result<Vec<String>, String> {
        let out = self.run(&["patterns", "list", "--tag", tag])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn record_pattern(&self, tag: &str, line: &str) -> Result<(), String> {
        self.run(&["patterns", "add", "--tag", tag, line])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
