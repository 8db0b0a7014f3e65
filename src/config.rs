//! Overstory project configuration (`.overstory/config.yaml`).
//!
//! Defines the typed configuration for an Overstory project, including agent
//! fleet limits, merge-tier gating, watchdog thresholds, model/provider
//! routing, and knowledge-store priming. Missing fields use defaults; a
//! missing file is all defaults (not an error).
//!
//! Also provides worktree-aware project-root resolution: hook helpers run
//! inside agent worktrees, where the state directory lives with the parent
//! project rather than the worktree itself.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OverstoryError, Result};
use crate::paths::STATE_DIR_NAME;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level Overstory configuration.
///
/// Parsed from `.overstory/config.yaml`. Field names are camelCase on disk.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OverstoryConfig {
    /// Project identity and canonical branch.
    #[serde(default)]
    pub project: ProjectConfig,

    /// Agent fleet limits and pacing.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Worktree placement.
    #[serde(default)]
    pub worktrees: WorktreesConfig,

    /// Merge-tier gating.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Watchdog thresholds and intervals.
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Named model providers.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Capability → `provider/model` routing.
    #[serde(default)]
    pub models: BTreeMap<String, String>,

    /// Knowledge-store (mulch) priming.
    #[serde(default)]
    pub mulch: MulchConfig,

    /// Logging behaviour.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// ProjectConfig
// ---------------------------------------------------------------------------

/// Project identity.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectConfig {
    /// Short project name, used in tmux session names.
    #[serde(default = "default_project_name")]
    pub name: String,

    /// Project root override. Empty means "resolve from cwd".
    #[serde(default)]
    pub root: String,

    /// The main integration branch.
    #[serde(default = "default_canonical_branch")]
    pub canonical_branch: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            root: String::new(),
            canonical_branch: default_canonical_branch(),
        }
    }
}

fn default_project_name() -> String {
    "project".to_owned()
}

fn default_canonical_branch() -> String {
    "main".to_owned()
}

// ---------------------------------------------------------------------------
// AgentsConfig
// ---------------------------------------------------------------------------

/// Agent fleet limits and spawn pacing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AgentsConfig {
    /// Path to the agent manifest (capability descriptions).
    #[serde(default = "default_manifest_path")]
    pub manifest_path: String,

    /// Base directory for per-agent state.
    #[serde(default = "default_agents_base_dir")]
    pub base_dir: String,

    /// Maximum concurrently active sessions.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Minimum spacing between spawns, in milliseconds.
    #[serde(default = "default_stagger_delay_ms")]
    pub stagger_delay_ms: u64,

    /// Maximum spawn-tree depth.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Per-run session cap. 0 means unlimited.
    #[serde(default)]
    pub max_sessions_per_run: u32,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            manifest_path: default_manifest_path(),
            base_dir: default_agents_base_dir(),
            max_concurrent: default_max_concurrent(),
            stagger_delay_ms: default_stagger_delay_ms(),
            max_depth: default_max_depth(),
            max_sessions_per_run: 0,
        }
    }
}

fn default_manifest_path() -> String {
    format!("{STATE_DIR_NAME}/agents.yaml")
}

fn default_agents_base_dir() -> String {
    format!("{STATE_DIR_NAME}/agents")
}

const fn default_max_concurrent() -> u32 {
    5
}

const fn default_stagger_delay_ms() -> u64 {
    2000
}

const fn default_max_depth() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// WorktreesConfig
// ---------------------------------------------------------------------------

/// Worktree placement.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WorktreesConfig {
    /// Base directory for agent worktrees.
    #[serde(default = "default_worktrees_base_dir")]
    pub base_dir: String,
}

impl Default for WorktreesConfig {
    fn default() -> Self {
        Self {
            base_dir: default_worktrees_base_dir(),
        }
    }
}

fn default_worktrees_base_dir() -> String {
    format!("{STATE_DIR_NAME}/worktrees")
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Merge-tier gating.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MergeConfig {
    /// Enable the LLM-assisted resolve tier.
    #[serde(default)]
    pub ai_resolve_enabled: bool,

    /// Enable the re-imagine tier.
    #[serde(default)]
    pub reimagine_enabled: bool,

    /// Historical failures required (with zero successes) before a tier is
    /// skipped for overlapping files. Heuristic, not an invariant.
    #[serde(default = "default_skip_failure_threshold")]
    pub skip_failure_threshold: u32,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ai_resolve_enabled: false,
            reimagine_enabled: false,
            skip_failure_threshold: default_skip_failure_threshold(),
        }
    }
}

const fn default_skip_failure_threshold() -> u32 {
    2
}

// ---------------------------------------------------------------------------
// WatchdogConfig
// ---------------------------------------------------------------------------

/// Watchdog thresholds and intervals.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WatchdogConfig {
    /// Enable the tier-0 (liveness) sweep.
    #[serde(default = "default_true")]
    pub tier0_enabled: bool,

    /// Tier-0 sweep interval in milliseconds.
    #[serde(default = "default_tier0_interval_ms")]
    pub tier0_interval_ms: u64,

    /// Enable tier-1 (staleness) evaluation.
    #[serde(default = "default_true")]
    pub tier1_enabled: bool,

    /// Enable tier-2 (zombie) evaluation.
    #[serde(default = "default_true")]
    pub tier2_enabled: bool,

    /// Inactivity before a session is considered stalled, in milliseconds.
    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,

    /// Inactivity before a session is considered a zombie, in milliseconds.
    #[serde(default = "default_zombie_threshold_ms")]
    pub zombie_threshold_ms: u64,

    /// Minimum spacing between nudges to the same agent, in milliseconds.
    #[serde(default = "default_nudge_interval_ms")]
    pub nudge_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            tier0_enabled: true,
            tier0_interval_ms: default_tier0_interval_ms(),
            tier1_enabled: true,
            tier2_enabled: true,
            stale_threshold_ms: default_stale_threshold_ms(),
            zombie_threshold_ms: default_zombie_threshold_ms(),
            nudge_interval_ms: default_nudge_interval_ms(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_tier0_interval_ms() -> u64 {
    30_000
}

const fn default_stale_threshold_ms() -> u64 {
    300_000
}

const fn default_zombie_threshold_ms() -> u64 {
    600_000
}

const fn default_nudge_interval_ms() -> u64 {
    60_000
}

// ---------------------------------------------------------------------------
// ProviderConfig
// ---------------------------------------------------------------------------

/// A named model provider.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProviderConfig {
    /// Provider kind.
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    /// Gateway base URL. Required for non-native providers.
    #[serde(default)]
    pub base_url: String,

    /// Environment variable holding the gateway auth token, if any.
    #[serde(default)]
    pub auth_token_env: Option<String>,
}

/// Provider kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// The CLI's built-in provider; no environment override needed.
    Native,
    /// An OpenAI/Anthropic-compatible gateway reached via base URL.
    Gateway,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

// ---------------------------------------------------------------------------
// MulchConfig
// ---------------------------------------------------------------------------

/// Knowledge-store (mulch) priming.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MulchConfig {
    /// Whether knowledge-store integration is active.
    #[serde(default)]
    pub enabled: bool,

    /// Fallback knowledge domains when inference finds none.
    #[serde(default)]
    pub domains: Vec<String>,

    /// Primer rendering format passed to the knowledge store.
    #[serde(default = "default_prime_format")]
    pub prime_format: String,
}

impl Default for MulchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            domains: Vec::new(),
            prime_format: default_prime_format(),
        }
    }
}

fn default_prime_format() -> String {
    "compact".to_owned()
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Logging behaviour.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default the tracing filter to debug instead of info.
    #[serde(default)]
    pub verbose: bool,

    /// Redact token-shaped values from logged subprocess output.
    #[serde(default = "default_true")]
    pub redact_secrets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            redact_secrets: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl OverstoryConfig {
    /// Load configuration from a YAML file.
    ///
    /// - Missing file → all defaults (not an error).
    /// - Invalid YAML or unknown fields → a `Config` error with location
    ///   detail when the parser provides one.
    ///
    /// # Errors
    /// Returns [`OverstoryError::Config`] on unreadable or invalid files.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(OverstoryError::Config {
                    path: Some(path.to_owned()),
                    detail: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|e| match e {
            OverstoryError::Config { detail, .. } => OverstoryError::Config {
                path: Some(path.to_owned()),
                detail,
            },
            other => other,
        })
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    /// Returns [`OverstoryError::Config`] on invalid YAML or unknown fields.
    pub fn parse(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| {
            let mut detail = e.to_string();
            if let Some(loc) = e.location() {
                detail = format!("line {}: {detail}", loc.line());
            }
            OverstoryError::Config { path: None, detail }
        })
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    /// Returns [`OverstoryError::Validation`] for the first violated
    /// constraint.
    pub fn validate(&self) -> Result<()> {
        if self.agents.max_concurrent == 0 {
            return Err(OverstoryError::validation(
                "agents.maxConcurrent",
                "0",
                "at least one concurrent agent is required",
            ));
        }
        if self.watchdog.stale_threshold_ms >= self.watchdog.zombie_threshold_ms {
            return Err(OverstoryError::validation(
                "watchdog.staleThresholdMs",
                self.watchdog.stale_threshold_ms.to_string(),
                "must be below zombieThresholdMs",
            ));
        }
        for (capability, model) in &self.models {
            if let Some((provider, _)) = model.split_once('/') {
                if !self.providers.contains_key(provider) {
                    return Err(OverstoryError::validation(
                        format!("models.{capability}"),
                        model.clone(),
                        format!("references undefined provider '{provider}'"),
                    ));
                }
            }
        }
        for (name, provider) in &self.providers {
            if provider.kind == ProviderKind::Gateway && provider.base_url.is_empty() {
                return Err(OverstoryError::validation(
                    format!("providers.{name}.baseUrl"),
                    String::new(),
                    "gateway providers require a base URL",
                ));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Project-root resolution
// ---------------------------------------------------------------------------

/// Resolve the Overstory project root from a starting directory.
///
/// Walks upward looking for a `.overstory` directory. Hook helpers run inside
/// agent worktrees where no `.overstory` exists; in that case the walk
/// continues with the worktree's owning repository, discovered from the
/// `.git` file's `gitdir:` pointer (`<main>/.git/worktrees/<name>`).
///
/// # Errors
/// Returns [`OverstoryError::Config`] when no project root can be found.
pub fn resolve_project_root(start: &Path) -> Result<PathBuf> {
    let mut dir = Some(start.to_path_buf());
    while let Some(d) = dir {
        if d.join(STATE_DIR_NAME).is_dir() {
            return Ok(d);
        }
        let git_marker = d.join(".git");
        if git_marker.is_file() {
            // A .git *file* marks a linked worktree; follow it home.
            if let Some(main_root) = worktree_parent_root(&git_marker) {
                if main_root.join(STATE_DIR_NAME).is_dir() {
                    return Ok(main_root);
                }
            }
        }
        dir = d.parent().map(Path::to_path_buf);
    }
    Err(OverstoryError::Config {
        path: None,
        detail: format!(
            "no {STATE_DIR_NAME} directory found above {} — run `ov init` in the project root first",
            start.display()
        ),
    })
}

/// Extract the main repository root from a worktree's `.git` file.
///
/// The file contains `gitdir: /path/to/main/.git/worktrees/<name>`; the main
/// root is three components up from that directory.
fn worktree_parent_root(git_file: &Path) -> Option<PathBuf> {
    let contents = fs::read_to_string(git_file).ok()?;
    let gitdir = contents.strip_prefix("gitdir:")?.trim();
    let gitdir = PathBuf::from(gitdir);
    // .../main/.git/worktrees/<name> → .../main
    let worktrees = gitdir.parent()?;
    if worktrees.file_name()? != "worktrees" {
        return None;
    }
    let dot_git = worktrees.parent()?;
    dot_git.parent().map(Path::to_path_buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let cfg = OverstoryConfig::default();
        assert_eq!(cfg.project.canonical_branch, "main");
        assert_eq!(cfg.agents.max_concurrent, 5);
        assert_eq!(cfg.agents.stagger_delay_ms, 2000);
        assert_eq!(cfg.agents.max_depth, 2);
        assert_eq!(cfg.agents.max_sessions_per_run, 0);
        assert_eq!(cfg.watchdog.stale_threshold_ms, 300_000);
        assert_eq!(cfg.watchdog.zombie_threshold_ms, 600_000);
        assert!(!cfg.merge.ai_resolve_enabled);
        assert!(!cfg.merge.reimagine_enabled);
        assert_eq!(cfg.merge.skip_failure_threshold, 2);
        assert!(!cfg.mulch.enabled);
        assert!(cfg.logging.redact_secrets);
    }

    #[test]
    fn parse_empty_string_is_defaults() {
        let cfg = OverstoryConfig::parse("").unwrap();
        assert_eq!(cfg, OverstoryConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
project:
  name: acme
  canonicalBranch: trunk
agents:
  maxConcurrent: 8
  staggerDelayMs: 500
  maxSessionsPerRun: 12
merge:
  aiResolveEnabled: true
  reimagineEnabled: true
watchdog:
  staleThresholdMs: 60000
  zombieThresholdMs: 120000
providers:
  relay:
    type: gateway
    baseUrl: https://relay.internal/v1
    authTokenEnv: RELAY_TOKEN
models:
  builder: relay/big-coder
mulch:
  enabled: true
  domains: [architecture, cli]
"#;
        let cfg = OverstoryConfig::parse(yaml).unwrap();
        assert_eq!(cfg.project.name, "acme");
        assert_eq!(cfg.project.canonical_branch, "trunk");
        assert_eq!(cfg.agents.max_concurrent, 8);
        assert_eq!(cfg.agents.stagger_delay_ms, 500);
        assert_eq!(cfg.agents.max_sessions_per_run, 12);
        assert!(cfg.merge.ai_resolve_enabled);
        assert!(cfg.merge.reimagine_enabled);
        assert_eq!(cfg.watchdog.stale_threshold_ms, 60_000);
        let relay = &cfg.providers["relay"];
        assert_eq!(relay.kind, ProviderKind::Gateway);
        assert_eq!(relay.base_url, "https://relay.internal/v1");
        assert_eq!(relay.auth_token_env.as_deref(), Some("RELAY_TOKEN"));
        assert_eq!(cfg.models["builder"], "relay/big-coder");
        assert!(cfg.mulch.enabled);
        assert_eq!(cfg.mulch.domains, vec!["architecture", "cli"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = OverstoryConfig::parse("project:\n  name: solo\n").unwrap();
        assert_eq!(cfg.project.name, "solo");
        assert_eq!(cfg.agents.max_concurrent, 5);
        assert_eq!(cfg.watchdog.zombie_threshold_ms, 600_000);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = OverstoryConfig::parse("unknownTopLevel: true\n").unwrap_err();
        assert_eq!(err.code(), "CONFIG");
        assert!(format!("{err}").contains("unknown"));
    }

    #[test]
    fn parse_rejects_invalid_provider_kind() {
        let yaml = "providers:\n  x:\n    type: quantum\n";
        let err = OverstoryConfig::parse(yaml).unwrap_err();
        assert_eq!(err.code(), "CONFIG");
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = OverstoryConfig::load(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(cfg, OverstoryConfig::default());
    }

    #[test]
    fn load_invalid_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "agents: [not, a, map]\n").unwrap();
        let err = OverstoryConfig::load(&path).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("config.yaml"), "message should name the file: {msg}");
    }

    // -- validate --

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = OverstoryConfig::default();
        cfg.agents.max_concurrent = 0;
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut cfg = OverstoryConfig::default();
        cfg.watchdog.stale_threshold_ms = 700_000;
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("zombieThresholdMs"));
    }

    #[test]
    fn validate_rejects_undefined_provider_reference() {
        let mut cfg = OverstoryConfig::default();
        cfg.models
            .insert("builder".to_owned(), "ghost/model-x".to_owned());
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("ghost"));
    }

    #[test]
    fn validate_accepts_bare_model_alias() {
        let mut cfg = OverstoryConfig::default();
        cfg.models.insert("scout".to_owned(), "haiku".to_owned());
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_gateway_without_base_url() {
        let mut cfg = OverstoryConfig::default();
        cfg.providers.insert(
            "relay".to_owned(),
            ProviderConfig {
                kind: ProviderKind::Gateway,
                base_url: String::new(),
                auth_token_env: None,
            },
        );
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err}").contains("baseUrl"));
    }

    // -- project-root resolution --

    #[test]
    fn resolve_root_finds_state_dir_upward() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("proj");
        fs::create_dir_all(root.join(STATE_DIR_NAME)).unwrap();
        let nested = root.join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        let resolved = resolve_project_root(&nested).unwrap();
        assert_eq!(resolved, root);
    }

    #[test]
    fn resolve_root_follows_worktree_git_file() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main");
        fs::create_dir_all(main.join(STATE_DIR_NAME)).unwrap();
        fs::create_dir_all(main.join(".git/worktrees/alice")).unwrap();

        let wt = dir.path().join("elsewhere/alice");
        fs::create_dir_all(&wt).unwrap();
        fs::write(
            wt.join(".git"),
            format!("gitdir: {}\n", main.join(".git/worktrees/alice").display()),
        )
        .unwrap();

        let resolved = resolve_project_root(&wt).unwrap();
        assert_eq!(resolved, main);
    }

    #[test]
    fn resolve_root_errors_without_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_project_root(dir.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIG");
        assert!(format!("{err}").contains("ov init"));
    }
}
