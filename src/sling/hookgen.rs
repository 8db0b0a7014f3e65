//! Per-agent hook settings deployment.
//!
//! Each spawned agent gets a settings file inside its worktree wiring the
//! LLM CLI's hooks back into `ov` (context prime on session start, inbox
//! injection on prompt submit) and installing danger-guards: no pushes to
//! the integration branches, no history rewrites, no branch hopping off the
//! agent's own `overstory/{agent}/` namespace. Scout and reviewer agents
//! are additionally read-only: file-mutation tools are denied outright.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use crate::error::Result;
use crate::model::Capability;

/// Relative path of the settings file inside a worktree.
pub const SETTINGS_PATH: &str = ".claude/settings.json";

/// Build the hook settings document for one agent.
#[must_use]
pub fn hook_settings(agent: &str, capability: Capability) -> Value {
    let mut deny: Vec<String> = vec![
        "Bash(git push origin main:*)".to_owned(),
        "Bash(git push origin master:*)".to_owned(),
        "Bash(git push --force:*)".to_owned(),
        "Bash(git reset --hard:*)".to_owned(),
        "Bash(git checkout -b:*)".to_owned(),
        "Bash(git switch -c:*)".to_owned(),
        "Bash(git checkout main:*)".to_owned(),
        "Bash(git checkout master:*)".to_owned(),
    ];
    if capability.is_read_only() {
        deny.push("Write".to_owned());
        deny.push("Edit".to_owned());
        deny.push("NotebookEdit".to_owned());
    }

    json!({
        "hooks": {
            "SessionStart": [
                {
                    "hooks": [
                        {
                            "type": "command",
                            "command": format!("ov hook prime --agent {agent}")
                        }
                    ]
                }
            ],
            "UserPromptSubmit": [
                {
                    "hooks": [
                        {
                            "type": "command",
                            "command": format!("ov mail check --inject --agent {agent}")
                        }
                    ]
                }
            ],
            "Stop": [
                {
                    "hooks": [
                        {
                            "type": "command",
                            "command": format!("ov hook activity --agent {agent}")
                        }
                    ]
                }
            ]
        },
        "permissions": {
            "deny": deny
        },
        "env": {
            "OVERSTORY_AGENT_NAME": agent
        }
    })
}

/// Write the settings file into a worktree, creating `.claude/` as needed.
///
/// # Errors
/// Returns an I/O error when the file cannot be written.
pub fn deploy_hook_settings(
    worktree: &Path,
    agent: &str,
    capability: Capability,
) -> Result<PathBuf> {
    let settings = hook_settings(agent, capability);
    let path = worktree.join(SETTINGS_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rendered = serde_json::to_string_pretty(&settings)
        .expect("hook settings are always serializable");
    fs::write(&path, rendered)?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn deny_list(value: &Value) -> Vec<String> {
        value["permissions"]["deny"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn agent_name_substituted_everywhere() {
        let settings = hook_settings("alice", Capability::Builder);
        let rendered = settings.to_string();
        assert!(rendered.contains("ov hook prime --agent alice"));
        assert!(rendered.contains("ov mail check --inject --agent alice"));
        assert_eq!(settings["env"]["OVERSTORY_AGENT_NAME"], "alice");
        assert!(!rendered.contains("{agent}"));
    }

    #[test]
    fn danger_guards_always_present() {
        let deny = deny_list(&hook_settings("alice", Capability::Builder));
        assert!(deny.iter().any(|d| d.contains("push origin main")));
        assert!(deny.iter().any(|d| d.contains("push origin master")));
        assert!(deny.iter().any(|d| d.contains("reset --hard")));
        assert!(deny.iter().any(|d| d.contains("checkout -b")));
    }

    #[test]
    fn builders_keep_write_tools() {
        let deny = deny_list(&hook_settings("alice", Capability::Builder));
        assert!(!deny.contains(&"Write".to_owned()));
        assert!(!deny.contains(&"Edit".to_owned()));
    }

    #[test]
    fn scouts_and_reviewers_are_read_only() {
        for capability in [Capability::Scout, Capability::Reviewer] {
            let deny = deny_list(&hook_settings("eyes", capability));
            assert!(deny.contains(&"Write".to_owned()), "{capability}");
            assert!(deny.contains(&"Edit".to_owned()), "{capability}");
            assert!(deny.contains(&"NotebookEdit".to_owned()), "{capability}");
        }
    }

    #[test]
    fn deploy_writes_file_into_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let path = deploy_hook_settings(dir.path(), "alice", Capability::Scout).unwrap();
        assert_eq!(path, dir.path().join(SETTINGS_PATH));
        let contents = fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["env"]["OVERSTORY_AGENT_NAME"], "alice");
    }
}
