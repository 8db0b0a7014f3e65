//! `ov init` — scaffold the state directory.
//!
//! Creates `.overstory/` with its subdirectories, writes a default
//! `config.yaml` when none exists, and makes sure git ignores the state
//! directory. Safe to run repeatedly.

use std::fs;

use anyhow::Result;
use clap::Args;

use crate::config::OverstoryConfig;
use crate::paths::StatePaths;

/// Initialize Overstory in the current repository
///
/// Creates the .overstory state directory, a default config.yaml, and a
/// .gitignore entry. Safe to run multiple times.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Project name recorded in config.yaml (default: directory name)
    #[arg(long)]
    pub name: Option<String>,
}

pub fn run(args: &InitArgs) -> Result<()> {
    let root = std::env::current_dir()?;
    let paths = StatePaths::for_project(&root);
    paths.ensure_layout()?;

    let config_path = paths.config_file();
    if config_path.exists() {
        println!("config.yaml already exists, leaving it untouched");
    } else {
        let mut config = OverstoryConfig::default();
        config.project.name = args.name.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_owned())
        });
        let rendered = serde_yaml::to_string(&config)?;
        fs::write(&config_path, rendered)?;
        println!("wrote {}", config_path.display());
    }

    // Keep runtime state out of version control.
    let gitignore = root.join(".gitignore");
    let entry = ".overstory/";
    let contents = fs::read_to_string(&gitignore).unwrap_or_default();
    if !contents.lines().any(|line| line.trim() == entry) {
        let mut updated = contents;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(entry);
        updated.push('\n');
        fs::write(&gitignore, updated)?;
        println!("added {entry} to .gitignore");
    }

    println!("initialized {}", paths.state_dir().display());
    Ok(())
}
