//! CLI command implementations.
//!
//! Each module owns one `ov` subcommand: a clap `Args`/`Subcommand` type
//! and a `run` function. Commands open stores on entry and close them on
//! exit; long-running loops (watchdog, feed) poll cooperatively.

pub mod clean;
pub mod doctor;
pub mod feed;
pub mod hook;
pub mod init;
pub mod mail;
pub mod merge;
pub mod sessions;
pub mod sling;
pub mod stop;
pub mod trace;
pub mod watchdog;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::{OverstoryConfig, resolve_project_root};
use crate::paths::StatePaths;

/// Everything a command needs to get going: the resolved project root, the
/// loaded configuration, and the state-path set.
pub struct CommandContext {
    /// Project root (the directory holding `.overstory`).
    pub root: PathBuf,
    /// Loaded and validated configuration.
    pub config: OverstoryConfig,
    /// State-directory paths.
    pub paths: StatePaths,
}

/// Resolve the project context from the current working directory.
///
/// # Errors
/// Fails when no project root is found or the configuration is invalid.
pub fn load_context() -> Result<CommandContext> {
    let cwd = std::env::current_dir().context("could not determine working directory")?;
    let root = resolve_project_root(&cwd)?;
    let paths = StatePaths::for_project(&root);
    let config = OverstoryConfig::load(&paths.config_file())?;
    config.validate()?;
    Ok(CommandContext {
        root,
        config,
        paths,
    })
}
