//! Git subprocess wrapper.
//!
//! Everything the orchestrator needs from git: worktree management, branch
//! queries, diffs, and the merge primitives the tiered resolver drives. All
//! operations shell out; stderr from a non-zero exit is propagated as a
//! structured [`OverstoryError::Worktree`].

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{OverstoryError, Result};

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// A git repository rooted at a fixed directory.
pub struct Git {
    root: PathBuf,
}

/// Outcome of a merge attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge committed cleanly.
    Clean,
    /// The merge stopped with these files unmerged.
    Conflicted(Vec<String>),
}

/// One worktree from `git worktree list`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorktreeInfo {
    /// Worktree directory.
    pub path: PathBuf,
    /// Checked-out branch, if any (detached worktrees have none).
    pub branch: Option<String>,
}

impl Git {
    /// Wrap the repository at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The repository root this wrapper operates in.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a git command and return its stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(OverstoryError::Io)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(OverstoryError::Worktree {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Run a git command, ignoring stdout.
    fn run_quiet(&self, args: &[&str]) -> Result<()> {
        self.run(args)?;
        Ok(())
    }

    // -- branches -----------------------------------------------------------

    /// Name of the currently checked-out branch.
    ///
    /// # Errors
    /// Fails on a detached HEAD or outside a repository.
    pub fn current_branch(&self) -> Result<String> {
        Ok(self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?.trim().to_owned())
    }

    /// Whether a local branch exists.
    #[must_use]
    pub fn branch_exists(&self, branch: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .current_dir(&self.root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Check out a branch.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        self.run_quiet(&["checkout", branch])
    }

    /// Delete a local branch (`-d`, or `-D` when forced).
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn delete_branch(&self, branch: &str, force: bool) -> Result<()> {
        let flag = if force { "-D" } else { "-d" };
        self.run_quiet(&["branch", flag, branch])
    }

    // -- diff / status ------------------------------------------------------

    /// Files changed on `branch` relative to the merge base with `base`
    /// (`git diff --name-only base...branch`).
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn diff_name_only(&self, base: &str, branch: &str) -> Result<Vec<String>> {
        let out = self.run(&["diff", "--name-only", &format!("{base}...{branch}")])?;
        Ok(lines(&out))
    }

    /// Paths currently unmerged (conflicted) in the working tree.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn unmerged_files(&self) -> Result<Vec<String>> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(lines(&out))
    }

    /// `git status --porcelain` output, for cleanliness checks.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn status_porcelain(&self) -> Result<String> {
        self.run(&["status", "--porcelain"])
    }

    /// Content of `path` at `refspec`, or `None` when the file does not
    /// exist there.
    ///
    /// # Errors
    /// Propagates unexpected git failures (anything but a missing path).
    pub fn show_file(&self, refspec: &str, path: &str) -> Result<Option<String>> {
        match self.run(&["show", &format!("{refspec}:{path}")]) {
            Ok(contents) => Ok(Some(contents)),
            Err(OverstoryError::Worktree { stderr, .. })
                if stderr.contains("does not exist") || stderr.contains("exists on disk") =>
            {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // -- merge --------------------------------------------------------------

    /// Attempt `git merge --no-edit <branch>`.
    ///
    /// A merge stopped by conflicts is not an error: the conflicted paths
    /// come back as [`MergeOutcome::Conflicted`]. Anything else propagates.
    ///
    /// # Errors
    /// Propagates non-conflict merge failures.
    pub fn merge(&self, branch: &str) -> Result<MergeOutcome> {
        match self.run_quiet(&["merge", "--no-edit", branch]) {
            Ok(()) => Ok(MergeOutcome::Clean),
            Err(merge_err) => {
                let conflicted = self.unmerged_files()?;
                if conflicted.is_empty() {
                    // Delete/modify conflicts list differently; re-check via
                    // status before giving up on the conflict
                    // interpretation.
                    let status = self.status_porcelain()?;
                    let from_status: Vec<String> = status
                        .lines()
                        .filter(|l| {
                            l.starts_with("UU")
                                | l.starts_with("AA")
                                | l.starts_with("DU")
                                | l.starts_with("UD")
                                | l.starts_with("AU")
                                | l.starts_with("UA")
                                | l.starts_with("DD")
                        })
                        .map(|l| l[3..].to_owned())
                        .collect();
                    if from_status.is_empty() {
                        return Err(merge_err);
                    }
                    return Ok(MergeOutcome::Conflicted(from_status));
                }
                Ok(MergeOutcome::Conflicted(conflicted))
            }
        }
    }

    /// Abort an in-progress merge. Best-effort: a repository with no merge
    /// in progress is left untouched.
    pub fn merge_abort(&self) {
        let _ = self.run_quiet(&["merge", "--abort"]);
    }

    /// Whether a merge is in progress (MERGE_HEAD exists).
    #[must_use]
    pub fn merge_in_progress(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])
            .current_dir(&self.root)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Stage one path.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn stage(&self, path: &str) -> Result<()> {
        self.run_quiet(&["add", "--", path])
    }

    /// Commit with a message (used for resolver commits).
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn commit(&self, message: &str) -> Result<()> {
        self.run_quiet(&["commit", "--no-edit", "-m", message])
    }

    /// Conclude a conflicted merge once everything is staged
    /// (`git commit --no-edit` keeps the prepared merge message).
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn commit_merge(&self) -> Result<()> {
        self.run_quiet(&["commit", "--no-edit"])
    }

    /// Restore one path in the index and working tree from HEAD.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn checkout_file(&self, path: &str) -> Result<()> {
        self.run_quiet(&["checkout", "HEAD", "--", path])
    }

    // -- worktrees ----------------------------------------------------------

    /// Create a worktree at `path` on a new branch `branch` based on `base`.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn worktree_add(&self, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        self.run_quiet(&["worktree", "add", "-b", branch, &path_str, base])
    }

    /// Remove a worktree, optionally forcing, optionally deleting its
    /// branch.
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn worktree_remove(
        &self,
        path: &Path,
        force: bool,
        force_branch: Option<&str>,
    ) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run_quiet(&args)?;
        if let Some(branch) = force_branch {
            self.delete_branch(branch, true)?;
        }
        Ok(())
    }

    /// List worktrees (`git worktree list --porcelain`).
    ///
    /// # Errors
    /// Propagates git's stderr on failure.
    pub fn worktree_list(&self) -> Result<Vec<WorktreeInfo>> {
        let out = self.run(&["worktree", "list", "--porcelain"])?;
        Ok(parse_worktree_list(&out))
    }
}

fn lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parse `git worktree list --porcelain` output.
fn parse_worktree_list(out: &str) -> Vec<WorktreeInfo> {
    let mut result = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    for line in out.lines() {
        if let Some(p) = line.strip_prefix("worktree ") {
            if let Some(prev) = path.take() {
                result.push(WorktreeInfo {
                    path: prev,
                    branch: branch.take(),
                });
            }
            path = Some(PathBuf::from(p));
            branch = None;
        } else if let Some(b) = line.strip_prefix("branch ") {
            branch = Some(
                b.strip_prefix("refs/heads/")
                    .unwrap_or(b)
                    .to_owned(),
            );
        }
    }
    if let Some(prev) = path {
        result.push(WorktreeInfo { path: prev, branch });
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    /// A scratch repository with an initial commit on `main`.
    struct TestRepo {
        _dir: tempfile::TempDir,
        git: Git,
    }

    impl TestRepo {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let git = Git::new(dir.path());
            git.run_quiet(&["init", "-b", "main"]).unwrap();
            git.run_quiet(&["config", "user.name", "tester"]).unwrap();
            git.run_quiet(&["config", "user.email", "tester@example.com"])
                .unwrap();
            fs::write(dir.path().join("README.md"), "hello\n").unwrap();
            git.stage("README.md").unwrap();
            git.commit("init").unwrap();
            Self { _dir: dir, git }
        }

        fn write(&self, path: &str, contents: &str) {
            let full = self.git.root().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, contents).unwrap();
        }

        fn commit_all(&self, message: &str) {
            self.git.run_quiet(&["add", "-A"]).unwrap();
            self.git.commit(message).unwrap();
        }
    }

    #[test]
    fn current_branch_and_existence() {
        let repo = TestRepo::new();
        assert_eq!(repo.git.current_branch().unwrap(), "main");
        assert!(repo.git.branch_exists("main"));
        assert!(!repo.git.branch_exists("overstory/alice/t-1"));
    }

    #[test]
    fn diff_name_only_against_merge_base() {
        let repo = TestRepo::new();
        repo.git
            .run_quiet(&["checkout", "-b", "overstory/alice/t-1"])
            .unwrap();
        repo.write("src/new.rs", "pub fn new() {}\n");
        repo.commit_all("add new");
        repo.git.checkout("main").unwrap();

        let files = repo
            .git
            .diff_name_only("main", "overstory/alice/t-1")
            .unwrap();
        assert_eq!(files, vec!["src/new.rs".to_owned()]);
    }

    #[test]
    fn clean_merge_outcome() {
        let repo = TestRepo::new();
        repo.git
            .run_quiet(&["checkout", "-b", "feature"])
            .unwrap();
        repo.write("added.txt", "x\n");
        repo.commit_all("feature work");
        repo.git.checkout("main").unwrap();

        let outcome = repo.git.merge("feature").unwrap();
        assert_eq!(outcome, MergeOutcome::Clean);
        assert!(repo.git.root().join("added.txt").exists());
    }

    #[test]
    fn content_conflict_reports_files() {
        let repo = TestRepo::new();
        repo.write("shared.txt", "base\n");
        repo.commit_all("base");

        repo.git.run_quiet(&["checkout", "-b", "feature"]).unwrap();
        repo.write("shared.txt", "feature side\n");
        repo.commit_all("feature");

        repo.git.checkout("main").unwrap();
        repo.write("shared.txt", "main side\n");
        repo.commit_all("main");

        let outcome = repo.git.merge("feature").unwrap();
        assert_eq!(
            outcome,
            MergeOutcome::Conflicted(vec!["shared.txt".to_owned()])
        );
        assert!(repo.git.merge_in_progress());
        repo.git.merge_abort();
        assert!(!repo.git.merge_in_progress());
        assert_eq!(repo.git.status_porcelain().unwrap(), "");
    }

    #[test]
    fn merge_abort_without_merge_is_noop() {
        let repo = TestRepo::new();
        repo.git.merge_abort();
        assert_eq!(repo.git.current_branch().unwrap(), "main");
    }

    #[test]
    fn show_file_present_and_absent() {
        let repo = TestRepo::new();
        let contents = repo.git.show_file("main", "README.md").unwrap();
        assert_eq!(contents.as_deref(), Some("hello\n"));
        assert_eq!(repo.git.show_file("main", "ghost.txt").unwrap(), None);
    }

    #[test]
    fn worktree_add_list_remove() {
        let repo = TestRepo::new();
        let wt_path = repo.git.root().join(".overstory/worktrees/alice");
        repo.git
            .worktree_add(&wt_path, "overstory/alice/t-1", "main")
            .unwrap();

        assert!(wt_path.join("README.md").exists());
        let listed = repo.git.worktree_list().unwrap();
        assert!(
            listed
                .iter()
                .any(|w| w.branch.as_deref() == Some("overstory/alice/t-1")),
            "worktree branch should be listed: {listed:?}"
        );

        repo.git
            .worktree_remove(&wt_path, true, Some("overstory/alice/t-1"))
            .unwrap();
        assert!(!wt_path.exists());
        assert!(!repo.git.branch_exists("overstory/alice/t-1"));
    }

    #[test]
    fn worktree_error_carries_stderr() {
        let repo = TestRepo::new();
        let err = repo
            .git
            .worktree_add(
                &repo.git.root().join("wt"),
                "overstory/x/t",
                "no-such-base",
            )
            .unwrap_err();
        assert_eq!(err.code(), "WORKTREE");
        let msg = format!("{err}");
        assert!(msg.contains("git worktree add"), "message: {msg}");
    }

    #[test]
    fn parse_worktree_list_porcelain() {
        let out = "worktree /repo\nHEAD abc\nbranch refs/heads/main\n\n\
                   worktree /repo/.overstory/worktrees/alice\nHEAD def\n\
                   branch refs/heads/overstory/alice/t-1\n\n\
                   worktree /repo/detached\nHEAD 123\ndetached\n";
        let parsed = parse_worktree_list(out);
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].branch.as_deref(), Some("main"));
        assert_eq!(
            parsed[1].branch.as_deref(),
            Some("overstory/alice/t-1")
        );
        assert_eq!(parsed[2].branch, None);
    }
}
