//! Shared test harness: a scratch git repository with an initialized
//! `.overstory` state directory.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use overstory::config::OverstoryConfig;
use overstory::gitx::Git;
use overstory::paths::StatePaths;

pub struct TestProject {
    _dir: tempfile::TempDir,
    pub root: PathBuf,
    pub paths: StatePaths,
    pub config: OverstoryConfig,
}

impl TestProject {
    /// New scratch project: git repo on `main` with one commit, `.overstory`
    /// layout in place, defaults with stagger pacing disabled.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();

        git(&root, &["init", "-b", "main"]);
        git(&root, &["config", "user.name", "tester"]);
        git(&root, &["config", "user.email", "tester@example.com"]);
        std::fs::write(root.join("README.md"), "# test project\n").expect("write");
        git(&root, &["add", "-A"]);
        git(&root, &["commit", "-m", "init"]);

        let paths = StatePaths::for_project(&root);
        paths.ensure_layout().expect("layout");

        let mut config = OverstoryConfig::default();
        config.project.name = "testproj".to_owned();
        config.agents.stagger_delay_ms = 0;

        Self {
            _dir: dir,
            root,
            paths,
            config,
        }
    }

    pub fn git(&self) -> Git {
        Git::new(&self.root)
    }

    pub fn write_file(&self, path: &str, contents: &str) {
        let full = self.root.join(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("mkdir");
        }
        std::fs::write(full, contents).expect("write");
    }

    pub fn read_file(&self, path: &str) -> String {
        std::fs::read_to_string(self.root.join(path)).expect("read")
    }

    pub fn commit_all(&self, message: &str) {
        git(&self.root, &["add", "-A"]);
        git(&self.root, &["commit", "-m", message]);
    }

    pub fn checkout(&self, branch: &str) {
        git(&self.root, &["checkout", branch]);
    }

    pub fn checkout_new(&self, branch: &str) {
        git(&self.root, &["checkout", "-b", branch]);
    }

    /// Create `branch` off main with the given file contents committed,
    /// then return to main.
    pub fn feature_branch(&self, branch: &str, files: &[(&str, &str)]) {
        self.checkout_new(branch);
        for (path, contents) in files {
            self.write_file(path, contents);
        }
        self.commit_all(&format!("work on {branch}"));
        self.checkout("main");
    }
}

pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
