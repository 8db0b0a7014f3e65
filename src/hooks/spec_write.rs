//! Atomic task-spec writing.
//!
//! Specs land at `specs/<task-id>.md`, written via a temp file and rename
//! so a reader never observes a torn file. An optional attribution header
//! records who generated the spec, as an HTML comment so it renders
//! invisibly.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use crate::error::{OverstoryError, Result};
use crate::model::format_ts;
use crate::paths::StatePaths;

/// Write (or replace) the spec for a task.
///
/// # Errors
/// Rejects task ids that would escape the specs directory; propagates I/O
/// failures.
pub fn write_spec(
    paths: &StatePaths,
    task_id: &str,
    body: &str,
    attribution: Option<&str>,
) -> Result<PathBuf> {
    validate_task_id(task_id)?;
    let path = paths.spec_file(task_id);
    fs::create_dir_all(paths.specs_dir())?;

    let mut contents = String::new();
    if let Some(author) = attribution {
        contents.push_str(&format!(
            "<!-- spec for {task_id}, written by {author} at {} -->\n\n",
            format_ts(Utc::now())
        ));
    }
    contents.push_str(body);
    if !contents.ends_with('\n') {
        contents.push('\n');
    }

    let tmp = tempfile::NamedTempFile::new_in(paths.specs_dir())?;
    fs::write(tmp.path(), &contents)?;
    tmp.persist(&path).map_err(|e| OverstoryError::Io(e.error))?;
    Ok(path)
}

fn validate_task_id(task_id: &str) -> Result<()> {
    if task_id.is_empty() {
        return Err(OverstoryError::validation(
            "task id",
            task_id,
            "must be non-empty",
        ));
    }
    if task_id.contains('/') || task_id.contains('\\') || task_id.contains("..") {
        return Err(OverstoryError::validation(
            "task id",
            task_id,
            "must not contain path separators",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, StatePaths) {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::for_project(dir.path());
        paths.ensure_layout().unwrap();
        (dir, paths)
    }

    #[test]
    fn writes_spec_at_expected_path() {
        let (_dir, paths) = setup();
        let path = write_spec(&paths, "t-42", "# Build the thing", None).unwrap();
        assert_eq!(path, paths.spec_file("t-42"));
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "# Build the thing\n");
    }

    #[test]
    fn attribution_header_is_a_comment() {
        let (_dir, paths) = setup();
        let path = write_spec(&paths, "t-1", "body", Some("lead-1")).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("<!-- spec for t-1, written by lead-1 at "));
        assert!(contents.ends_with("body\n"));
    }

    #[test]
    fn rewrite_replaces_previous_content() {
        let (_dir, paths) = setup();
        write_spec(&paths, "t-1", "first", None).unwrap();
        write_spec(&paths, "t-1", "second", None).unwrap();
        let contents = fs::read_to_string(paths.spec_file("t-1")).unwrap();
        assert_eq!(contents, "second\n");
    }

    #[test]
    fn path_escaping_task_ids_rejected() {
        let (_dir, paths) = setup();
        for bad in ["", "../evil", "a/b", "a\\b", "x..y"] {
            let err = write_spec(&paths, bad, "body", None).unwrap_err();
            assert_eq!(err.code(), "VALIDATION", "task id: {bad:?}");
        }
    }
}
