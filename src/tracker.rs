//! Git-backed change tracking
//!
//! External editing tools mutate the working tree outside our control, and
//! some of them commit on their own. The only observable contract is the
//! before/after diff, so every remediation attempt brackets the tool run
//! with `snapshot()` and `diff_since()` and never assumes commit behavior.

use anyhow::{bail, Context, Result};
use git2::{IndexAddOption, Repository, Signature};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Snapshot/diff facade over a git working tree.
pub struct ChangeTracker {
    root: PathBuf,
}

impl ChangeTracker {
    /// Open the repository containing `root`, initializing one (with a
    /// baseline commit of the current tree) when none exists. The bootstrap
    /// is one-time and idempotent.
    pub fn new(root: &Path) -> Result<Self> {
        let repo = match Repository::discover(root) {
            Ok(repo) => repo,
            Err(_) => {
                eprintln!(
                    "  Note: no git repository found at {}; initializing one for patch capture",
                    root.display()
                );
                Repository::init(root).context("failed to initialize git repository")?
            }
        };
        ensure_baseline(&repo)?;
        let root = repo
            .workdir()
            .context("cannot track changes in a bare repository")?
            .to_path_buf();
        Ok(Self { root })
    }

    /// Record the current baseline: the commit id HEAD points at.
    pub fn snapshot(&self) -> Result<String> {
        let repo = self.open()?;
        let head = repo.head().context("failed to resolve HEAD")?;
        let oid = head.target().context("HEAD has no commit")?;
        Ok(oid.to_string())
    }

    /// Compute the unified diff and touched files since `baseline`.
    ///
    /// When HEAD has advanced past the baseline (the tool committed), the
    /// diff spans `baseline..HEAD`; otherwise it is the working tree against
    /// the baseline. Callers never need to know which happened.
    pub fn diff_since(&self, baseline: &str) -> Result<(String, Vec<String>)> {
        let current = self.snapshot()?;
        let range = if current != baseline {
            format!("{}..{}", baseline, current)
        } else {
            baseline.to_string()
        };

        let patch = self.git_diff(&["diff", &range])?;
        let names = self.git_diff(&["diff", "--name-only", &range])?;
        let changed: Vec<String> = names
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        Ok((patch, changed))
    }

    fn open(&self) -> Result<Repository> {
        Repository::open(&self.root)
            .with_context(|| format!("failed to open repository at {}", self.root.display()))
    }

    fn git_diff(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .current_dir(&self.root)
            .args(args)
            .output()
            .context("failed to run git")?;

        // git diff exits 1 when differences exist; 0 and 1 are both success.
        let code = output.status.code().unwrap_or(-1);
        if code != 0 && code != 1 {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Commit the current tree as a baseline when the repository has no HEAD
/// yet. Trees with history are left alone.
fn ensure_baseline(repo: &Repository) -> Result<()> {
    if repo.head().is_ok() {
        return Ok(());
    }

    let mut index = repo.index().context("failed to read index")?;
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .context("failed to stage working tree")?;
    index.write().context("failed to write index")?;

    let tree_id = index.write_tree().context("failed to write tree")?;
    let tree = repo.find_tree(tree_id)?;
    let sig = Signature::now("rulemend", "rulemend@localhost")?;
    repo.commit(Some("HEAD"), &sig, &sig, "baseline snapshot", &tree, &[])
        .context("failed to create baseline commit")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn git_cli_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn commit_all(root: &Path, message: &str) {
        let repo = Repository::open(root).unwrap();
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("test", "test@localhost").unwrap();
        let parent = repo.head().unwrap().peel_to_commit().unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
            .unwrap();
    }

    #[test]
    fn test_bootstrap_and_working_tree_diff() {
        if !git_cli_available() {
            eprintln!("git binary unavailable, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.c");
        fs::write(&file, "int x = 0;\n").unwrap();

        let tracker = ChangeTracker::new(dir.path()).unwrap();
        let baseline = tracker.snapshot().unwrap();

        // No edits yet: empty diff is success, not an error.
        let (patch, changed) = tracker.diff_since(&baseline).unwrap();
        assert!(patch.is_empty());
        assert!(changed.is_empty());

        fs::write(&file, "int y = 0;\n").unwrap();
        let (patch, changed) = tracker.diff_since(&baseline).unwrap();
        assert!(patch.contains("-int x = 0;"));
        assert!(patch.contains("+int y = 0;"));
        assert_eq!(changed, vec!["input.c".to_string()]);
    }

    #[test]
    fn test_diff_spans_commits_when_tool_committed() {
        if !git_cli_available() {
            eprintln!("git binary unavailable, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.c");
        fs::write(&file, "int x = 0;\n").unwrap();

        let tracker = ChangeTracker::new(dir.path()).unwrap();
        let baseline = tracker.snapshot().unwrap();

        fs::write(&file, "int z = 1;\n").unwrap();
        commit_all(dir.path(), "tool committed on its own");

        let (patch, changed) = tracker.diff_since(&baseline).unwrap();
        assert!(patch.contains("+int z = 1;"));
        assert_eq!(changed, vec!["input.c".to_string()]);
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        if !git_cli_available() {
            eprintln!("git binary unavailable, skipping");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("input.c"), "int x;\n").unwrap();

        let first = ChangeTracker::new(dir.path()).unwrap();
        let snap_a = first.snapshot().unwrap();
        let second = ChangeTracker::new(dir.path()).unwrap();
        let snap_b = second.snapshot().unwrap();
        assert_eq!(snap_a, snap_b);
    }
}
