//! Source file discovery and the per-file working unit.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A single source file under remediation.
///
/// `content` is the accumulator threaded through the rule loop: each
/// successful fix replaces it, so the next rule operates on the already
/// modified code.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the invocation root, used for artifact layout.
    pub rel: PathBuf,
    /// Current file content.
    pub content: String,
}

impl SourceUnit {
    pub fn load(path: &Path, root: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self {
            rel: relative_to(path, root),
            path: path.to_path_buf(),
            content,
        })
    }

    /// File name component, for per-rule artifact naming.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Return true for C source and header files.
pub fn is_c_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "c" || e == "h"
        })
        .unwrap_or(false)
}

/// Recursively collect `.c`/`.h` files under `path`.
///
/// A single C file yields itself; a directory is walked in sorted order so
/// file processing (and therefore report ordering) is deterministic.
pub fn gather_source_files(path: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if path.is_file() {
        if is_c_file(path) {
            files.push(path.to_path_buf());
        }
        return files;
    }

    for entry in WalkDir::new(path)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && is_c_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files
}

/// Compute `path` relative to `root`, falling back to the bare file name for
/// paths outside the root.
pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    match path.strip_prefix(root) {
        Ok(rel) => rel.to_path_buf(),
        Err(_) => match path.file_name() {
            Some(name) => PathBuf::from(name),
            None => path.to_path_buf(),
        },
    }
}
