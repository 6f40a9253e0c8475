//! Outcome records and artifact persistence
//!
//! Per-file artifacts (report, combined patch, modified snapshot) are
//! written as soon as a file finishes, so an interrupted run still leaves
//! valid partial output. The run-level patch and report are written exactly
//! once at the end. Artifact paths are deterministic functions of rule id
//! and relative file path, so reruns overwrite instead of accumulating.

use crate::workspace::SourceUnit;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Terminal outcome of one (file, rule) remediation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// A fix was applied and a diff captured.
    Applied,
    /// The attempt ran but produced no visible change.
    NoChange,
    /// The user declined the fix at the confirmation gate.
    Skipped,
    /// The detected rule has no guidance document.
    MissingRule,
    /// The oracle or tool failed; the error text is preserved.
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Applied => "applied",
            AttemptStatus::NoChange => "no_change",
            AttemptStatus::Skipped => "skipped",
            AttemptStatus::MissingRule => "missing_rule",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// Record of one remediation attempt, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleAttempt {
    pub rule: String,
    pub status: AttemptStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_file: Option<PathBuf>,
}

impl RuleAttempt {
    pub fn new(rule: &str, status: AttemptStatus) -> Self {
        Self {
            rule: rule.to_string(),
            status,
            summary: None,
            error: None,
            patch_file: None,
        }
    }

    pub fn with_summary(mut self, summary: String) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_patch_file(mut self, patch_file: Option<PathBuf>) -> Self {
        self.patch_file = patch_file;
        self
    }
}

/// All attempts for one source file plus its combined patch artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub rules: Vec<RuleAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_patch: Option<PathBuf>,
}

impl FileReport {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            rules: Vec::new(),
            file_patch: None,
        }
    }
}

/// The terminal artifact of one invocation.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub total_files: usize,
    pub results: Vec<FileReport>,
}

/// Accumulates file results and persists the output tree.
pub struct ReportAggregator {
    out_dir: PathBuf,
    results: Vec<FileReport>,
    run_patches: Vec<String>,
}

impl ReportAggregator {
    /// Create the output directory tree (`modified/`, `patches/`,
    /// `reports/`) under `out_dir`.
    pub fn new(out_dir: &Path) -> Result<Self> {
        for sub in ["modified", "patches", "reports"] {
            fs::create_dir_all(out_dir.join(sub))
                .with_context(|| format!("failed to create output directory {}", sub))?;
        }
        Ok(Self {
            out_dir: out_dir.to_path_buf(),
            results: Vec::new(),
            run_patches: Vec::new(),
        })
    }

    pub fn full_patch_path(&self) -> PathBuf {
        self.out_dir.join("full_repo.patch")
    }

    pub fn full_report_path(&self) -> PathBuf {
        self.out_dir.join("full_report.json")
    }

    /// Persist one rule's patch under `patches/<RULE>_<filename>.patch`.
    ///
    /// Returns the written path, or `None` when persistence failed (a
    /// warning, never an abort).
    pub fn write_rule_patch(&self, rule: &str, unit: &SourceUnit, patch: &str) -> Option<PathBuf> {
        let name = format!("{}_{}.patch", rule.replace('/', "_"), unit.file_name());
        let dest = self.out_dir.join("patches").join(name);
        write_text(&dest, patch)
    }

    /// Persist an advisory suggestion under
    /// `advisory/<RULE>_<filename>.patch` without touching the source tree.
    pub fn write_advisory_patch(
        &self,
        rule: &str,
        unit: &SourceUnit,
        suggestion: &str,
    ) -> Option<PathBuf> {
        let name = format!("{}_{}.patch", rule.replace('/', "_"), unit.file_name());
        let dest = self.out_dir.join("advisory").join(name);
        write_text(&dest, suggestion)
    }

    /// Record a finished file: write its combined patch, its JSON report,
    /// and (when something changed) a snapshot of the modified content.
    pub fn record_file(&mut self, unit: &SourceUnit, mut report: FileReport, combined_patch: &str) {
        if !report.rules.is_empty() {
            let dest = self
                .out_dir
                .join("patches")
                .join(append_extension(&unit.rel, ".patch"));
            report.file_patch = write_text(&dest, combined_patch);
        }

        if !combined_patch.is_empty() {
            let dest = self.out_dir.join("modified").join(&unit.rel);
            let _ = write_text(&dest, &unit.content);
            self.run_patches.push(combined_patch.to_string());
        }

        let dest = self
            .out_dir
            .join("reports")
            .join(append_extension(&unit.rel, ".json"));
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                write_text(&dest, &json);
            }
            Err(e) => eprintln!("  Warning: could not serialize report for {}: {}", unit.rel.display(), e),
        }

        self.results.push(report);
    }

    /// Write the run-level artifacts and hand back the aggregate report.
    pub fn finalize(self) -> RunReport {
        let combined = self.run_patches.join("\n");
        write_text(&self.full_patch_path(), &combined);

        let report = RunReport {
            generated_at: Utc::now(),
            total_files: self.results.len(),
            results: self.results,
        };
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                write_text(&self.out_dir.join("full_report.json"), &json);
            }
            Err(e) => eprintln!("  Warning: could not serialize run report: {}", e),
        }
        report
    }
}

/// Append a suffix to a relative path (`src/a.c` + `.patch` →
/// `src/a.c.patch`).
fn append_extension(rel: &Path, suffix: &str) -> PathBuf {
    let mut name = rel.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Best-effort text write with parent creation; failures warn and return
/// `None`.
fn write_text(path: &Path, content: &str) -> Option<PathBuf> {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("  Warning: could not create {}: {}", parent.display(), e);
            return None;
        }
    }
    match fs::write(path, content) {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            eprintln!("  Warning: could not write {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dir: &Path, rel: &str, content: &str) -> SourceUnit {
        SourceUnit {
            path: dir.join(rel),
            rel: PathBuf::from(rel),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&AttemptStatus::NoChange).unwrap(),
            "\"no_change\""
        );
        assert_eq!(
            serde_json::to_string(&AttemptStatus::MissingRule).unwrap(),
            "\"missing_rule\""
        );
        assert_eq!(AttemptStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_record_file_writes_per_file_artifacts() {
        let out = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let unit = unit(src.path(), "sub/input.c", "int y = 0;\n");

        let mut agg = ReportAggregator::new(out.path()).unwrap();
        let mut report = FileReport::new(unit.rel.clone());
        report.rules.push(
            RuleAttempt::new("X.Y", AttemptStatus::Applied).with_summary("fixed".to_string()),
        );
        agg.record_file(&unit, report, "--- a\n+++ b\n@@ -1 +1 @@\n-old\n+new\n");

        assert!(out.path().join("patches/sub/input.c.patch").is_file());
        assert!(out.path().join("reports/sub/input.c.json").is_file());
        let mirrored = fs::read_to_string(out.path().join("modified/sub/input.c")).unwrap();
        assert_eq!(mirrored, "int y = 0;\n");

        let report = agg.finalize();
        assert_eq!(report.total_files, 1);
        assert_eq!(report.results[0].rules[0].status, AttemptStatus::Applied);
        assert!(out.path().join("full_repo.patch").is_file());
        assert!(out.path().join("full_report.json").is_file());
    }

    #[test]
    fn test_unchanged_file_is_not_mirrored() {
        let out = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let unit = unit(src.path(), "input.c", "int x;\n");

        let mut agg = ReportAggregator::new(out.path()).unwrap();
        let mut report = FileReport::new(unit.rel.clone());
        report
            .rules
            .push(RuleAttempt::new("X.Y", AttemptStatus::NoChange));
        agg.record_file(&unit, report, "");

        assert!(!out.path().join("modified/input.c").exists());
        // An empty combined patch is still a valid per-file artifact.
        let patch = fs::read_to_string(out.path().join("patches/input.c.patch")).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_finalize_joins_patches_in_processing_order() {
        let out = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        let mut agg = ReportAggregator::new(out.path()).unwrap();

        for (name, patch) in [("a.c", "patch-a"), ("b.c", "patch-b")] {
            let unit = unit(src.path(), name, "content\n");
            let mut report = FileReport::new(unit.rel.clone());
            report
                .rules
                .push(RuleAttempt::new("X.Y", AttemptStatus::Applied));
            agg.record_file(&unit, report, patch);
        }

        let full_patch_path = agg.full_patch_path();
        let report = agg.finalize();
        assert_eq!(report.total_files, 2);
        assert_eq!(
            fs::read_to_string(full_patch_path).unwrap(),
            "patch-a\npatch-b"
        );
    }

    #[test]
    fn test_run_report_roundtrips_through_json() {
        let mut report = FileReport::new(PathBuf::from("input.c"));
        report.rules.push(
            RuleAttempt::new("A.B", AttemptStatus::Failed).with_error("tool exploded".to_string()),
        );
        let run = RunReport {
            generated_at: Utc::now(),
            total_files: 1,
            results: vec![report],
        };

        let json = serde_json::to_string_pretty(&run).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.total_files, 1);
        assert_eq!(parsed.results[0].rules[0].status, AttemptStatus::Failed);
        assert_eq!(
            parsed.results[0].rules[0].error.as_deref(),
            Some("tool exploded")
        );
    }
}
