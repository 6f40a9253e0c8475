//! Fix application
//!
//! One remediation attempt per (file, rule). Two backends share the same
//! contract: an external editing tool that mutates the working tree (diff
//! captured through the ChangeTracker), or the oracle itself returning a
//! full replacement source (diffed in memory). Advisor mode never touches
//! the filesystem; that branch returns before any write or tool spawn,
//! because the oracle cannot be trusted to honor a textual instruction.

use crate::config::Config;
use crate::oracle::{parse, prompts, ChatBackend};
use crate::tracker::ChangeTracker;
use crate::util::{count_hunks, run_command_with_timeout, truncate, unified_diff};
use crate::workspace::SourceUnit;
use anyhow::{bail, Context, Result};
use std::fs;
use std::process::Command;
use std::time::Duration;

/// Remediation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixMode {
    /// Minimal edit, behavior preserved.
    Strict,
    /// Strict plus permission for minor non-functional cleanup.
    Improvement,
    /// Suggestions only; the working tree is never modified.
    Advisor,
}

impl FixMode {
    pub fn label(&self) -> &'static str {
        match self {
            FixMode::Strict => "strict",
            FixMode::Improvement => "improvement",
            FixMode::Advisor => "advisor",
        }
    }
}

/// Result of one remediation attempt that did not error.
#[derive(Debug, Clone)]
pub struct FixApplied {
    /// Unified diff of the attempt, or an advisory suggestion. Empty when
    /// nothing changed.
    pub patch: String,
    /// Files touched on disk, relative to the tracked root.
    pub modified_files: Vec<String>,
    /// One-line human summary for the report.
    pub summary: String,
    /// Whether the working copy was actually modified.
    pub changed: bool,
}

impl FixApplied {
    fn unchanged(summary: &str) -> Self {
        Self {
            patch: String::new(),
            modified_files: Vec::new(),
            summary: summary.to_string(),
            changed: false,
        }
    }
}

/// External editing tool plus the tracker that captures its effects.
pub struct ToolBackend {
    pub command: String,
    pub tracker: ChangeTracker,
}

/// Applies one rule's fix to one source unit.
pub struct FixEngine<'a> {
    config: &'a Config,
    oracle: Option<&'a dyn ChatBackend>,
    tool: Option<ToolBackend>,
}

impl<'a> FixEngine<'a> {
    pub fn new(
        config: &'a Config,
        oracle: Option<&'a dyn ChatBackend>,
        tool: Option<ToolBackend>,
    ) -> Self {
        Self {
            config,
            oracle,
            tool,
        }
    }

    /// Run one remediation attempt. Errors are recovered by the caller and
    /// recorded as `failed`; they never abort the surrounding loop.
    pub async fn apply(
        &self,
        mode: FixMode,
        unit: &mut SourceUnit,
        rule: &str,
        rule_text: &str,
    ) -> Result<FixApplied> {
        // Advisor short-circuits here so no code path below can write.
        if mode == FixMode::Advisor {
            return self.advise(unit, rule, rule_text).await;
        }

        match &self.tool {
            Some(tool) => self.apply_with_tool(tool, mode, unit, rule, rule_text),
            None => self.apply_with_oracle(mode, unit, rule, rule_text).await,
        }
    }

    /// Ask the oracle for a suggestion without applying anything.
    async fn advise(&self, unit: &SourceUnit, rule: &str, rule_text: &str) -> Result<FixApplied> {
        let oracle = self
            .oracle
            .context("advisor mode requires an oracle (set API_KEY)")?;
        let filename = unit.rel.display().to_string();
        let reply = oracle
            .chat(
                prompts::ADVISOR_SYSTEM,
                &prompts::advisor_request(rule, rule_text, &filename, &unit.content),
            )
            .await?;

        let suggestion =
            parse::extract_fenced_code(&reply).unwrap_or_else(|| reply.trim().to_string());
        Ok(FixApplied {
            patch: suggestion,
            modified_files: Vec::new(),
            summary: "advisory suggestion recorded, files left untouched".to_string(),
            changed: false,
        })
    }

    /// Full-replacement path: the oracle returns the whole fixed file.
    async fn apply_with_oracle(
        &self,
        mode: FixMode,
        unit: &mut SourceUnit,
        rule: &str,
        rule_text: &str,
    ) -> Result<FixApplied> {
        let oracle = self
            .oracle
            .context("fixing without an external tool requires an oracle (set API_KEY)")?;

        let filename = unit.rel.display().to_string();
        let mut request = prompts::fix_request(rule, rule_text, &filename, &unit.content);
        if mode == FixMode::Improvement {
            request.push_str(prompts::IMPROVEMENT_NOTE);
        }

        let reply = oracle.chat(prompts::FIX_SYSTEM, &request).await?;
        let proposed = match parse::extract_fenced_code(&reply) {
            Some(code) => code,
            // No fence: treat the whole reply as the replacement source.
            None => reply,
        };

        if proposed == unit.content {
            return Ok(FixApplied::unchanged("no changes proposed"));
        }

        let patch = unified_diff(&unit.content, &proposed, &unit.rel);
        fs::write(&unit.path, &proposed)
            .with_context(|| format!("failed to write {}", unit.path.display()))?;
        unit.content = proposed;

        Ok(FixApplied {
            summary: format!("replaced file content, {} patch hunks", count_hunks(&patch)),
            modified_files: vec![filename],
            patch,
            changed: true,
        })
    }

    /// Tool path: spawn the external editor and diff whatever it did.
    fn apply_with_tool(
        &self,
        tool: &ToolBackend,
        mode: FixMode,
        unit: &mut SourceUnit,
        rule: &str,
        rule_text: &str,
    ) -> Result<FixApplied> {
        let baseline = tool.tracker.snapshot()?;

        let instruction = match mode {
            FixMode::Strict => prompts::strict_instruction(rule, rule_text),
            FixMode::Improvement => prompts::improvement_instruction(rule, rule_text),
            // Advisor never reaches a backend; see apply().
            FixMode::Advisor => unreachable!("advisor mode short-circuits before any backend"),
        };

        let mut cmd = Command::new(&tool.command);
        cmd.arg("--message").arg(&instruction);
        if !self.config.model.is_empty() {
            cmd.arg("--model").arg(&self.config.model);
        }
        cmd.arg(&unit.path);
        // The tool runs its own model backend; hand it our credentials.
        if let Some(key) = &self.config.api_key {
            cmd.env("OPENAI_API_KEY", key).env("API_KEY", key);
        }
        if let Some(base) = &self.config.api_base {
            cmd.env("OPENAI_API_BASE", base);
        }
        if !self.config.model.is_empty() {
            cmd.env("OPENAI_MODEL", &self.config.model);
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let run = run_command_with_timeout(&mut cmd, timeout)?;
        if run.timed_out {
            bail!(
                "{} timed out after {}s",
                tool.command,
                self.config.timeout_secs
            );
        }
        let succeeded = run.status.map(|s| s.success()).unwrap_or(false);
        if !succeeded {
            bail!(
                "{} exited with failure: {}",
                tool.command,
                truncate(run.stderr.trim(), 400)
            );
        }

        let (patch, modified_files) = tool.tracker.diff_since(&baseline)?;
        if patch.trim().is_empty() {
            return Ok(FixApplied::unchanged("tool made no changes"));
        }

        // Refresh the accumulator so the next rule sees the edited content.
        unit.content = fs::read_to_string(&unit.path)
            .with_context(|| format!("failed to re-read {}", unit.path.display()))?;

        Ok(FixApplied {
            summary: format!(
                "{} modified {} files, {} patch hunks",
                tool.command,
                modified_files.len(),
                count_hunks(&patch)
            ),
            modified_files,
            patch,
            changed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct CannedBackend {
        reply: String,
    }

    #[async_trait]
    impl ChatBackend for CannedBackend {
        async fn chat(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(self.reply.clone())
        }
    }

    fn test_config() -> Config {
        Config {
            model: "test-model".to_string(),
            api_key: Some("sk-test".to_string()),
            api_base: None,
            kb_dir: PathBuf::from("knowledge_base"),
            max_rules: 10,
            fix_tool: None,
            timeout_secs: 30,
        }
    }

    fn unit_on_disk(dir: &std::path::Path, content: &str) -> SourceUnit {
        let path = dir.join("input.c");
        fs::write(&path, content).unwrap();
        SourceUnit {
            path,
            rel: PathBuf::from("input.c"),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_oracle_replacement_is_applied_and_threaded() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(dir.path(), "int x = 0;\n");
        let config = test_config();
        let backend = CannedBackend {
            reply: "```c\nint y = 0;\n```".to_string(),
        };
        let engine = FixEngine::new(&config, Some(&backend), None);

        let res = engine
            .apply(FixMode::Strict, &mut unit, "X.Y", "rename it")
            .await
            .unwrap();
        assert!(res.changed);
        assert!(res.patch.contains("+int y = 0;"));
        assert_eq!(res.modified_files, vec!["input.c".to_string()]);
        assert_eq!(unit.content, "int y = 0;\n");
        assert_eq!(fs::read_to_string(&unit.path).unwrap(), "int y = 0;\n");
    }

    #[tokio::test]
    async fn test_identical_replacement_is_no_change_and_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(dir.path(), "int x = 0;\n");
        let config = test_config();
        let backend = CannedBackend {
            reply: "```c\nint x = 0;\n```".to_string(),
        };
        let engine = FixEngine::new(&config, Some(&backend), None);

        for _ in 0..2 {
            let res = engine
                .apply(FixMode::Strict, &mut unit, "X.Y", "rule text")
                .await
                .unwrap();
            assert!(!res.changed);
            assert!(res.patch.is_empty());
        }
        assert_eq!(fs::read_to_string(&unit.path).unwrap(), "int x = 0;\n");
    }

    #[tokio::test]
    async fn test_advisor_never_touches_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(dir.path(), "int x = 0;\n");
        let config = test_config();
        let backend = CannedBackend {
            reply: "```diff\n--- a/input.c\n+++ b/input.c\n@@ -1 +1 @@\n-int x = 0;\n+int y = 0;\n```"
                .to_string(),
        };
        let engine = FixEngine::new(&config, Some(&backend), None);

        let res = engine
            .apply(FixMode::Advisor, &mut unit, "X.Y", "rule text")
            .await
            .unwrap();
        assert!(!res.changed);
        assert!(res.patch.contains("+int y = 0;"));
        assert!(res.modified_files.is_empty());
        // Disk and accumulator are both untouched.
        assert_eq!(fs::read_to_string(&unit.path).unwrap(), "int x = 0;\n");
        assert_eq!(unit.content, "int x = 0;\n");
    }

    #[tokio::test]
    async fn test_unfenced_reply_is_taken_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(dir.path(), "int x = 0;\n");
        let config = test_config();
        let backend = CannedBackend {
            reply: "int z = 2;\n".to_string(),
        };
        let engine = FixEngine::new(&config, Some(&backend), None);

        let res = engine
            .apply(FixMode::Strict, &mut unit, "X.Y", "rule text")
            .await
            .unwrap();
        assert!(res.changed);
        assert_eq!(unit.content, "int z = 2;\n");
    }

    #[tokio::test]
    async fn test_missing_oracle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(dir.path(), "int x = 0;\n");
        let mut config = test_config();
        config.api_key = None;
        let engine = FixEngine::new(&config, None, None);

        let err = engine
            .apply(FixMode::Strict, &mut unit, "X.Y", "rule text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API_KEY"));
    }
}
