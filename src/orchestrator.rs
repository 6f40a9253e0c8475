//! The detection-and-remediation loop
//!
//! Drives one file at a time: detect candidate rules once, then walk the
//! sorted rule set sequentially, feeding each attempt the content the
//! previous attempt produced. Failures are caught at the single-attempt
//! boundary and recorded as outcomes; only configuration errors abort a
//! run.

use crate::detect::RuleDetector;
use crate::engine::{FixEngine, FixMode};
use crate::knowledge::KnowledgeStore;
use crate::report::{AttemptStatus, FileReport, ReportAggregator, RuleAttempt};
use crate::workspace::SourceUnit;
use std::io::{self, Write};
use std::path::Path;

/// Whether each apply needs a y/N confirmation on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    AutoApply,
    Confirm,
}

/// Drives the per-file, per-rule remediation state machine.
pub struct Orchestrator<'a> {
    kb: &'a KnowledgeStore,
    detector: RuleDetector<'a>,
    engine: FixEngine<'a>,
    mode: FixMode,
    gate: GatePolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        kb: &'a KnowledgeStore,
        detector: RuleDetector<'a>,
        engine: FixEngine<'a>,
        mode: FixMode,
        gate: GatePolicy,
    ) -> Self {
        Self {
            kb,
            detector,
            engine,
            mode,
            gate,
        }
    }

    /// Process one file end to end: detect, then attempt every rule.
    ///
    /// Returns the file's report and its combined patch text.
    pub async fn process_file(
        &self,
        unit: &mut SourceUnit,
        aggregator: &ReportAggregator,
    ) -> (FileReport, String) {
        println!("Analyzing {}", unit.rel.display());
        let rules = self.detector.detect(&unit.content).await;
        if rules.is_empty() {
            println!("  no rule violations detected");
        }
        self.attempt_rules(unit, &rules, aggregator).await
    }

    /// Walk a detected rule set in order. Every rule yields exactly one
    /// attempt record, whatever its outcome; a failed or missing rule never
    /// blocks the rules after it.
    pub async fn attempt_rules(
        &self,
        unit: &mut SourceUnit,
        rules: &[String],
        aggregator: &ReportAggregator,
    ) -> (FileReport, String) {
        let mut report = FileReport::new(unit.rel.clone());
        let mut combined: Vec<String> = Vec::new();

        for rule in rules {
            let (attempt, patch) = self.attempt_rule(unit, rule, aggregator).await;
            if let Some(patch) = patch {
                if !patch.trim().is_empty() {
                    combined.push(patch);
                }
            }
            report.rules.push(attempt);
        }

        (report, combined.join("\n"))
    }

    /// One (file, rule) attempt, converted to an outcome record.
    async fn attempt_rule(
        &self,
        unit: &mut SourceUnit,
        rule: &str,
        aggregator: &ReportAggregator,
    ) -> (RuleAttempt, Option<String>) {
        let Some(rule_text) = self.kb.get(rule) else {
            eprintln!(
                "  Warning: rule '{}' not found in knowledge base, skipping",
                rule
            );
            return (RuleAttempt::new(rule, AttemptStatus::MissingRule), None);
        };

        if self.gate == GatePolicy::Confirm
            && self.mode != FixMode::Advisor
            && !confirm_apply(rule, &unit.rel)
        {
            println!("  skipped {}", rule);
            return (RuleAttempt::new(rule, AttemptStatus::Skipped), None);
        }

        println!("  applying {} ({})", rule, self.mode.label());
        match self.engine.apply(self.mode, unit, rule, rule_text).await {
            Ok(res) if self.mode == FixMode::Advisor => {
                if res.patch.trim().is_empty() {
                    return (RuleAttempt::new(rule, AttemptStatus::NoChange), None);
                }
                let patch_file = aggregator.write_advisory_patch(rule, unit, &res.patch);
                let attempt = RuleAttempt::new(rule, AttemptStatus::Applied)
                    .with_summary(res.summary)
                    .with_patch_file(patch_file);
                // Advisory suggestions never join the applied-patch stream.
                (attempt, None)
            }
            Ok(res) if res.changed => {
                let patch_file = aggregator.write_rule_patch(rule, unit, &res.patch);
                let attempt = RuleAttempt::new(rule, AttemptStatus::Applied)
                    .with_summary(res.summary)
                    .with_patch_file(patch_file);
                (attempt, Some(res.patch))
            }
            Ok(res) => {
                println!("  no changes for {}", rule);
                let attempt =
                    RuleAttempt::new(rule, AttemptStatus::NoChange).with_summary(res.summary);
                (attempt, None)
            }
            Err(e) => {
                eprintln!("  Warning: fix for {} failed: {}", rule, e);
                let attempt =
                    RuleAttempt::new(rule, AttemptStatus::Failed).with_error(e.to_string());
                (attempt, None)
            }
        }
    }
}

/// Blocking y/N prompt on the control thread.
fn confirm_apply(rule: &str, file: &Path) -> bool {
    print!("Apply fix for {} to {}? (y/N): ", rule, file.display());
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::oracle::ChatBackend;
    use async_trait::async_trait;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedBackend {
        reply: String,
    }

    #[async_trait]
    impl ChatBackend for CannedBackend {
        async fn chat(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            Ok(self.reply.clone())
        }
    }

    /// Fails the first call, answers every later one.
    struct FlakyBackend {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait]
    impl ChatBackend for FlakyBackend {
        async fn chat(&self, _system: &str, _user: &str) -> anyhow::Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("backend exploded");
            }
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

    fn kb_with(rules: &[(&str, &str)]) -> KnowledgeStore {
        let dir = tempfile::tempdir().unwrap();
        for (id, text) in rules {
            fs::write(dir.path().join(format!("{}.md", id)), text).unwrap();
        }
        KnowledgeStore::load(dir.path()).unwrap()
    }

    fn unit_on_disk(dir: &Path, content: &str) -> SourceUnit {
        let path = dir.join("input.c");
        fs::write(&path, content).unwrap();
        SourceUnit {
            path,
            rel: PathBuf::from("input.c"),
            content: content.to_string(),
        }
    }

    fn orchestrator<'a>(
        kb: &'a KnowledgeStore,
        config: &'a Config,
        backend: Option<&'a dyn ChatBackend>,
        mode: FixMode,
    ) -> Orchestrator<'a> {
        let detector = RuleDetector::new(backend, kb, config.max_rules);
        let engine = FixEngine::new(config, backend, None);
        Orchestrator::new(kb, detector, engine, mode, GatePolicy::AutoApply)
    }

    #[tokio::test]
    async fn test_missing_rule_text_skips_the_engine() {
        let kb = kb_with(&[]);
        let config = test_config();
        // No backend at all: an engine invocation would come back `failed`,
        // so a `missing_rule` outcome proves the lookup short-circuits.
        let orch = orchestrator(&kb, &config, None, FixMode::Strict);

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(src.path(), "int x = 0;\n");
        let agg = ReportAggregator::new(out.path()).unwrap();

        let (report, combined) = orch
            .attempt_rules(&mut unit, &["NO.SUCH".to_string()], &agg)
            .await;
        assert_eq!(report.rules.len(), 1);
        assert_eq!(report.rules[0].status, AttemptStatus::MissingRule);
        assert!(combined.is_empty());
    }

    #[tokio::test]
    async fn test_failed_rule_does_not_block_the_next_one() {
        let kb = kb_with(&[("A.A", "first rule"), ("B.B", "second rule")]);
        let config = test_config();
        let backend = FlakyBackend {
            calls: AtomicUsize::new(0),
            reply: "```c\nint fixed = 1;\n```".to_string(),
        };
        let orch = orchestrator(&kb, &config, Some(&backend), FixMode::Strict);

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(src.path(), "int x = 0;\n");
        let agg = ReportAggregator::new(out.path()).unwrap();

        let rules = vec!["A.A".to_string(), "B.B".to_string()];
        let (report, combined) = orch.attempt_rules(&mut unit, &rules, &agg).await;

        // One attempt per detected rule, in order.
        assert_eq!(report.rules.len(), 2);
        assert_eq!(report.rules[0].rule, "A.A");
        assert_eq!(report.rules[0].status, AttemptStatus::Failed);
        assert!(report.rules[0]
            .error
            .as_deref()
            .unwrap()
            .contains("backend exploded"));
        assert_eq!(report.rules[1].status, AttemptStatus::Applied);
        assert_eq!(unit.content, "int fixed = 1;\n");
        assert!(combined.contains("+int fixed = 1;"));
    }

    #[tokio::test]
    async fn test_sequential_composition_threads_content() {
        let kb = kb_with(&[("A.A", "first rule"), ("B.B", "second rule")]);
        let config = test_config();
        let backend = CannedBackend {
            reply: "```c\nint fixed = 1;\n```".to_string(),
        };
        let orch = orchestrator(&kb, &config, Some(&backend), FixMode::Strict);

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(src.path(), "int x = 0;\n");
        let agg = ReportAggregator::new(out.path()).unwrap();

        let rules = vec!["A.A".to_string(), "B.B".to_string()];
        let (report, _) = orch.attempt_rules(&mut unit, &rules, &agg).await;

        // The first rule rewrites the file; the second sees the rewritten
        // content, proposes the identical text, and lands on no_change.
        assert_eq!(report.rules[0].status, AttemptStatus::Applied);
        assert_eq!(report.rules[1].status, AttemptStatus::NoChange);
        assert_eq!(unit.content, "int fixed = 1;\n");
    }

    #[tokio::test]
    async fn test_advisor_records_suggestion_without_mutation() {
        let kb = kb_with(&[("X.Y", "rule text")]);
        let config = test_config();
        let backend = CannedBackend {
            reply: "```diff\n--- a/input.c\n+++ b/input.c\n@@ -1 +1 @@\n-int x = 0;\n+int y = 0;\n```".to_string(),
        };
        let orch = orchestrator(&kb, &config, Some(&backend), FixMode::Advisor);

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(src.path(), "int x = 0;\n");
        let agg = ReportAggregator::new(out.path()).unwrap();

        let (report, combined) = orch
            .attempt_rules(&mut unit, &["X.Y".to_string()], &agg)
            .await;

        assert_eq!(report.rules[0].status, AttemptStatus::Applied);
        let advisory = report.rules[0].patch_file.as_ref().unwrap();
        assert!(advisory.starts_with(out.path().join("advisory")));
        assert!(advisory.is_file());
        // Advisory output never reaches the applied-patch stream or disk.
        assert!(combined.is_empty());
        assert_eq!(fs::read_to_string(&unit.path).unwrap(), "int x = 0;\n");
    }

    #[tokio::test]
    async fn test_empty_detection_yields_empty_report() {
        let kb = kb_with(&[("X.Y", "zzqqy wwvvk")]);
        let config = test_config();
        let orch = orchestrator(&kb, &config, None, FixMode::Strict);

        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut unit = unit_on_disk(src.path(), "int unrelated = 0;\n");
        let agg = ReportAggregator::new(out.path()).unwrap();

        let (report, combined) = orch.process_file(&mut unit, &agg).await;
        assert!(report.rules.is_empty());
        assert!(combined.is_empty());
    }
}
