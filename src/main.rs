//! rulemend CLI entrypoint
//!
//! `fix` detects rule violations and applies fixes, `scan` only detects,
//! `advisor` produces suggestions without editing anything.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use rulemend::config::Config;
use rulemend::detect::RuleDetector;
use rulemend::engine::{FixEngine, FixMode, ToolBackend};
use rulemend::knowledge::KnowledgeStore;
use rulemend::oracle::{ChatBackend, OracleClient};
use rulemend::orchestrator::{GatePolicy, Orchestrator};
use rulemend::report::ReportAggregator;
use rulemend::tracker::ChangeTracker;
use rulemend::workspace::{gather_source_files, SourceUnit};

#[derive(Parser, Debug)]
#[command(
    name = "rulemend",
    about = "AI-assisted detection and remediation of MISRA/Klocwork rule violations in C code",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect rule violations and apply fixes
    Fix {
        /// File or directory to fix
        path: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Remediation mode
        #[arg(long, value_enum, default_value = "strict")]
        mode: ModeArg,

        /// Ask before applying each fix instead of auto-applying
        #[arg(long)]
        confirm: bool,

        /// External editing tool to run per rule (e.g. "aider")
        #[arg(long)]
        tool: Option<String>,

        /// Output directory for patches and reports
        #[arg(long, default_value = "outputs")]
        out: PathBuf,

        /// Per-call timeout for oracle and tool invocations, in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Detect violations only and print them
    Scan {
        /// File or directory to scan
        path: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,
    },

    /// Produce fix suggestions without editing files
    Advisor {
        /// File or directory to analyze
        path: PathBuf,

        #[command(flatten)]
        detection: DetectionArgs,

        /// Output directory for suggestions and reports
        #[arg(long, default_value = "outputs")]
        out: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct DetectionArgs {
    /// Knowledge base directory (one guidance document per rule)
    #[arg(long)]
    kb: Option<PathBuf>,

    /// Model name override
    #[arg(long)]
    model: Option<String>,

    /// Maximum detected rules carried forward per file
    #[arg(long)]
    max_rules: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Strict,
    Improve,
}

impl From<ModeArg> for FixMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => FixMode::Strict,
            ModeArg::Improve => FixMode::Improvement,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Fix {
            path,
            detection,
            mode,
            confirm,
            tool,
            out,
            timeout,
        } => run_fix(path, detection, mode.into(), confirm, tool, out, timeout).await,
        Command::Scan { path, detection } => run_scan(path, detection).await,
        Command::Advisor {
            path,
            detection,
            out,
        } => run_advisor(path, detection, out).await,
    }
}

fn build_config(detection: &DetectionArgs, tool: Option<String>, timeout: Option<u64>) -> Config {
    let mut config = Config::from_env();
    if let Some(kb) = &detection.kb {
        config.kb_dir = kb.clone();
    }
    if let Some(model) = &detection.model {
        config.model = model.clone();
    }
    if let Some(max_rules) = detection.max_rules {
        config.max_rules = max_rules;
    }
    if let Some(tool) = tool {
        config.fix_tool = Some(tool);
    }
    if let Some(timeout) = timeout {
        config.timeout_secs = timeout;
    }
    config
}

/// Build the oracle when a credential is configured, warning otherwise.
fn build_oracle(config: &Config) -> Result<Option<OracleClient>> {
    if config.has_api_key() {
        Ok(Some(OracleClient::new(config)?))
    } else {
        eprintln!("  Warning: API_KEY not set; the oracle is unavailable");
        Ok(None)
    }
}

async fn run_fix(
    path: PathBuf,
    detection: DetectionArgs,
    mode: FixMode,
    confirm: bool,
    tool: Option<String>,
    out: PathBuf,
    timeout: Option<u64>,
) -> Result<()> {
    let config = build_config(&detection, tool, timeout);
    let kb = KnowledgeStore::load(&config.kb_dir)?;
    println!("Loaded {} rules from {}", kb.len(), config.kb_dir.display());

    let path = path
        .canonicalize()
        .with_context(|| format!("path not found: {}", path.display()))?;
    let files = gather_source_files(&path);
    if files.is_empty() {
        println!("No C files found in {}", path.display());
        return Ok(());
    }

    let oracle = build_oracle(&config)?;
    if oracle.is_none() && config.fix_tool.is_none() {
        bail!("fixing requires API_KEY or an external tool (--tool / FIX_TOOL)");
    }

    let tool_backend = match &config.fix_tool {
        Some(command) => {
            let cwd = std::env::current_dir()?;
            Some(ToolBackend {
                command: command.clone(),
                tracker: ChangeTracker::new(&cwd)?,
            })
        }
        None => None,
    };

    let oracle_ref: Option<&dyn ChatBackend> = oracle.as_ref().map(|o| o as &dyn ChatBackend);
    let detector = RuleDetector::new(oracle_ref, &kb, config.max_rules);
    let engine = FixEngine::new(&config, oracle_ref, tool_backend);
    let gate = if confirm {
        GatePolicy::Confirm
    } else {
        GatePolicy::AutoApply
    };
    let orchestrator = Orchestrator::new(&kb, detector, engine, mode, gate);

    let mut aggregator = ReportAggregator::new(&out)?;
    let root = std::env::current_dir()?;
    for file in files {
        let mut unit = match SourceUnit::load(&file, &root) {
            Ok(unit) => unit,
            Err(e) => {
                eprintln!("  Warning: skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let (report, combined) = orchestrator.process_file(&mut unit, &aggregator).await;
        aggregator.record_file(&unit, report, &combined);
    }

    let full_patch = aggregator.full_patch_path();
    let full_report = aggregator.full_report_path();
    aggregator.finalize();

    println!();
    println!("Done. Aggregated patch: {}", full_patch.display());
    println!("Aggregated report: {}", full_report.display());
    println!("Per-file outputs are under: {}", out.display());
    Ok(())
}

async fn run_scan(path: PathBuf, detection: DetectionArgs) -> Result<()> {
    let config = build_config(&detection, None, None);
    let kb = KnowledgeStore::load(&config.kb_dir)?;
    println!("Loaded {} rules from {}", kb.len(), config.kb_dir.display());

    let path = path
        .canonicalize()
        .with_context(|| format!("path not found: {}", path.display()))?;
    let files = gather_source_files(&path);
    if files.is_empty() {
        println!("No C files found in {}", path.display());
        return Ok(());
    }

    let oracle = build_oracle(&config)?;
    if oracle.is_none() {
        eprintln!("  Note: detection will use local heuristics only");
    }
    let oracle_ref: Option<&dyn ChatBackend> = oracle.as_ref().map(|o| o as &dyn ChatBackend);
    let detector = RuleDetector::new(oracle_ref, &kb, config.max_rules);

    let root = std::env::current_dir()?;
    for file in files {
        let unit = match SourceUnit::load(&file, &root) {
            Ok(unit) => unit,
            Err(e) => {
                eprintln!("  Warning: skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let rules = detector.detect(&unit.content).await;
        let entry = serde_json::json!({ "file": unit.rel, "rules": rules });
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}

async fn run_advisor(path: PathBuf, detection: DetectionArgs, out: PathBuf) -> Result<()> {
    let config = build_config(&detection, None, None);
    let kb = KnowledgeStore::load(&config.kb_dir)?;
    println!("Loaded {} rules from {}", kb.len(), config.kb_dir.display());

    let path = path
        .canonicalize()
        .with_context(|| format!("path not found: {}", path.display()))?;
    let files = gather_source_files(&path);
    if files.is_empty() {
        println!("No C files found in {}", path.display());
        return Ok(());
    }

    let oracle = build_oracle(&config)?;
    let Some(oracle) = oracle else {
        bail!("advisor mode requires API_KEY");
    };

    let oracle_ref: Option<&dyn ChatBackend> = Some(&oracle as &dyn ChatBackend);
    let detector = RuleDetector::new(oracle_ref, &kb, config.max_rules);
    let engine = FixEngine::new(&config, oracle_ref, None);
    let orchestrator = Orchestrator::new(
        &kb,
        detector,
        engine,
        FixMode::Advisor,
        GatePolicy::AutoApply,
    );

    let mut aggregator = ReportAggregator::new(&out)?;
    let root = std::env::current_dir()?;
    for file in files {
        let mut unit = match SourceUnit::load(&file, &root) {
            Ok(unit) => unit,
            Err(e) => {
                eprintln!("  Warning: skipping {}: {}", file.display(), e);
                continue;
            }
        };
        let (report, combined) = orchestrator.process_file(&mut unit, &aggregator).await;
        aggregator.record_file(&unit, report, &combined);
    }

    let full_report = aggregator.full_report_path();
    aggregator.finalize();

    println!();
    println!("Done. Suggestions are under: {}", out.join("advisory").display());
    println!("Aggregated report: {}", full_report.display());
    Ok(())
}
