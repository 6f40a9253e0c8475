//! Configuration for rulemend
//!
//! All model-related settings come from the environment (with CLI overrides
//! applied in `main`). The resulting `Config` is built exactly once at
//! startup and passed by reference into every component; business logic
//! never reads environment variables on its own.

use std::env;
use std::path::PathBuf;

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_KB_DIR: &str = "knowledge_base";
pub const DEFAULT_MAX_RULES: usize = 10;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    /// Model identifier passed to the oracle and to the external tool.
    pub model: String,
    /// API credential. Absent means oracle-dependent operations are off.
    pub api_key: Option<String>,
    /// Base URL override (proxy, LiteLLM, etc.); provider default when unset.
    pub api_base: Option<String>,
    /// Directory of rule guidance documents, one per rule id.
    pub kb_dir: PathBuf,
    /// Ceiling on detected rule ids carried forward per file.
    pub max_rules: usize,
    /// External editing tool to run per rule (e.g. `aider`). When unset,
    /// fixes go through the oracle's full-replacement path instead.
    pub fix_tool: Option<String>,
    /// Upper bound on each oracle call and tool invocation.
    pub timeout_secs: u64,
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// Recognized variables: `MODEL_NAME`, `API_KEY` (or `OPENAI_API_KEY`),
    /// `API_BASE_URL` (or `OPENAI_API_BASE`), `KB_DIR`,
    /// `MAX_RULES_TO_PROCESS`, `FIX_TOOL`, `REQUEST_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let model = nonempty_var("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = nonempty_var("API_KEY").or_else(|| nonempty_var("OPENAI_API_KEY"));
        let api_base = nonempty_var("API_BASE_URL").or_else(|| nonempty_var("OPENAI_API_BASE"));
        let kb_dir = nonempty_var("KB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KB_DIR));
        let max_rules = nonempty_var("MAX_RULES_TO_PROCESS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_RULES);
        let fix_tool = nonempty_var("FIX_TOOL");
        let timeout_secs = nonempty_var("REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            model,
            api_key,
            api_base,
            kb_dir,
            max_rules,
            fix_tool,
            timeout_secs,
        }
    }

    /// Check whether an API credential is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

fn nonempty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
