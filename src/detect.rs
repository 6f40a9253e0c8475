//! Rule detection
//!
//! Two independent strategies whose union feeds the fix loop: the oracle is
//! asked for a JSON list of rule ids, and a local heuristic matches known
//! ids and guidance keywords against the source text. The final candidate
//! set is sorted and deduplicated so reports are reproducible, then capped
//! at the configured ceiling.

use crate::knowledge::KnowledgeStore;
use crate::oracle::parse::{extract_json_array, strip_markdown_fences};
use crate::oracle::{prompts, ChatBackend};
use regex::Regex;
use std::collections::BTreeSet;

/// How many guidance keywords per rule feed the heuristic match.
const KEYWORDS_PER_RULE: usize = 6;

/// Outcome of interpreting the oracle's detection reply.
///
/// `Parsed` is the strict JSON-array payload we asked for; `Extracted` is
/// the permissive fallback that scans the raw reply for rule-shaped tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OracleRules {
    Parsed(Vec<String>),
    Extracted(Vec<String>),
}

/// Interpret a detection reply: strict JSON array first, token scan second.
pub fn parse_rule_response(reply: &str) -> OracleRules {
    let clean = strip_markdown_fences(reply);
    if let Some(fragment) = extract_json_array(clean) {
        if let Ok(ids) = serde_json::from_str::<Vec<String>>(fragment) {
            return OracleRules::Parsed(ids);
        }
    }
    OracleRules::Extracted(extract_rule_tokens(reply))
}

/// Scan free text for tokens shaped like rule ids (`FNH.MIGHT`,
/// `MISRA.DEFINE.WRONGNAME.UNDERSCORE`).
pub fn extract_rule_tokens(text: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"[A-Z][A-Z0-9_]*(?:\.[A-Z][A-Z0-9_]*)+") else {
        return Vec::new();
    };
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Local fallback strategy: exact id mentions plus keyword overlap with the
/// first line of each rule's guidance text.
pub fn heuristic_rules(code: &str, kb: &KnowledgeStore) -> Vec<String> {
    let code_lower = code.to_lowercase();
    let keyword_re = match Regex::new(r"[a-z]{3,}") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut found = Vec::new();
    for (rule, text) in kb.iter() {
        if code_lower.contains(&rule.to_lowercase()) {
            found.push(rule.to_string());
            continue;
        }

        let Some(first_line) = text.lines().next() else {
            continue;
        };
        let first_line = first_line.to_lowercase();
        for token in keyword_re.find_iter(&first_line).take(KEYWORDS_PER_RULE) {
            if code_lower.contains(token.as_str()) {
                found.push(rule.to_string());
                break;
            }
        }
    }
    found
}

/// Union both strategies, sort, deduplicate, then cap at the ceiling.
///
/// Truncation happens after sorting, so the kept prefix is stable across
/// runs regardless of discovery order.
pub fn merge_candidates(
    oracle: Vec<String>,
    heuristic: Vec<String>,
    ceiling: usize,
) -> Vec<String> {
    let set: BTreeSet<String> = oracle.into_iter().chain(heuristic).collect();
    let mut sorted: Vec<String> = set.into_iter().collect();
    if sorted.len() > ceiling {
        eprintln!(
            "  Note: {} candidate rules detected, keeping the first {}",
            sorted.len(),
            ceiling
        );
        sorted.truncate(ceiling);
    }
    sorted
}

/// Detects which rules a source file is suspected to violate.
pub struct RuleDetector<'a> {
    oracle: Option<&'a dyn ChatBackend>,
    kb: &'a KnowledgeStore,
    ceiling: usize,
}

impl<'a> RuleDetector<'a> {
    pub fn new(oracle: Option<&'a dyn ChatBackend>, kb: &'a KnowledgeStore, ceiling: usize) -> Self {
        Self { oracle, kb, ceiling }
    }

    /// Produce the sorted candidate rule set for one source text.
    ///
    /// An oracle failure is recovered, not fatal: detection degrades to the
    /// local heuristic and the caller carries on with the next file.
    pub async fn detect(&self, code: &str) -> Vec<String> {
        let mut oracle_ids = Vec::new();
        if let Some(oracle) = self.oracle {
            match oracle
                .chat(prompts::DETECT_SYSTEM, &prompts::detect_request(code))
                .await
            {
                Ok(reply) => match parse_rule_response(&reply) {
                    OracleRules::Parsed(ids) => oracle_ids = ids,
                    OracleRules::Extracted(ids) => {
                        if !ids.is_empty() {
                            eprintln!(
                                "  Note: detection reply was not a JSON list, recovered {} rule tokens",
                                ids.len()
                            );
                        }
                        oracle_ids = ids;
                    }
                },
                Err(e) => {
                    eprintln!(
                        "  Warning: rule detection call failed ({}); falling back to local heuristics",
                        e
                    );
                }
            }
        }

        let heuristic_ids = heuristic_rules(code, self.kb);
        merge_candidates(oracle_ids, heuristic_ids, self.ceiling)
    }
}
