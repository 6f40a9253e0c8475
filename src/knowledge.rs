//! Knowledge base of static-analysis rule guidance
//!
//! One document per rule, named `<RuleId>.<ext>` (`FNH.MIGHT.md` carries the
//! guidance for `FNH.MIGHT`). The mapping is immutable after load.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Rule id to guidance text mapping.
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    rules: BTreeMap<String, String>,
}

impl KnowledgeStore {
    /// Load every guidance document in `dir`.
    ///
    /// The rule id is the filename stem, dot-separated segments preserved.
    /// Documents are decoded as UTF-8 first, falling over to a permissive
    /// lossy decode; a document that cannot be read at all is skipped with a
    /// warning and does not abort the rest of the load.
    pub fn load(dir: &Path) -> Result<Self> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("knowledge base directory not found: {}", dir.display()))?;

        let mut rules = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.is_empty() {
                continue;
            }

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!(
                        "  Warning: could not read rule document {}: {}",
                        path.display(),
                        e
                    );
                    continue;
                }
            };
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    let bytes = e.into_bytes();
                    String::from_utf8_lossy(&bytes).into_owned()
                }
            };

            rules.insert(stem.to_string(), text);
        }

        Ok(Self { rules })
    }

    /// Look up the full guidance text for a rule id.
    pub fn get(&self, rule: &str) -> Option<&str> {
        self.rules.get(rule).map(String::as_str)
    }

    /// Iterate over (rule id, guidance text) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
