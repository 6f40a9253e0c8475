//! Post-processing of oracle replies.
//!
//! Replies arrive as free text that may or may not contain the structure we
//! asked for; these helpers pull out fenced code blocks and JSON fragments
//! without trusting the surrounding prose.

use regex::Regex;

/// Strip markdown code fences from a response.
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Extract the first fenced code block from a reply.
///
/// The fence language tag (```c, ```diff, bare ```) is ignored. The block
/// body is trimmed and terminated with a single newline.
pub fn extract_fenced_code(reply: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z]*\r?\n(.*?)```").ok()?;
    let captures = re.captures(reply)?;
    let body = captures.get(1)?.as_str().trim();
    if body.is_empty() {
        return None;
    }
    Some(format!("{}\n", body))
}

/// Extract a JSON array fragment between the outermost brackets.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}
