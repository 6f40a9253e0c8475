//! Prompt construction for detection and remediation calls.

pub const DETECT_SYSTEM: &str = "You are an expert in MISRA C:2012 and Klocwork static analysis rules. You identify which rule IDs a C source file violates.";

pub fn detect_request(code: &str) -> String {
    format!(
        "Analyze the following C code and identify which MISRA/Klocwork rule IDs are violated.\n\
         Return ONLY a JSON array of rule names. No explanation, no text outside JSON.\n\n\
         Example output:\n\
         [\"FNH.MIGHT\", \"MISRA.DEFINE.WRONGNAME.UNDERSCORE\"]\n\n\
         C code to analyze:\n\
         --------------------\n\
         {code}\n\
         --------------------\n\n\
         Respond only with a JSON list of rule names."
    )
}

pub const FIX_SYSTEM: &str = "You are an assistant that fixes C source code to comply with a MISRA-like rule. Given the rule text and the original source file, return a single fenced code block with the entire fixed source. If you cannot confidently fix the violation, return the original file unchanged inside the fence and explain briefly outside it.";

pub fn fix_request(rule: &str, rule_text: &str, filename: &str, code: &str) -> String {
    format!(
        "Checker: {rule}\n\nRule and guidance:\n{rule_text}\n\n\
         File: {filename}\n\nOriginal source:\n```c\n{code}\n```"
    )
}

/// Extra permission appended to the fix request in improvement mode.
pub const IMPROVEMENT_NOTE: &str = "\nIn addition to the rule fix, you may apply small non-functional improvements (formatting, small refactors) only where they help clarity.";

pub const ADVISOR_SYSTEM: &str = "You are a static analysis advisor for C code. You produce unified-diff suggestions in your reply and never assume your changes are applied for you.";

pub fn advisor_request(rule: &str, rule_text: &str, filename: &str, code: &str) -> String {
    format!(
        "Inspect the file and produce a unified diff patch (as text in your reply) that would fix `{rule}` occurrences.\n\
         Provide a short explanation for each hunk.\n\n\
         Rule text:\n{rule_text}\n\n\
         File: {filename}\n\nSource:\n```c\n{code}\n```"
    )
}

/// Instruction message handed to the external editing tool in strict mode.
pub fn strict_instruction(rule: &str, rule_text: &str) -> String {
    format!(
        "Strict fix request for rule: {rule}\n\n\
         You are given the rule text below. Apply only the minimal code changes required to resolve the violation described.\n\
         - Do not change unrelated logic.\n\
         - Preserve function and variable names unless strictly necessary to fix the violation.\n\
         - Keep changes minimal and safe for compilation.\n\n\
         Rule text:\n{rule_text}\n\n\
         Now modify the provided C source file(s) to fix any occurrences of this rule.\n\
         When done, produce a short 1-2 sentence summary of the changes."
    )
}

/// Strict instruction plus permission for minor cleanup.
pub fn improvement_instruction(rule: &str, rule_text: &str) -> String {
    let mut instr = strict_instruction(rule, rule_text);
    instr.push_str(IMPROVEMENT_NOTE);
    instr
}
