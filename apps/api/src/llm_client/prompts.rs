// Shared prompt fragments.
// Each assessment flow defines its own system prompt in assessment/prompts.rs;
// this file holds the rules every one of them ends with.

/// Appended to every system prompt that expects a JSON answer.
pub const JSON_ONLY_RULES: &str = "\
    RULES\n\
    - Return JSON ONLY. Do NOT wrap it in markdown code fences.\n\
    - Do NOT include explanations, greetings or apologies outside the JSON object.\n\
    - Return exactly one JSON object.\n\
    - If unsure of a score, choose the nearest integer level.";

/// Glues a flow-specific system prompt to the shared JSON rules.
pub fn with_json_rules(system: &str) -> String {
    format!("{}\n\n{}", system.trim_end(), JSON_ONLY_RULES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_are_appended_once() {
        let prompt = with_json_rules("You are an examiner.\n\n");
        assert!(prompt.starts_with("You are an examiner.\n\nRULES"));
        assert_eq!(prompt.matches("RULES").count(), 1);
    }
}
