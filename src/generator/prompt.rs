//! Prompt text sent to the model

use crate::analyzer::AnalyzeRequest;

pub const SYSTEM_PROMPT: &str = "You are an AI acting as a compiler/VM for educational visualization. \
ALWAYS return strictly valid JSON matching the AiResponse schema. \
Infer likely behavior even for incomplete or buggy code.";

const SCHEMA_HINT: &str = r#"Schema:
{
  "version": "1.0",
  "steps": [
    {
      "line": 1,
      "code": "let x = 7;",
      "variables": { "x": 7 },
      "stack": [ { "id": "f1", "functionName": "main", "locals": {}, "returnAddress": null } ],
      "heap": [ { "id": "h1", "type": "Array", "value": [1, 2] } ],
      "stdout": [],
      "errors": [],
      "calls": [ { "functionName": "add", "args": [2, 5] } ],
      "controlFlow": { "branch": "if-true", "loop": { "type": "for", "iteration": 0 } }
    }
  ],
  "finalState": { "variables": {}, "stack": [], "heap": [], "stdout": [], "errors": [] }
}"#;

/// User message for one request. Parts are separated by blank lines.
pub fn user_prompt(request: &AnalyzeRequest, previous_summary: Option<&str>) -> String {
    let mut parts = vec![format!("Language: {}", request.language)];
    if let Some(summary) = previous_summary.filter(|s| !s.is_empty()) {
        parts.push(format!("Previous summary: {}", summary));
    }
    parts.push("Code:".to_string());
    parts.push(request.code.clone());
    parts.push("Respond ONLY with JSON. If uncertain, make the best educational guess.".to_string());
    parts.push(SCHEMA_HINT.to_string());
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Language;

    #[test]
    fn test_user_prompt_layout() {
        let request = AnalyzeRequest::new(Language::Python, "print(1)", "s");
        let prompt = user_prompt(&request, None);
        assert!(prompt.starts_with("Language: python\n\nCode:\n\nprint(1)\n\nRespond ONLY"));
        assert!(!prompt.contains("Previous summary"));
    }

    #[test]
    fn test_user_prompt_with_summary() {
        let request = AnalyzeRequest::new(Language::C, "int x;", "s");
        let prompt = user_prompt(&request, Some("steps: 2"));
        assert!(prompt.contains("Language: c\n\nPrevious summary: steps: 2\n\nCode:"));
    }
}
