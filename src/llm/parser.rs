use crate::error::{Error, Result};
use crate::models::analysis::RepoFindings;

/// Parses the analysis reply. A reply without usable JSON is kept as a
/// plain summary.
pub fn parse_findings(response: &str) -> Result<RepoFindings> {
    let parsed = extract_json(response).and_then(|json_str| {
        serde_json::from_str::<RepoFindings>(&json_str)
            .map_err(|e| Error::ParseError(format!("Failed to parse LLM response: {}", e)))
    });

    match parsed {
        Ok(findings) => Ok(findings),
        Err(e) if !response.trim().is_empty() => {
            tracing::warn!("Analysis reply was not structured ({}), keeping it as summary", e);
            Ok(RepoFindings {
                summary: response.trim().to_string(),
                ..RepoFindings::default()
            })
        }
        Err(e) => Err(e),
    }
}

fn extract_json(text: &str) -> Result<String> {
    // Try to find JSON block in markdown code blocks
    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return Ok(text[start..start + end].trim().to_string());
        }
    }

    // Try plain code block
    if let Some(start) = text.find("```") {
        let start = start + 3;
        // Skip any language identifier on the same line
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            let content = text[start..start + end].trim();
            if content.starts_with('{') {
                return Ok(content.to_string());
            }
        }
    }

    // Try to find raw JSON object
    if let Some(start) = text.find('{') {
        let mut depth = 0;
        let mut end = start;
        let mut in_string = false;
        let mut escape_next = false;

        for (i, c) in text[start..].char_indices() {
            if escape_next {
                escape_next = false;
                continue;
            }

            match c {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                '{' if !in_string => depth += 1,
                '}' if !in_string => {
                    depth -= 1;
                    if depth == 0 {
                        end = start + i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }

        if depth == 0 && end > start {
            return Ok(text[start..end].to_string());
        }
    }

    Err(Error::ParseError("No valid JSON found in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_markdown() {
        let input = r#"Here's the analysis:
```json
{"summary": "x"}
```
"#;
        let result = extract_json(input).unwrap();
        assert_eq!(result, r#"{"summary": "x"}"#);
    }

    #[test]
    fn test_extract_raw_json() {
        let input = r#"The result is {"summary": "é", "highlights": []} done"#;
        let result = extract_json(input).unwrap();
        assert_eq!(result, r#"{"summary": "é", "highlights": []}"#);
    }

    #[test]
    fn test_parse_findings_structured() {
        let findings = parse_findings(
            r#"{"summary": "A CLI.", "tech_stack": ["Rust"], "audience": "ops"}"#,
        )
        .unwrap();
        assert_eq!(findings.summary, "A CLI.");
        assert_eq!(findings.tech_stack, vec!["Rust"]);
        assert!(findings.highlights.is_empty());
    }

    #[test]
    fn test_parse_findings_falls_back_to_text() {
        let findings = parse_findings("Just prose about the project.").unwrap();
        assert_eq!(findings.summary, "Just prose about the project.");
        assert!(parse_findings("   ").is_err());
    }
}
