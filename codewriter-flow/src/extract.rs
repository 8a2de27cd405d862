//! Pull structured answers out of free-form model text.
//!
//! Models wrap JSON in Markdown fences and code in ```` ```python ```` fences even
//! when told not to. These helpers undo that.

use codewriter_error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

static JSON_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\n(.*?)\n```").expect("valid json block pattern"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```$").expect("valid code fence pattern")
});

/// Return the interior of the first ```` ```json ```` block, trimmed.
///
/// Text without such a block is returned trimmed.
pub fn parse_json(raw: &str) -> &str {
    match JSON_BLOCK.captures(raw).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => raw.trim(),
    }
}

/// Remove one Markdown fence wrapping the whole text, if there is one
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => trimmed,
    }
}

/// The crew's answer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewVerdict {
    #[serde(deserialize_with = "bool_like")]
    pub passed: bool,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReviewVerdict {
    /// Extract the JSON block from `raw` and decode it
    pub fn from_crew_output(raw: &str) -> Result<Self> {
        let json = parse_json(raw);
        serde_json::from_str(json).map_err(|e| {
            Error::parse_failed(format!("crew answer is not a verdict: {}", e))
                .with_operation("review_verdict::from_crew_output")
                .with_context("answer", preview(json))
                .set_source(e)
        })
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

fn bool_like<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "pass" | "passed"
        ),
        serde_json::Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use codewriter_error::ErrorKind;

    #[test]
    fn test_parse_json_returns_block_interior() {
        let raw = "Here you go:\n```json\n{\"passed\": true}\n```\nThanks";
        assert_eq!(parse_json(raw), "{\"passed\": true}");
    }

    #[test]
    fn test_parse_json_takes_first_block() {
        let raw = "```json\n{\"a\": 1}\n```\n```json\n{\"b\": 2}\n```";
        assert_eq!(parse_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_without_block_trims() {
        assert_eq!(parse_json("  {\"passed\": false}\n\n"), "{\"passed\": false}");
        // fence not followed by a newline is not a block
        assert_eq!(parse_json("```json {\"x\": 1}```"), "```json {\"x\": 1}```");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```python\ndef f():\n    pass\n```"), "def f():\n    pass");
        assert_eq!(strip_code_fence("```\nx = 1\n```\n"), "x = 1");
        assert_eq!(strip_code_fence("x = 1\n"), "x = 1");
        // inner fences are left alone
        let text = "print('```')\nx = 1";
        assert_eq!(strip_code_fence(text), text);
    }

    #[test]
    fn test_verdict_from_crew_output() {
        let raw = "All good.\n```json\n{\"passed\": true, \"code\": \"def f(): pass\", \"notes\": \"ok\"}\n```";
        let verdict = ReviewVerdict::from_crew_output(raw).unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.code.as_deref(), Some("def f(): pass"));
        assert_eq!(verdict.notes.as_deref(), Some("ok"));
    }

    #[test]
    fn test_verdict_passed_is_bool_like() {
        let cases = [
            (r#"{"passed": "true"}"#, true),
            (r#"{"passed": "TRUE"}"#, true),
            (r#"{"passed": " Yes "}"#, true),
            (r#"{"passed": "passed"}"#, true),
            (r#"{"passed": "false"}"#, false),
            (r#"{"passed": "maybe"}"#, false),
            (r#"{"passed": 1}"#, true),
            (r#"{"passed": 0}"#, false),
            (r#"{"passed": null}"#, false),
        ];
        for (json, expected) in cases {
            let verdict = ReviewVerdict::from_crew_output(json).unwrap();
            assert_eq!(verdict.passed, expected, "{}", json);
            assert!(verdict.code.is_none());
        }
    }

    #[test]
    fn test_verdict_parse_errors() {
        let err = ReviewVerdict::from_crew_output("I could not finish the review").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
        assert_eq!(err.operation(), "review_verdict::from_crew_output");

        let err = ReviewVerdict::from_crew_output(r#"{"code": "x"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseFailed);
    }
}
