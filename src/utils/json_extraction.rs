//! JSON extraction utilities for parsing LLM responses.
//!
//! Providers asked for a JSON object frequently wrap it in a markdown code
//! fence or surround it with explanatory prose. This module locates the
//! object and reports which wrapping had to be stripped, so callers can log
//! the repair.
//!
//! # Extraction Strategies
//!
//! 1. Direct JSON (content is exactly one object)
//! 2. JSON inside a markdown code fence (```json ... ``` or ``` ... ```)
//! 3. First complete JSON object anywhere in the content (brace matching)
//!
//! # Example
//!
//! ```
//! use neuroadapt::utils::json_extraction::extract_json_object;
//!
//! let response = "Here is the result: {\"name\": \"example\", \"value\": 42}";
//! let extracted = extract_json_object(response).expect("object found");
//! assert_eq!(extracted.json, "{\"name\": \"example\", \"value\": 42}");
//! assert!(extracted.stripped_prose);
//! ```

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// A JSON object located inside a provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedJson {
    /// The object text, from its opening to its closing brace.
    pub json: String,
    /// A markdown code fence was removed.
    pub stripped_fence: bool,
    /// Text before or after the object was removed.
    pub stripped_prose: bool,
}

/// Locate the JSON object in an LLM response.
///
/// # Arguments
///
/// * `content` - Raw response text
///
/// # Errors
///
/// Returns `JsonExtractionError::Truncated` when an object starts but never
/// closes, and `JsonExtractionError::NotFound` when there is no `{` at all.
pub fn extract_json_object(content: &str) -> Result<ExtractedJson, JsonExtractionError> {
    let trimmed = content.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return Ok(ExtractedJson {
                json: trimmed[..=end].to_string(),
                stripped_fence: false,
                stripped_prose: end + 1 < trimmed.len(),
            });
        }
    }

    if let Some(body_start) = code_fence_body_start(trimmed) {
        let body = &trimmed[body_start..];
        if let Some(start) = body.find('{') {
            if let Some(end) = find_matching_brace(&body[start..]) {
                let json = &body[start..=start + end];
                let before = trimmed[..body_start].trim_end();
                let fence_open = before.rfind("```").unwrap_or(0);
                let after = body[start + end + 1..].trim();
                let after = after.strip_prefix("```").unwrap_or(after);
                let had_text = !trimmed[..fence_open].trim().is_empty()
                    || !after.trim().is_empty()
                    || !body[..start].trim().is_empty();
                return Ok(ExtractedJson {
                    json: json.to_string(),
                    stripped_fence: true,
                    stripped_prose: had_text,
                });
            }
        }
    }

    let Some(start) = trimmed.find('{') else {
        return Err(JsonExtractionError::NotFound {
            content_preview: preview(trimmed, 50),
        });
    };

    match find_matching_brace(&trimmed[start..]) {
        Some(end) => Ok(ExtractedJson {
            json: trimmed[start..=start + end].to_string(),
            stripped_fence: false,
            stripped_prose: start > 0 || start + end + 1 < trimmed.len(),
        }),
        None => Err(JsonExtractionError::Truncated {
            partial_preview: preview(&trimmed[start..], 100),
            unclosed_braces: unclosed_braces(&trimmed[start..]),
        }),
    }
}

/// Byte offset just past the opening line of the first markdown code fence.
fn code_fence_body_start(content: &str) -> Option<usize> {
    let re = Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?").ok()?;
    re.find(content).map(|m| m.end())
}

/// Helper function to find the matching closing brace for a JSON object.
///
/// This function properly handles:
/// - Nested braces and brackets
/// - String literals (including escaped quotes)
/// - Escape sequences within strings
///
/// # Arguments
///
/// * `s` - A string starting with '{'
///
/// # Returns
///
/// The byte index of the matching closing '}', or None if not found.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn unclosed_braces(s: &str) -> usize {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => depth -= 1,
            _ => {}
        }
    }

    depth.max(0) as usize
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let extracted = extract_json_object("  {\"a\": 1}\n").expect("found");
        assert_eq!(extracted.json, "{\"a\": 1}");
        assert!(!extracted.stripped_fence);
        assert!(!extracted.stripped_prose);
    }

    #[test]
    fn test_json_code_block() {
        let content = "```json\n{\"a\": {\"b\": [1, 2]}}\n```";
        let extracted = extract_json_object(content).expect("found");
        assert_eq!(extracted.json, "{\"a\": {\"b\": [1, 2]}}");
        assert!(extracted.stripped_fence);
        assert!(!extracted.stripped_prose);
    }

    #[test]
    fn test_code_block_with_prose() {
        let content = "Sure! Here you go:\n```\n{\"a\": 1}\n```\nLet me know if you need more.";
        let extracted = extract_json_object(content).expect("found");
        assert_eq!(extracted.json, "{\"a\": 1}");
        assert!(extracted.stripped_fence);
        assert!(extracted.stripped_prose);
    }

    #[test]
    fn test_fence_inside_string_value() {
        let content = "```json\n{\"body\": \"use ```rust``` blocks\", \"n\": 1}\n```";
        let extracted = extract_json_object(content).expect("found");
        assert_eq!(
            extracted.json,
            "{\"body\": \"use ```rust``` blocks\", \"n\": 1}"
        );
    }

    #[test]
    fn test_prose_around_object() {
        let content = "The answer is {\"key\": \"va}lue\"} as requested.";
        let extracted = extract_json_object(content).expect("found");
        assert_eq!(extracted.json, "{\"key\": \"va}lue\"}");
        assert!(extracted.stripped_prose);
    }

    #[test]
    fn test_escaped_quotes() {
        let content = r#"{"key": "value with \"quotes\" and }"}"#;
        let extracted = extract_json_object(content).expect("found");
        assert_eq!(extracted.json, content);
    }

    #[test]
    fn test_truncated() {
        let err = extract_json_object("{\"sections\": [{\"type\": \"step\"").unwrap_err();
        match err {
            JsonExtractionError::Truncated {
                unclosed_braces, ..
            } => assert_eq!(unclosed_braces, 2),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn test_not_found() {
        let err = extract_json_object("I cannot help with that.").unwrap_err();
        assert!(matches!(err, JsonExtractionError::NotFound { .. }));
        assert!(err.to_string().contains("I cannot help"));
    }

    #[test]
    fn test_find_matching_brace() {
        assert_eq!(find_matching_brace("{}"), Some(1));
        assert_eq!(find_matching_brace("{\"a\": {}}"), Some(8));
        assert_eq!(find_matching_brace("{"), None);
    }
}
