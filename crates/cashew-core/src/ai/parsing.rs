//! JSON parsing helpers for AI backend responses
//!
//! Models often wrap the JSON payload in prose or code fences even when a
//! response schema is requested, so the payload is located before parsing.

use crate::error::{Error, Result};

use super::types::{CategoryAssignment, ClassificationResponse};

/// Maximum characters of raw response quoted in error messages
const RAW_PREVIEW_CHARS: usize = 200;

/// Parse a batch classification answer
///
/// Accepts the documented object form
/// (`{"categorized_transactions": [...]}`) and, for lenient local models, a
/// bare array of assignments.
pub fn parse_classification_response(response: &str) -> Result<ClassificationResponse> {
    let response = response.trim();

    if let Some(json_str) = extract_delimited(response, '{', '}') {
        if let Ok(parsed) = serde_json::from_str::<ClassificationResponse>(json_str) {
            return Ok(parsed);
        }
    }

    if let Some(json_str) = extract_delimited(response, '[', ']') {
        return serde_json::from_str::<Vec<CategoryAssignment>>(json_str)
            .map(|categorized_transactions| ClassificationResponse {
                categorized_transactions,
            })
            .map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid classification JSON from AI: {} | Raw: {}",
                    e,
                    preview(json_str)
                ))
            });
    }

    Err(Error::InvalidData(format!(
        "No classification JSON found in AI response | Raw: {}",
        preview(response)
    )))
}

/// Slice from the first `open` to the last `close`
fn extract_delimited(s: &str, open: char, close: char) -> Option<&str> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    (start < end).then(|| &s[start..=end])
}

/// Truncate long responses for error messages
fn preview(s: &str) -> String {
    if s.chars().count() > RAW_PREVIEW_CHARS {
        format!("{}...", s.chars().take(RAW_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}
