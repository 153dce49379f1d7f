//! JSON extraction utilities for parsing LLM replies.
//!
//! Backends without schema-constrained decoding return free text that is
//! expected to *contain* a JSON object: sometimes bare, sometimes inside a
//! Markdown code fence, sometimes after a paragraph of reasoning or next to
//! an example. This module finds every complete top-level object in one pass
//! and leaves the choice between them to the caller.
//!
//! # Example
//!
//! ```
//! use task_finalizer::utils::json_extraction::extract_json_objects;
//!
//! let reply = "Example: {\"objective_met\": true}\nAnswer:\n```json\n{\"objective_met\": false}\n```";
//! let objects = extract_json_objects(reply).unwrap();
//! assert_eq!(objects.len(), 2);
//! assert_eq!(objects[1]["objective_met"], false);
//! ```

use serde_json::Value;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
    },

    #[error("No JSON object found in reply. Reply starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Number of characters of context kept in extraction errors.
const PREVIEW_CHARS: usize = 100;

fn preview(s: &str) -> String {
    s.chars().take(PREVIEW_CHARS).collect()
}

/// Result of one pass over a reply.
struct BraceScan {
    /// Byte ranges `(start, end)` of balanced `{...}` spans, `end` inclusive.
    spans: Vec<(usize, usize)>,
    /// Offsets of braces still open at the end of the text.
    unclosed: Vec<usize>,
}

/// Records every balanced brace span in a single pass.
///
/// Quotes only start a string literal inside an open brace, so apostrophes
/// and quotes in surrounding prose do not hide the object that follows.
fn scan_braces(content: &str) -> BraceScan {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in content.char_indices() {
        if open.is_empty() {
            if c == '{' {
                open.push(i);
            }
            continue;
        }

        if in_string {
            match c {
                _ if escape_next => escape_next = false,
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => open.push(i),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, i));
                }
            }
            _ => {}
        }
    }

    BraceScan {
        spans,
        unclosed: open,
    }
}

/// Returns every complete top-level JSON object in `content`, in order.
///
/// An object nested inside another accepted object is part of that object,
/// not a separate entry. Braces that never form valid JSON (code snippets,
/// prose) are skipped.
///
/// # Errors
///
/// - `JsonExtractionError::Truncated` when no object is complete but one was
///   started (typically a reply cut off by `max_tokens`).
/// - `JsonExtractionError::NotFound` when there is no object at all.
pub fn extract_json_objects(content: &str) -> Result<Vec<Value>, JsonExtractionError> {
    let BraceScan { mut spans, unclosed } = scan_braces(content);

    // Outermost first: spans are either disjoint or nested.
    spans.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut objects = Vec::new();
    let mut covered_until: Option<usize> = None;

    for (start, end) in spans {
        if covered_until.is_some_and(|covered| start <= covered) {
            continue;
        }
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&content[start..=end])
        {
            objects.push(value);
            covered_until = Some(end);
        }
    }

    if !objects.is_empty() {
        return Ok(objects);
    }

    if let Some(&first_open) = unclosed.first() {
        return Err(JsonExtractionError::Truncated {
            partial_preview: preview(&content[first_open..]),
            unclosed_braces: unclosed.len(),
        });
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(content.trim()),
    })
}
