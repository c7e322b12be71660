//! JSON extraction utilities for parsing agent and judge replies.
//!
//! Replies routinely mix prose, code and one or more JSON blocks. The helpers
//! here locate candidate JSON spans without ever failing loudly:
//!
//! 1. Tag-delimited blocks (`<json>...</json>`), last occurrence
//! 2. Fenced blocks labeled as JSON (```` ```json ````), last occurrence
//! 3. The first balanced `{...}` span found by string-aware brace counting
//! 4. Regex matching of objects nested at most two levels deep
//!
//! Every candidate goes through [`parse_lenient`], which retries once after
//! stripping trailing commas before `}` or `]`.
//!
//! # Example
//!
//! ```
//! use mecheval::utils::json_extraction::{last_fenced_block, parse_lenient};
//!
//! let reply = "```json\n{\"a\": 1}\n```\n```json\n{\"a\": 2,}\n```";
//! let block = last_fenced_block(reply, "json").unwrap();
//! let value = parse_lenient(&block).unwrap();
//! assert_eq!(value["a"], 2);
//! ```

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use std::sync::OnceLock;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON object found in reply starting with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Analysis result for JSON structure.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStructureAnalysis {
    /// Number of unclosed braces ('{' without matching '}')
    pub unclosed_braces: usize,
    /// Number of unclosed brackets ('[' without matching ']')
    pub unclosed_brackets: usize,
    /// Whether we ended inside a string literal
    pub in_string: bool,
    /// The position where JSON-like content starts (first '{' or '[')
    pub json_start: Option<usize>,
}

/// Scans the content and tracks brace/bracket depth to detect incomplete
/// JSON structures.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut brace_depth: isize = 0;
    let mut bracket_depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut json_start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                json_start.get_or_insert(i);
                brace_depth += 1;
            }
            '}' if !in_string => brace_depth -= 1,
            '[' if !in_string => {
                json_start.get_or_insert(i);
                bracket_depth += 1;
            }
            ']' if !in_string => bracket_depth -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: brace_depth.max(0) as usize,
        unclosed_brackets: bracket_depth.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Finds the matching closing brace for a string starting with '{'.
///
/// Handles nested braces, string literals and escape sequences.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
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
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

static TRAILING_COMMA: OnceLock<Option<Regex>> = OnceLock::new();
static ANY_FENCED_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
static NESTED_OBJECT: OnceLock<Option<Regex>> = OnceLock::new();

/// Removes trailing commas directly before a closing `}` or `]`.
pub fn strip_trailing_commas(s: &str) -> String {
    let Some(re) = super::cached_regex(&TRAILING_COMMA, r",(\s*[}\]])") else {
        return s.to_string();
    };
    re.replace_all(s, "$1").into_owned()
}

/// Parses a JSON value, retrying once after trailing-comma repair.
pub fn parse_lenient(candidate: &str) -> Option<Value> {
    let trimmed = candidate.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    serde_json::from_str::<Value>(&strip_trailing_commas(trimmed)).ok()
}

/// Parses a candidate as a JSON object, retrying once after repair.
pub fn parse_object_lenient(candidate: &str) -> Option<Map<String, Value>> {
    match parse_lenient(candidate)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Returns the body of the last fenced block labeled `label`.
pub fn last_fenced_block(content: &str, label: &str) -> Option<String> {
    let pattern = format!(r"(?i)```{}[ \t]*\n?([\s\S]*?)```", regex::escape(label));
    let re = Regex::new(&pattern).ok()?;
    re.captures_iter(content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Returns the body of the last fenced block, labeled or not.
pub fn last_code_block(content: &str) -> Option<String> {
    let re = super::cached_regex(&ANY_FENCED_BLOCK, r"```[\w+-]*[ \t]*\n?([\s\S]*?)```")?;
    re.captures_iter(content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Returns the body of the last `<tag>...</tag>` block.
pub fn last_tagged_block(content: &str, tag: &str) -> Option<String> {
    let tag = regex::escape(tag);
    let pattern = format!(r"(?is)<{tag}>(.*?)</{tag}>");
    let re = Regex::new(&pattern).ok()?;
    re.captures_iter(content)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Returns the first balanced `{...}` span in the content.
pub fn first_balanced_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = find_matching_brace(&content[start..])?;
    Some(&content[start..=start + end])
}

/// Returns every object span nested at most two levels deep, in order of
/// appearance.
pub fn nested_object_candidates(content: &str) -> Vec<&str> {
    let Some(re) = super::cached_regex(&NESTED_OBJECT, r"\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}") else {
        return Vec::new();
    };
    re.find_iter(content).map(|m| m.as_str()).collect()
}

/// Extracts a JSON object from a free-form reply.
///
/// Tries the last fenced JSON block, the whole trimmed reply, the first
/// balanced span and finally the nested-object regex, returning the first
/// candidate that parses as an object. Distinguishes a reply whose JSON was
/// cut off from one that never contained any.
pub fn extract_json_object(content: &str) -> Result<Map<String, Value>, JsonExtractionError> {
    let trimmed = content.trim();

    let candidates = last_fenced_block(trimmed, "json")
        .into_iter()
        .chain(Some(trimmed.to_string()))
        .chain(first_balanced_object(trimmed).map(str::to_string))
        .chain(
            nested_object_candidates(trimmed)
                .into_iter()
                .rev()
                .map(str::to_string),
        );

    for candidate in candidates {
        if let Some(object) = parse_object_lenient(&candidate) {
            return Ok(object);
        }
    }

    let analysis = analyze_json_structure(trimmed);
    if analysis.json_start.is_some()
        && (analysis.unclosed_braces > 0 || analysis.unclosed_brackets > 0 || analysis.in_string)
    {
        return Err(JsonExtractionError::Truncated {
            unclosed_braces: analysis.unclosed_braces,
            unclosed_brackets: analysis.unclosed_brackets,
        });
    }

    let content_preview: String = trimmed.chars().take(50).collect();
    Err(JsonExtractionError::NotFound { content_preview })
}
