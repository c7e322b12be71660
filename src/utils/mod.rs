//! Shared utility functions for mecheval.
//!
//! This module provides common utilities used across multiple modules,
//! including JSON extraction from agent and judge replies.

pub mod json_extraction;

use regex::Regex;
use std::sync::OnceLock;

pub use json_extraction::{
    analyze_json_structure, extract_json_object, find_matching_brace, first_balanced_object,
    last_code_block, last_fenced_block, last_tagged_block,
    nested_object_candidates, parse_lenient, parse_object_lenient, strip_trailing_commas,
    JsonExtractionError, JsonStructureAnalysis,
};

/// Compiles `pattern` into `cell` on first use and returns the shared regex.
///
/// `None` when the pattern does not compile.
pub fn cached_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Compiles `patterns` into `cell` on first use, dropping any that fail.
pub fn cached_regex_set(
    cell: &'static OnceLock<Vec<Regex>>,
    patterns: impl FnOnce() -> Vec<String>,
) -> &'static [Regex] {
    cell.get_or_init(|| {
        patterns()
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_regex_compiles_once() {
        static DIGITS: OnceLock<Option<Regex>> = OnceLock::new();
        let first = cached_regex(&DIGITS, r"\d+").unwrap();
        let second = cached_regex(&DIGITS, r"ignored once initialized").unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(second.is_match("a1"));

        static BROKEN: OnceLock<Option<Regex>> = OnceLock::new();
        assert!(cached_regex(&BROKEN, r"(unclosed").is_none());
    }

    #[test]
    fn test_cached_regex_set_skips_invalid_patterns() {
        static SET: OnceLock<Vec<Regex>> = OnceLock::new();
        let set = cached_regex_set(&SET, || vec![r"a+".to_string(), r"(".to_string()]);
        assert_eq!(set.len(), 1);
        assert!(set[0].is_match("caab"));
    }
}
