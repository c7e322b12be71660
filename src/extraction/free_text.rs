//! Phrase-pattern extraction over prose.
//!
//! Targets often restate earlier attempts before their final answer, so every
//! pattern takes its last match in the text.

use regex::Regex;
use serde_json::{Map, Number, Value};
use std::sync::OnceLock;

use crate::utils::{cached_regex, cached_regex_set};

/// Signed decimal or scientific literal.
const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

/// Unit suffixes that mark a bare number as a quantity.
const UNITS: &str = r"(?:pa|kpa|mpa|gpa|n|kn|m|mm|cm|kg|g|nm|knm|n\*m|hz|rad|deg)";

static OPTION_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static NUMBERED_ITEM: OnceLock<Option<Regex>> = OnceLock::new();
static NUMERIC_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static NUMERIC_FALLBACK: OnceLock<Option<Regex>> = OnceLock::new();
static ASSIGNED_ANSWER: OnceLock<Vec<Regex>> = OnceLock::new();
static FENCED_CODE: OnceLock<Option<Regex>> = OnceLock::new();
static INLINE_CODE: OnceLock<Option<Regex>> = OnceLock::new();
static ANY_FENCE: OnceLock<Option<Regex>> = OnceLock::new();
static DESIGN_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn last_number_match(text: &str, re: &Regex) -> Option<f64> {
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .last()
}

/// Returns the zero-based option selected in `text`.
///
/// Option numbers outside `1..=num_options` are discarded, never clamped.
pub fn select_option(text: &str, num_options: usize) -> Option<usize> {
    let in_range = |n: usize| (1..=num_options).contains(&n);
    let last_valid = |re: &Regex| -> Option<usize> {
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<usize>().ok())
            .filter(|n| in_range(*n))
            .last()
    };
    let patterns = cached_regex_set(&OPTION_PATTERNS, || {
        vec![
            r"(?i)\boption\s*(\d+)\b".to_string(),
            r"(?i)(?:correct\s+)?(?:answer|choice)\s*(?:is\s*)?[:=]?\s*\(?(\d+)\b".to_string(),
            r"(?i)\b(\d+)\s+is\s+(?:the\s+)?(?:correct|right|answer)".to_string(),
        ]
    });
    let [option, stated, trailing] = patterns else {
        return None;
    };

    if let Some(n) = last_valid(option) {
        return Some(n - 1);
    }
    if let Some(n) = numbered_with_context(text, &in_range) {
        return Some(n - 1);
    }
    if let Some(n) = last_valid(stated) {
        return Some(n - 1);
    }
    last_valid(trailing).map(|n| n - 1)
}

/// `2.` or `2)` near a word like "answer" or "correct".
fn numbered_with_context(text: &str, in_range: &dyn Fn(usize) -> bool) -> Option<usize> {
    let re = cached_regex(&NUMBERED_ITEM, r"(?:^|\s)(\d+)[.)]")?;
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let n = m.as_str().parse::<usize>().ok().filter(|n| in_range(*n))?;
            let start = floor_char_boundary(text, m.start().saturating_sub(20));
            let end = floor_char_boundary(text, (m.end() + 20).min(text.len()));
            let context = text[start..end].to_lowercase();
            ["option", "answer", "correct", "choice", "select"]
                .iter()
                .any(|word| context.contains(word))
                .then_some(n)
        })
        .last()
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Returns the numeric answer stated in `text`.
///
/// Patterns are tried from most to least specific; the first pattern with a
/// match decides, using its last match.
pub fn numeric_answer(text: &str) -> Option<f64> {
    let patterns = cached_regex_set(&NUMERIC_PATTERNS, || {
        vec![
            format!(
                r"(?i)(?:the\s+)?(?:final\s+answer|final\s+result|answer|result|solution|value)\s*(?:is|:|=)\s*({})",
                NUMBER
            ),
            format!(r"=\s*({})", NUMBER),
            format!(r"(?i)({})\s*{}\b", NUMBER, UNITS),
            format!(r"(?i)(?:answer|result|solution)\s*\(({})\)", NUMBER),
            format!(r"(?i)\bis\s+({})(?:[.,;\s]|$)", NUMBER),
            format!(r"({}[eE][-+]?\d+)", r"[-+]?(?:\d+\.?\d*|\.\d+)"),
        ]
    });

    if let Some(value) = patterns.iter().find_map(|re| last_number_match(text, re)) {
        return Some(value);
    }

    let fallback = cached_regex(
        &NUMERIC_FALLBACK,
        r"(?i)(?:answer|result|solution|value|final)[\s\S]{0,100}?([-+]?\d+\.\d+(?:[eE][-+]?\d+)?)",
    )?;
    last_number_match(text, fallback).filter(|v| v.abs() > 1e-10)
}

/// Literal answer assigned in code, e.g. `result = 123.4`.
pub fn answer_assigned_in_code(code: &str) -> Option<f64> {
    cached_regex_set(&ASSIGNED_ANSWER, || {
        vec![format!(
            r"(?im)^\s*(?:result|answer|solution|value|final)\s*=\s*({})\s*$",
            NUMBER
        )]
    })
    .iter()
    .find_map(|re| last_number_match(code, re))
}

/// Last fenced block labeled python or unlabeled, then inline code that looks
/// like a statement.
pub fn code_snippet(text: &str) -> Option<String> {
    // Match every fence pair in sequence so that a closing fence is never
    // mistaken for an opening one.
    let fenced = cached_regex(&FENCED_CODE, r"```([\w+-]*)[ \t]*\r?\n([\s\S]*?)```")?;
    if let Some(code) = fenced
        .captures_iter(text)
        .filter(|caps| {
            let label = caps.get(1).map_or("", |m| m.as_str());
            matches!(label.to_lowercase().as_str(), "" | "python" | "py" | "python3")
        })
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|code| !code.is_empty())
        .last()
    {
        return Some(code);
    }

    let inline = cached_regex(&INLINE_CODE, r"`([^`\n]+)`")?;
    inline
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|code| ["import ", "=", "print("].iter().any(|k| code.contains(k)))
        .map(str::to_string)
}

/// Text with fenced code blocks removed, so code inputs are not mistaken
/// for stated answers.
pub fn prose_only(text: &str) -> String {
    match cached_regex(&ANY_FENCE, r"```[\s\S]*?```") {
        Some(re) => re.replace_all(text, " ").into_owned(),
        None => text.to_string(),
    }
}

fn number_value(value: f64) -> Option<Value> {
    Number::from_f64(value).map(Value::Number)
}

/// Recovers design parameters from prose such as `width = 0.1 m`,
/// `height of 0.25 m` or `depth: 40`.
///
/// `=` assignments overwrite earlier ones; the looser forms only fill names
/// not yet seen.
pub fn design_parameters(text: &str) -> Map<String, Value> {
    let mut design = Map::new();

    let patterns = cached_regex_set(&DESIGN_PATTERNS, || {
        vec![
            format!(r"(?i)\b([a-z_]\w*)\s*=\s*({})", NUMBER),
            format!(r"(?i)\b([a-z_]\w*)\s+(?:of|is)\s+({})", NUMBER),
            format!(r"(?i)\b([a-z_]\w*)\s*:\s*({})", NUMBER),
            format!(
                r"(?i)(?:natural\s+)?frequency\s+(?:of|is|:)?\s*({})\s*hz",
                NUMBER
            ),
        ]
    });
    let [assigned, phrased, labeled, frequency] = patterns else {
        return design;
    };

    let mut collect = |re: &Regex, overwrite: bool| {
        for caps in re.captures_iter(text) {
            let (Some(name), Some(raw)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(value) = raw.as_str().parse::<f64>().ok().and_then(number_value) else {
                continue;
            };
            let key = name.as_str().to_lowercase();
            if overwrite || !design.contains_key(&key) {
                design.insert(key, value);
            }
        }
    };

    collect(assigned, true);
    collect(phrased, false);
    collect(labeled, false);

    if let Some(value) = last_number_match(text, frequency).and_then(number_value) {
        design.insert("frequency".to_string(), value.clone());
        design.insert("natural_frequency".to_string(), value);
    }

    design
}
