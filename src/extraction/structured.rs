//! Structured-block strategies, tried in order with first success winning.
//!
//! Each strategy is a pure function from reply text to an accepted object.
//! A candidate that parses but fails the acceptance check is dropped so that
//! a later strategy can still find a complete block.

use serde_json::{Map, Value};

use super::types::ExtractionStrategy;
use crate::utils::json_extraction::{
    first_balanced_object, last_fenced_block, last_tagged_block, nested_object_candidates,
    parse_object_lenient,
};

/// Acceptance check applied to every parsed candidate.
pub type Accept<'a> = &'a dyn Fn(&Map<String, Value>) -> bool;

type Strategy = fn(&str, Accept<'_>) -> Option<Map<String, Value>>;

/// Tags recognised as delimiting a structured block.
const TAGS: &[&str] = &["json"];

/// Strategies in priority order.
const STRATEGIES: &[(ExtractionStrategy, Strategy)] = &[
    (ExtractionStrategy::TagDelimited, from_tagged_block),
    (ExtractionStrategy::FencedBlock, from_fenced_block),
    (ExtractionStrategy::BalancedBraces, from_balanced_span),
    (ExtractionStrategy::NestedBraceRegex, from_nested_candidates),
];

/// Returns the first accepted object and the strategy that found it.
pub fn extract_structured(
    raw: &str,
    accept: Accept<'_>,
) -> Option<(ExtractionStrategy, Map<String, Value>)> {
    STRATEGIES
        .iter()
        .find_map(|(strategy, run)| run(raw, accept).map(|object| (*strategy, object)))
}

fn accepted(candidate: &str, accept: Accept<'_>) -> Option<Map<String, Value>> {
    parse_object_lenient(candidate).filter(|object| accept(object))
}

fn from_tagged_block(raw: &str, accept: Accept<'_>) -> Option<Map<String, Value>> {
    TAGS.iter()
        .filter_map(|tag| last_tagged_block(raw, tag))
        .find_map(|body| accepted(&body, accept))
}

/// Only the last `json` fence is considered; earlier fences are drafts.
fn from_fenced_block(raw: &str, accept: Accept<'_>) -> Option<Map<String, Value>> {
    let body = last_fenced_block(raw, "json")?;
    accepted(&body, accept)
}

fn from_balanced_span(raw: &str, accept: Accept<'_>) -> Option<Map<String, Value>> {
    accepted(first_balanced_object(raw)?, accept)
}

fn from_nested_candidates(raw: &str, accept: Accept<'_>) -> Option<Map<String, Value>> {
    nested_object_candidates(raw)
        .into_iter()
        .rev()
        .find_map(|candidate| accepted(candidate, accept))
}
