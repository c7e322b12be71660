//! Strategy composition per task tier.

use serde_json::{Map, Value};
use tracing::debug;

use super::free_text::{
    answer_assigned_in_code, code_snippet, design_parameters, numeric_answer, prose_only,
    select_option,
};
use super::structured::extract_structured;
use super::types::{Action, ExtractionStrategy, ParsedAnswer, ParsedResponse};
use crate::task::TaskKind;

/// Minimum key a structured design block must carry.
pub const DESIGN_REQUIRED_KEY: &str = "design";

const OPTION_KEYS: &[&str] = &["selected_option", "option", "answer", "choice"];
const ANSWER_KEYS: &[&str] = &["answer", "result", "value", "final_answer"];

/// Extracts a typed answer from a reply. Never fails: missing values are
/// `None` or empty and the strategy records how far extraction got.
pub fn extract(raw: &str, kind: TaskKind, num_options: usize) -> ParsedResponse {
    let parsed = match kind {
        TaskKind::MultipleChoice => extract_choice(raw, num_options),
        TaskKind::Calculation => extract_calculation(raw),
        TaskKind::Design | TaskKind::MultiStepDesign => extract_design(raw, kind),
    };
    debug!(
        kind = %kind,
        strategy = ?parsed.strategy,
        confident = parsed.is_confident(),
        "Extracted response"
    );
    parsed
}

fn extract_choice(raw: &str, num_options: usize) -> ParsedResponse {
    let accept = |object: &Map<String, Value>| structured_option(object, num_options).is_some();
    if let Some((strategy, object)) = extract_structured(raw, &accept) {
        let answer = ParsedAnswer::MultipleChoice {
            selected_option: structured_option(&object, num_options),
        };
        return ParsedResponse::new(raw, answer, strategy);
    }

    let selected_option = select_option(raw, num_options);
    let strategy = if selected_option.is_some() {
        ExtractionStrategy::FreeText
    } else {
        ExtractionStrategy::Fallback
    };
    ParsedResponse::new(raw, ParsedAnswer::MultipleChoice { selected_option }, strategy)
}

/// One-based option number in a structured block, converted to zero-based.
fn structured_option(object: &Map<String, Value>, num_options: usize) -> Option<usize> {
    let value = OPTION_KEYS.iter().find_map(|key| object.get(*key))?;
    let number = match value {
        Value::Number(n) => n.as_u64()? as usize,
        Value::String(s) => select_option(s, num_options)
            .map(|index| index + 1)
            .or_else(|| s.trim().parse::<usize>().ok())?,
        _ => return None,
    };
    (1..=num_options).contains(&number).then(|| number - 1)
}

fn extract_calculation(raw: &str) -> ParsedResponse {
    let accept = |object: &Map<String, Value>| structured_number(object).is_some();
    if let Some((strategy, object)) = extract_structured(raw, &accept) {
        let code = object
            .get("code")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| code_snippet(raw));
        let answer = ParsedAnswer::Calculation {
            answer: structured_number(&object),
            code,
        };
        return ParsedResponse::new(raw, answer, strategy);
    }

    let code = code_snippet(raw);
    let answer = numeric_answer(&prose_only(raw))
        .or_else(|| code.as_deref().and_then(answer_assigned_in_code));
    let strategy = if answer.is_some() || code.is_some() {
        ExtractionStrategy::FreeText
    } else {
        ExtractionStrategy::Fallback
    };
    ParsedResponse::new(raw, ParsedAnswer::Calculation { answer, code }, strategy)
}

fn structured_number(object: &Map<String, Value>) -> Option<f64> {
    let value = ANSWER_KEYS.iter().find_map(|key| object.get(*key))?;
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => numeric_answer(s).or_else(|| s.trim().parse().ok()),
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

fn extract_design(raw: &str, kind: TaskKind) -> ParsedResponse {
    let accept = |object: &Map<String, Value>| {
        object
            .get(DESIGN_REQUIRED_KEY)
            .is_some_and(Value::is_object)
    };
    if let Some((strategy, object)) = extract_structured(raw, &accept) {
        return ParsedResponse::new(raw, design_from_object(&object, kind), strategy);
    }

    let design = design_parameters(&prose_only(raw));
    let code = code_snippet(raw).unwrap_or_default();
    let strategy = if design.is_empty() && code.is_empty() {
        ExtractionStrategy::Fallback
    } else {
        ExtractionStrategy::FreeText
    };
    let rationale = raw.to_string();
    let answer = match kind {
        TaskKind::MultiStepDesign => ParsedAnswer::MultiStepDesign {
            design,
            system_metrics: Map::new(),
            rationale,
            code,
        },
        _ => ParsedAnswer::Design {
            design,
            rationale,
            code,
        },
    };
    ParsedResponse::new(raw, answer, strategy)
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    match object.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn object_field(object: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .find_map(|key| object.get(*key).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default()
}

fn design_from_object(object: &Map<String, Value>, kind: TaskKind) -> ParsedAnswer {
    let design = object_field(object, &[DESIGN_REQUIRED_KEY]);
    let rationale = text_field(object, "rationale");
    let code = text_field(object, "code");
    match kind {
        TaskKind::MultiStepDesign => ParsedAnswer::MultiStepDesign {
            design,
            system_metrics: object_field(object, &["system_metrics", "systemMetrics"]),
            rationale,
            code,
        },
        _ => ParsedAnswer::Design {
            design,
            rationale,
            code,
        },
    }
}

/// Action recognised in one conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAction {
    pub action: Action,
    pub strategy: ExtractionStrategy,
}

impl ExtractedAction {
    /// Whether nothing was recognised and the raw text became the answer.
    pub fn is_fallback(&self) -> bool {
        self.strategy == ExtractionStrategy::Fallback
    }
}

/// Recognises the action in a turn: an explicit action block, else a
/// confident final answer wrapped as `respond`, else the raw text as a
/// fallback `respond`.
pub fn extract_action(raw: &str, kind: TaskKind, num_options: usize) -> ExtractedAction {
    let accept = |object: &Map<String, Value>| Action::from_object(object).is_some();
    if let Some((strategy, action)) = extract_structured(raw, &accept)
        .and_then(|(strategy, object)| Action::from_object(&object).map(|a| (strategy, a)))
    {
        return ExtractedAction { action, strategy };
    }

    let parsed = extract(raw, kind, num_options);
    if parsed.is_confident() {
        return ExtractedAction {
            action: Action::respond(raw),
            strategy: parsed.strategy,
        };
    }

    ExtractedAction {
        action: Action::respond(raw),
        strategy: ExtractionStrategy::Fallback,
    }
}
