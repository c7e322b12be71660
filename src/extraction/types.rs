//! Typed results of response extraction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::task::TaskKind;

/// Which strategy produced a parsed response, kept for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `<json>...</json>` span.
    TagDelimited,
    /// Last ```` ```json ```` fenced block.
    FencedBlock,
    /// First balanced `{...}` span found by brace counting.
    BalancedBraces,
    /// Nested-brace regex candidate, scanned last-first.
    NestedBraceRegex,
    /// Phrase patterns over prose.
    FreeText,
    /// Nothing recognised; the raw text stands in for the answer.
    Fallback,
}

impl ExtractionStrategy {
    /// Whether the strategy read a structured block.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            ExtractionStrategy::TagDelimited
                | ExtractionStrategy::FencedBlock
                | ExtractionStrategy::BalancedBraces
                | ExtractionStrategy::NestedBraceRegex
        )
    }
}

/// Parsed answer, one variant per task tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedAnswer {
    MultipleChoice {
        /// Zero-based option index.
        selected_option: Option<usize>,
    },
    Calculation {
        answer: Option<f64>,
        code: Option<String>,
    },
    Design {
        design: Map<String, Value>,
        rationale: String,
        code: String,
    },
    MultiStepDesign {
        design: Map<String, Value>,
        #[serde(alias = "systemMetrics")]
        system_metrics: Map<String, Value>,
        rationale: String,
        code: String,
    },
}

impl ParsedAnswer {
    /// An answer with every field absent.
    pub fn empty(kind: TaskKind) -> Self {
        match kind {
            TaskKind::MultipleChoice => ParsedAnswer::MultipleChoice {
                selected_option: None,
            },
            TaskKind::Calculation => ParsedAnswer::Calculation {
                answer: None,
                code: None,
            },
            TaskKind::Design => ParsedAnswer::Design {
                design: Map::new(),
                rationale: String::new(),
                code: String::new(),
            },
            TaskKind::MultiStepDesign => ParsedAnswer::MultiStepDesign {
                design: Map::new(),
                system_metrics: Map::new(),
                rationale: String::new(),
                code: String::new(),
            },
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self {
            ParsedAnswer::MultipleChoice { .. } => TaskKind::MultipleChoice,
            ParsedAnswer::Calculation { .. } => TaskKind::Calculation,
            ParsedAnswer::Design { .. } => TaskKind::Design,
            ParsedAnswer::MultiStepDesign { .. } => TaskKind::MultiStepDesign,
        }
    }

    /// Submitted code, if any and non-blank.
    pub fn code(&self) -> Option<&str> {
        let code = match self {
            ParsedAnswer::MultipleChoice { .. } => None,
            ParsedAnswer::Calculation { code, .. } => code.as_deref(),
            ParsedAnswer::Design { code, .. } | ParsedAnswer::MultiStepDesign { code, .. } => {
                Some(code.as_str())
            }
        };
        code.filter(|c| !c.trim().is_empty())
    }

    pub fn design(&self) -> Option<&Map<String, Value>> {
        match self {
            ParsedAnswer::Design { design, .. } | ParsedAnswer::MultiStepDesign { design, .. } => {
                Some(design)
            }
            _ => None,
        }
    }
}

/// Result of running the extraction engine over one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedResponse {
    /// Reply text the answer was extracted from.
    pub raw_text: String,
    pub answer: ParsedAnswer,
    pub strategy: ExtractionStrategy,
}

impl ParsedResponse {
    pub fn new(raw_text: impl Into<String>, answer: ParsedAnswer, strategy: ExtractionStrategy) -> Self {
        Self {
            raw_text: raw_text.into(),
            answer,
            strategy,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.answer.kind()
    }

    /// Whether the reply carries a usable final answer for its tier.
    ///
    /// Choice and calculation answers count once a value (or code) was
    /// found; design answers only when they came from a structured block.
    pub fn is_confident(&self) -> bool {
        match &self.answer {
            ParsedAnswer::MultipleChoice { selected_option } => selected_option.is_some(),
            ParsedAnswer::Calculation { answer, .. } => {
                answer.is_some() || self.answer.code().is_some()
            }
            ParsedAnswer::Design { .. } | ParsedAnswer::MultiStepDesign { .. } => {
                self.strategy.is_structured()
            }
        }
    }
}

/// Tool or terminal action requested by the target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionName {
    Calculator,
    CodeExec,
    GetMaterialProperties,
    Respond,
    Other(String),
}

impl ActionName {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "calculator" => ActionName::Calculator,
            "codeExec" | "code_exec" | "python_exec" => ActionName::CodeExec,
            "getMaterialProperties" | "get_material_properties" => {
                ActionName::GetMaterialProperties
            }
            "respond" => ActionName::Respond,
            other => ActionName::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionName::Calculator => "calculator",
            ActionName::CodeExec => "codeExec",
            ActionName::GetMaterialProperties => "getMaterialProperties",
            ActionName::Respond => "respond",
            ActionName::Other(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActionName::Other(_))
    }
}

impl From<String> for ActionName {
    fn from(name: String) -> Self {
        ActionName::parse(&name)
    }
}

impl From<ActionName> for String {
    fn from(name: ActionName) -> Self {
        name.as_str().to_string()
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys accepted for the argument mapping of an action block.
pub const KWARGS_KEYS: &[&str] = &["kwargs", "arguments", "parameters", "args"];

/// An action with its arguments. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    name: ActionName,
    kwargs: Map<String, Value>,
}

impl Action {
    pub fn new(name: ActionName, kwargs: Map<String, Value>) -> Self {
        Self { name, kwargs }
    }

    /// A terminal answer carrying `content`.
    pub fn respond(content: impl Into<String>) -> Self {
        let mut kwargs = Map::new();
        kwargs.insert("content".to_string(), Value::String(content.into()));
        Self::new(ActionName::Respond, kwargs)
    }

    /// Builds an action from a parsed block.
    ///
    /// Requires a string `name`, plus either a known action name or one of
    /// the argument keys, so that a design object with a `name` field is not
    /// mistaken for a tool call. Arguments given as a JSON-encoded string are
    /// decoded.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let name = ActionName::parse(object.get("name")?.as_str()?);
        let raw_kwargs = KWARGS_KEYS.iter().find_map(|key| object.get(*key));
        if !name.is_known() && raw_kwargs.is_none() {
            return None;
        }

        let kwargs = match raw_kwargs {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        Some(Self::new(name, kwargs))
    }

    pub fn name(&self) -> &ActionName {
        &self.name
    }

    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// First string argument found under any of `keys`.
    pub fn str_arg(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|key| self.kwargs.get(*key).and_then(Value::as_str))
    }

    pub fn is_respond(&self) -> bool {
        self.name == ActionName::Respond
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_name_aliases() {
        assert_eq!(ActionName::parse("python_exec"), ActionName::CodeExec);
        assert_eq!(ActionName::parse("code_exec"), ActionName::CodeExec);
        assert_eq!(
            ActionName::parse("search"),
            ActionName::Other("search".to_string())
        );
        assert_eq!(ActionName::CodeExec.to_string(), "codeExec");
    }

    #[test]
    fn test_action_from_object_accepts_argument_aliases() {
        let object = json!({"name": "calculator", "arguments": "{\"expression\": \"2+2\"}"});
        let action = Action::from_object(object.as_object().unwrap()).unwrap();
        assert_eq!(action.name(), &ActionName::Calculator);
        assert_eq!(action.str_arg(&["expression"]), Some("2+2"));

        let object = json!({"name": "getMaterialProperties", "parameters": {"name": "steel"}});
        let action = Action::from_object(object.as_object().unwrap()).unwrap();
        assert_eq!(action.str_arg(&["material", "name"]), Some("steel"));
    }

    #[test]
    fn test_design_object_with_name_is_not_an_action() {
        let object = json!({"name": "cantilever", "height_m": 0.2});
        assert!(Action::from_object(object.as_object().unwrap()).is_none());
    }

    #[test]
    fn test_parsed_answer_serialization_is_tagged() {
        let answer = ParsedAnswer::MultipleChoice {
            selected_option: Some(1),
        };
        let value = serde_json::to_value(&answer).unwrap();
        assert_eq!(value, json!({"kind": "multiple_choice", "selected_option": 1}));
    }

    #[test]
    fn test_confidence_by_kind() {
        let design = ParsedResponse::new(
            "x",
            ParsedAnswer::empty(TaskKind::Design),
            ExtractionStrategy::FreeText,
        );
        assert!(!design.is_confident());

        let calc = ParsedResponse::new(
            "x",
            ParsedAnswer::Calculation {
                answer: None,
                code: Some("x = 1".into()),
            },
            ExtractionStrategy::FreeText,
        );
        assert!(calc.is_confident());
    }
}
