//! Rubric judging through an external LLM.
//!
//! The judge scores each criterion 1-5; scores are normalised by 5 and
//! clamped into `[0, 1]`. Failures are surfaced as [`JudgeError`] and turned
//! into neutral scores by the scoring engine.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::JudgeConfig;
use crate::error::LlmError;
use crate::extraction::{ParsedAnswer, ParsedResponse};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::metrics::MetricsCollector;
use crate::task::{TaskInstance, TaskKind};
use crate::utils::json_extraction::{extract_json_object, JsonExtractionError};

/// Score assigned to every criterion when no judgement is available.
pub const NEUTRAL_SCORE: f64 = 0.5;

const MAX_RESPONSE_CHARS: usize = 1000;
const MAX_CODE_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Judge request failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Judge returned an empty reply")]
    EmptyReply,

    #[error("Judge reply is not a JSON object: {0}")]
    Reply(#[from] JsonExtractionError),

    #[error("Judge reply lacks a numeric '{0}' score")]
    MissingCriterion(String),
}

/// Reply keys the judge is asked for, per tier. The last key is the overall
/// score, which the judge reports as `overall_score`.
pub fn rubric_keys(kind: TaskKind) -> &'static [&'static str] {
    match kind {
        TaskKind::MultipleChoice => &[
            "technical_accuracy",
            "conceptual_clarity",
            "distractor_analysis",
            "reasoning_quality",
            "overall",
        ],
        TaskKind::Calculation => &[
            "technical_accuracy",
            "mathematical_rigor",
            "problem_solving_approach",
            "engineering_judgment",
            "overall",
        ],
        TaskKind::Design => &[
            "technical_accuracy",
            "safety_constraint_awareness",
            "reasoning_quality",
            "engineering_judgment",
            "overall",
        ],
        TaskKind::MultiStepDesign => &[
            "technical_accuracy",
            "system_integration",
            "constraint_satisfaction",
            "reasoning_quality",
            "overall",
        ],
    }
}

/// Name a rubric key is stored under in the score set.
///
/// Calculation criteria carry a `judge_` prefix so they cannot collide with
/// the deterministic criteria.
pub fn criterion_name(kind: TaskKind, key: &str) -> String {
    match kind {
        TaskKind::Calculation => format!("judge_{}", key),
        _ => key.to_string(),
    }
}

/// Every rubric criterion of `kind` at the neutral score.
pub fn neutral_scores(kind: TaskKind) -> BTreeMap<String, f64> {
    rubric_keys(kind)
        .iter()
        .map(|key| (criterion_name(kind, key), NEUTRAL_SCORE))
        .collect()
}

#[async_trait]
pub trait RubricJudge: Send + Sync {
    /// Scores `parsed` against the rubric for the task's tier.
    async fn judge(
        &self,
        task: &TaskInstance,
        parsed: &ParsedResponse,
    ) -> Result<BTreeMap<String, f64>, JudgeError>;
}

/// Judge used when judging is disabled: neutral scores, no external call.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralJudge;

#[async_trait]
impl RubricJudge for NeutralJudge {
    async fn judge(
        &self,
        task: &TaskInstance,
        _parsed: &ParsedResponse,
    ) -> Result<BTreeMap<String, f64>, JudgeError> {
        Ok(neutral_scores(task.kind))
    }
}

const SYSTEM_INSTRUCTION: &str = "\
You are a senior mechanical engineering professor reviewing a candidate's answer to an \
engineering problem. Put physical correctness first, then mathematical rigor and unit \
handling, then awareness of design constraints such as safety factors, mass, deflection, \
cost and manufacturability, then the clarity of the engineering justification.

Score each requested criterion as an integer from 1 (poor) to 5 (excellent). A correct \
final number reached with the wrong governing equation is not technically accurate. \
Reply with a single JSON object containing exactly the requested keys and nothing else.";

/// Judge backed by an [`LlmProvider`].
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    metrics: MetricsCollector,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.0,
            max_tokens: 1024,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &JudgeConfig) -> Self {
        Self::new(provider, config.model.clone())
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    async fn request_scores(
        &self,
        task: &TaskInstance,
        parsed: &ParsedResponse,
    ) -> Result<BTreeMap<String, f64>, JudgeError> {
        let request = GenerationRequest::new(
            self.model.clone(),
            vec![
                Message::system(SYSTEM_INSTRUCTION),
                Message::user(build_prompt(task, parsed)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_json_response();

        let response = self.provider.generate(request).await?;
        let content = response
            .first_content()
            .filter(|c| !c.trim().is_empty())
            .ok_or(JudgeError::EmptyReply)?;
        let reply = extract_json_object(content)?;
        parse_scores(task.kind, &reply)
    }
}

#[async_trait]
impl RubricJudge for LlmJudge {
    async fn judge(
        &self,
        task: &TaskInstance,
        parsed: &ParsedResponse,
    ) -> Result<BTreeMap<String, f64>, JudgeError> {
        let outcome = self.request_scores(task, parsed).await;
        self.metrics.record_judge_request(outcome.is_ok());
        outcome
    }
}

/// Reads every rubric key of `kind` from a judge reply.
///
/// Accepts numbers, numeric strings and `"4/5"` strings; `overall` may be
/// given as `overall_score` or `overall`.
pub fn parse_scores(
    kind: TaskKind,
    reply: &Map<String, Value>,
) -> Result<BTreeMap<String, f64>, JudgeError> {
    rubric_keys(kind)
        .iter()
        .map(|key| {
            let raw = if *key == "overall" {
                reply.get("overall_score").or_else(|| reply.get("overall"))
            } else {
                reply.get(*key)
            };
            let score = raw
                .and_then(rubric_value)
                .ok_or_else(|| JudgeError::MissingCriterion(key.to_string()))?;
            Ok((criterion_name(kind, key), (score / 5.0).clamp(0.0, 1.0)))
        })
        .collect()
}

fn rubric_value(value: &Value) -> Option<f64> {
    let score = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let head = s.split('/').next().unwrap_or_default();
            head.trim().parse::<f64>().ok()
        }
        _ => None,
    }?;
    score.is_finite().then_some(score)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn pretty(value: &impl serde::Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn rubric_section(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::MultipleChoice => {
            "1. technical_accuracy: correct understanding of the concepts and correct use of terms.\n\
             2. conceptual_clarity: clear, well-structured explanation that connects concepts logically.\n\
             3. distractor_analysis: explains why the chosen option is right and the others are wrong.\n\
             4. reasoning_quality: sound engineering reasoning with principles applied correctly."
        }
        TaskKind::Calculation => {
            "1. technical_accuracy: correct governing equations and sound physics.\n\
             2. mathematical_rigor: accurate arithmetic, correct unit handling and sensible precision.\n\
             3. problem_solving_approach: a logical, well-structured method with visible intermediate steps.\n\
             4. engineering_judgment: the result makes physical sense for the stated problem."
        }
        TaskKind::Design => {
            "1. technical_accuracy: key physical relationships identified and formulas applied correctly.\n\
             2. safety_constraint_awareness: safety factors, manufacturing limits and stated constraints respected.\n\
             3. reasoning_quality: the rationale explains each design choice and its scaling effects.\n\
             4. engineering_judgment: a practical, manufacturable design with trade-offs considered."
        }
        TaskKind::MultiStepDesign => {
            "1. technical_accuracy: each subsystem is analysed with the correct relationships.\n\
             2. system_integration: couplings between subsystems are tracked and reconciled.\n\
             3. constraint_satisfaction: the reported system metrics meet every stated constraint.\n\
             4. reasoning_quality: the rationale justifies the sequence of design decisions."
        }
    }
}

fn reply_template(kind: TaskKind) -> String {
    let fields: Vec<String> = rubric_keys(kind)
        .iter()
        .map(|key| {
            let key = if *key == "overall" { "overall_score" } else { key };
            format!("    \"{}\": <score 1-5>", key)
        })
        .collect();
    format!("{{\n{}\n}}", fields.join(",\n"))
}

fn build_prompt(task: &TaskInstance, parsed: &ParsedResponse) -> String {
    let topic = task.topic.as_deref().unwrap_or("Mechanical engineering task");

    let body = match &parsed.answer {
        ParsedAnswer::MultipleChoice { selected_option } => {
            let correct = task
                .gold
                .correct_option
                .map(|i| format!("Option {}", i + 1))
                .unwrap_or_else(|| "Unknown".to_string());
            let selected = selected_option
                .map(|i| format!("Option {}", i + 1))
                .unwrap_or_else(|| "Not clearly specified".to_string());
            format!(
                "Question: {}\nOptions: {}\nCorrect answer: {}\n\nCandidate response:\n\
                 - Selected option: {}\n- Full response: {}",
                task.prompt,
                pretty(&task.options),
                correct,
                selected,
                truncate(&parsed.raw_text, MAX_RESPONSE_CHARS)
            )
        }
        ParsedAnswer::Calculation { answer, code } => format!(
            "Task: {}\nProblem statement: {}\nParameters: {}\nGold answer: {}\n\n\
             Candidate response:\n- Answer: {}\n- Code: {}\n- Explanation: {}",
            topic,
            task.prompt,
            pretty(&task.parameters),
            pretty(&task.gold),
            answer
                .map(|a| a.to_string())
                .unwrap_or_else(|| "Not provided".to_string()),
            code.as_deref()
                .filter(|c| !c.trim().is_empty())
                .map(|c| truncate(c, MAX_CODE_CHARS))
                .unwrap_or_else(|| "No code provided".to_string()),
            truncate(&parsed.raw_text, MAX_RESPONSE_CHARS)
        ),
        ParsedAnswer::Design {
            design,
            rationale,
            code,
        } => format!(
            "Task: {}\nProblem statement: {}\nObjectives: {}\nConstraints: {}\n\n\
             Design response:\n- Design parameters: {}\n- Rationale: {}\n- Code: {}",
            topic,
            task.prompt,
            pretty(&task.objectives),
            pretty(&task.constraints),
            pretty(design),
            truncate(rationale, MAX_RESPONSE_CHARS),
            code_or_none(code)
        ),
        ParsedAnswer::MultiStepDesign {
            design,
            system_metrics,
            rationale,
            code,
        } => format!(
            "Task: {}\nProblem statement: {}\nObjectives: {}\nConstraints: {}\n\n\
             Design response:\n- Design parameters: {}\n- System metrics: {}\n\
             - Rationale: {}\n- Code: {}",
            topic,
            task.prompt,
            pretty(&task.objectives),
            pretty(&task.constraints),
            pretty(design),
            pretty(system_metrics),
            truncate(rationale, MAX_RESPONSE_CHARS),
            code_or_none(code)
        ),
    };

    format!(
        "Evaluate this {} response.\n\n{}\n\nRubric (score each 1-5):\n{}\n5. overall_score: \
         your overall assessment.\n\nRespond in JSON:\n{}\n",
        task.kind.as_str().replace('_', " "),
        body,
        rubric_section(task.kind),
        reply_template(task.kind)
    )
}

fn code_or_none(code: &str) -> String {
    if code.trim().is_empty() {
        "None".to_string()
    } else {
        truncate(code, MAX_CODE_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractionStrategy;
    use crate::llm::{Choice, GenerationResponse, Usage};
    use serde_json::json;
    use std::sync::Mutex;

    struct MockLlmProvider {
        reply: Result<String, u16>,
        prompts: Mutex<Vec<GenerationRequest>>,
    }

    impl MockLlmProvider {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(code: u16) -> Self {
            Self {
                reply: Err(code),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockLlmProvider {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<GenerationResponse, LlmError> {
            self.prompts.lock().expect("lock poisoned").push(request);
            match &self.reply {
                Ok(content) => Ok(GenerationResponse {
                    id: "judge-1".to_string(),
                    model: "test-model".to_string(),
                    choices: vec![Choice {
                        index: 0,
                        message: Message::assistant(content.clone()),
                        finish_reason: "stop".to_string(),
                    }],
                    usage: Usage::default(),
                }),
                Err(code) => Err(LlmError::ApiError {
                    code: *code,
                    message: "upstream unavailable".to_string(),
                }),
            }
        }
    }

    fn calculation_task() -> TaskInstance {
        TaskInstance::new("b-1", TaskKind::Calculation, "Compute the tip deflection.")
            .with_gold_value(0.0015)
            .with_parameter("P", json!(1000))
    }

    fn calculation_response() -> ParsedResponse {
        ParsedResponse::new(
            "The deflection is 0.0015 m.",
            ParsedAnswer::Calculation {
                answer: Some(0.0015),
                code: None,
            },
            ExtractionStrategy::FreeText,
        )
    }

    #[test]
    fn test_neutral_scores_cover_rubric() {
        let scores = neutral_scores(TaskKind::Calculation);
        assert_eq!(scores.len(), 5);
        assert_eq!(scores["judge_overall"], NEUTRAL_SCORE);
        assert!(scores.contains_key("judge_mathematical_rigor"));

        let scores = neutral_scores(TaskKind::MultiStepDesign);
        assert!(scores.contains_key("system_integration"));
        assert!(scores.contains_key("overall"));
    }

    #[test]
    fn test_parse_scores_normalises_and_accepts_aliases() {
        let reply = json!({
            "technical_accuracy": 5,
            "conceptual_clarity": "4",
            "distractor_analysis": "3/5",
            "reasoning_quality": 7,
            "overall": 4.0
        });
        let scores = parse_scores(TaskKind::MultipleChoice, reply.as_object().unwrap()).unwrap();
        assert_eq!(scores["technical_accuracy"], 1.0);
        assert_eq!(scores["conceptual_clarity"], 0.8);
        assert_eq!(scores["distractor_analysis"], 0.6);
        assert_eq!(scores["reasoning_quality"], 1.0);
        assert_eq!(scores["overall"], 0.8);
    }

    #[test]
    fn test_parse_scores_missing_criterion() {
        let reply = json!({"technical_accuracy": 5, "overall_score": 5});
        let err = parse_scores(TaskKind::Design, reply.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, JudgeError::MissingCriterion(ref key) if key == "safety_constraint_awareness"));
    }

    #[test]
    fn test_prompt_mentions_task_material() {
        let prompt = build_prompt(&calculation_task(), &calculation_response());
        assert!(prompt.contains("Compute the tip deflection."));
        assert!(prompt.contains("\"mathematical_rigor\": <score 1-5>"));
        assert!(prompt.contains("\"overall_score\": <score 1-5>"));
        assert!(prompt.contains("No code provided"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("ééé", 2), "éé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn test_llm_judge_scores_fenced_reply() {
        let reply = "```json\n{\"technical_accuracy\": 4, \"mathematical_rigor\": 5, \
                     \"problem_solving_approach\": 3, \"engineering_judgment\": 4, \
                     \"overall_score\": 4}\n```";
        let provider = Arc::new(MockLlmProvider::replying(reply));
        let judge = LlmJudge::new(provider.clone(), "judge-model");

        let scores = judge
            .judge(&calculation_task(), &calculation_response())
            .await
            .unwrap();
        assert_eq!(scores["judge_technical_accuracy"], 0.8);
        assert_eq!(scores["judge_overall"], 0.8);

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts[0].model, "judge-model");
        assert_eq!(prompts[0].messages[0].role, "system");
        assert!(prompts[0].response_format.is_some());
    }

    #[tokio::test]
    async fn test_llm_judge_non_json_reply() {
        let judge = LlmJudge::new(Arc::new(MockLlmProvider::replying("Great answer!")), "m");
        let err = judge
            .judge(&calculation_task(), &calculation_response())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Reply(_)));
    }

    #[tokio::test]
    async fn test_llm_judge_transport_failure() {
        let judge = LlmJudge::new(Arc::new(MockLlmProvider::failing(503)), "m");
        let err = judge
            .judge(&calculation_task(), &calculation_response())
            .await
            .unwrap_err();
        assert!(matches!(err, JudgeError::Llm(LlmError::ApiError { code: 503, .. })));
    }
}
