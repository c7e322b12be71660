//! Action dispatch for one task instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::materials::MaterialDatabase;
use super::prompts::final_answer_reminder;
use super::session::ConversationSession;
use crate::extraction::{extract, Action, ActionName, ParsedAnswer, ParsedResponse};
use crate::scoring::{choice_correctness, ToleranceGrader};
use crate::task::TaskInstance;

/// Result of dispatching one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub observation: String,
    /// Preliminary signal in `[0, 1]`; final grading happens in scoring.
    pub reward: f64,
    /// Terminal for the task instance.
    pub done: bool,
    pub info: Map<String, Value>,
}

impl StepOutcome {
    fn observe(action: &ActionName, observation: impl Into<String>) -> Self {
        let mut info = Map::new();
        info.insert("action".to_string(), Value::String(action.to_string()));
        Self {
            observation: observation.into(),
            reward: 0.0,
            done: false,
            info,
        }
    }

    /// The parsed final answer, when this step accepted one.
    pub fn parsed_response(&self) -> Option<ParsedResponse> {
        serde_json::from_value(self.info.get("parsed")?.clone()).ok()
    }
}

/// Tools and completion predicate bound to one task instance.
pub struct TaskEnvironment<'a> {
    task: &'a TaskInstance,
    materials: &'a MaterialDatabase,
    grader: &'a ToleranceGrader,
}

impl<'a> TaskEnvironment<'a> {
    pub fn new(
        task: &'a TaskInstance,
        materials: &'a MaterialDatabase,
        grader: &'a ToleranceGrader,
    ) -> Self {
        Self {
            task,
            materials,
            grader,
        }
    }

    /// Dispatches `action`. `forced` marks a fallback `respond`, which always
    /// terminates.
    pub fn step(
        &self,
        action: &Action,
        forced: bool,
        session: &mut ConversationSession,
    ) -> StepOutcome {
        debug!(task = %self.task.id, action = %action.name(), forced, "Dispatching action");
        match action.name() {
            ActionName::Calculator => self.calculator(action, session),
            ActionName::CodeExec => self.code_exec(action, session),
            ActionName::GetMaterialProperties => self.material_properties(action),
            ActionName::Respond => self.respond(action, forced),
            other => StepOutcome::observe(other, format!("Unknown action: {}", other)),
        }
    }

    fn calculator(&self, action: &Action, session: &ConversationSession) -> StepOutcome {
        let Some(expression) = action.str_arg(&["expression", "expr"]) else {
            return StepOutcome::observe(
                action.name(),
                "Calculator error: missing 'expression' argument",
            );
        };
        let expression = expression.replace('^', "**");
        let mut outcome = match session.sandbox().evaluate_expression(&expression) {
            Ok(value) => {
                let mut outcome =
                    StepOutcome::observe(action.name(), format!("Calculator result: {}", value));
                outcome.info.insert("value".to_string(), value.to_json());
                outcome
            }
            Err(e) => StepOutcome::observe(action.name(), format!("Calculator error: {}", e.render())),
        };
        outcome
            .info
            .insert("expression".to_string(), Value::String(expression));
        outcome
    }

    fn code_exec(&self, action: &Action, session: &mut ConversationSession) -> StepOutcome {
        let Some(code) = action.str_arg(&["code", "source"]) else {
            return StepOutcome::observe(
                action.name(),
                "Code execution error: missing 'code' argument",
            );
        };
        let result = session.sandbox_mut().execute(code, &Map::new(), None);

        let mut observation = match (&result.error, &result.value) {
            (Some(error), _) => format!("Code execution error: {}", error),
            (None, Some(value)) => format!("Code execution result: {}", value),
            (None, None) => "Code executed successfully (no result value)".to_string(),
        };
        if !result.stdout.is_empty() {
            observation.push_str("\nOutput:\n");
            observation.push_str(result.stdout.trim_end());
        }

        let mut outcome = StepOutcome::observe(action.name(), observation);
        if let Ok(value) = serde_json::to_value(&result) {
            outcome.info.insert("sandbox".to_string(), value);
        }
        outcome
    }

    fn material_properties(&self, action: &Action) -> StepOutcome {
        let Some(name) = action.str_arg(&["material", "name"]) else {
            return StepOutcome::observe(
                action.name(),
                "Material lookup error: missing 'material' argument",
            );
        };
        match self.materials.get(name) {
            Some(material) => {
                let properties = serde_json::to_string_pretty(material)
                    .unwrap_or_else(|_| format!("{:?}", material));
                StepOutcome::observe(
                    action.name(),
                    format!("Material properties for {}:\n{}", name.trim(), properties),
                )
            }
            None => StepOutcome::observe(
                action.name(),
                format!(
                    "Unknown material '{}'. Available materials: {}",
                    name.trim(),
                    self.materials.names().join(", ")
                ),
            ),
        }
    }

    /// Completion predicate: a confident final answer ends the instance.
    fn respond(&self, action: &Action, forced: bool) -> StepOutcome {
        let content = action
            .str_arg(&["content", "answer", "response"])
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(action.kwargs().clone()).to_string());
        let parsed = extract(&content, self.task.kind, self.task.num_options());
        let confident = parsed.is_confident();

        let mut outcome = StepOutcome::observe(action.name(), format!("Your response: {}", content));
        outcome.info.insert("confident".to_string(), Value::Bool(confident));
        outcome.info.insert("forced".to_string(), Value::Bool(forced));

        if !confident && !forced {
            outcome.observation = final_answer_reminder(self.task.kind);
            return outcome;
        }

        outcome.reward = self.preliminary_reward(&parsed.answer);
        outcome.done = true;
        if let Ok(value) = serde_json::to_value(&parsed) {
            outcome.info.insert("parsed".to_string(), value);
        }
        outcome
    }

    fn preliminary_reward(&self, answer: &ParsedAnswer) -> f64 {
        match answer {
            ParsedAnswer::MultipleChoice { selected_option } => {
                let correctness =
                    choice_correctness(*selected_option, self.task.gold.correct_option);
                if correctness == 1.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ParsedAnswer::Calculation {
                answer: Some(answer),
                ..
            } => match self.task.gold.value {
                Some(gold) => {
                    let tolerance = self.grader.relative_tolerance(&self.task.gold);
                    if self.grader.compare(*answer, gold, tolerance).within_tolerance {
                        1.0
                    } else {
                        0.0
                    }
                }
                None => 0.0,
            },
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TolerancePolicy;
    use crate::task::TaskKind;
    use serde_json::json;
    use std::time::Duration;

    fn grader() -> ToleranceGrader {
        ToleranceGrader::new(TolerancePolicy::default(), Duration::from_secs(5))
    }

    fn action(value: Value) -> Action {
        Action::from_object(value.as_object().unwrap()).unwrap()
    }

    fn calculation() -> TaskInstance {
        TaskInstance::new("b-1", TaskKind::Calculation, "Compute the stress.")
            .with_gold_value(500000.0)
    }

    #[test]
    fn test_calculator_accepts_caret_power() {
        let task = calculation();
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        let outcome = env.step(
            &action(json!({"name": "calculator", "kwargs": {"expression": "2^3 + 1"}})),
            false,
            &mut session,
        );
        assert_eq!(outcome.observation, "Calculator result: 9");
        assert!(!outcome.done);

        let outcome = env.step(
            &action(json!({"name": "calculator", "kwargs": {"expression": "1/0"}})),
            false,
            &mut session,
        );
        assert!(outcome.observation.starts_with("Calculator error: ZeroDivisionError"));
    }

    #[test]
    fn test_code_exec_persists_between_turns() {
        let task = calculation();
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        env.step(
            &action(json!({"name": "codeExec", "kwargs": {"code": "F = 5000\nA = 0.01"}})),
            false,
            &mut session,
        );
        let outcome = env.step(
            &action(json!({"name": "python_exec", "kwargs": {"code": "stress = F / A\nprint(stress)"}})),
            false,
            &mut session,
        );
        assert_eq!(
            outcome.observation,
            "Code execution result: 500000.0\nOutput:\n500000.0"
        );

        let outcome = env.step(
            &action(json!({"name": "calculator", "kwargs": {"expression": "stress / 1000"}})),
            false,
            &mut session,
        );
        assert_eq!(outcome.observation, "Calculator result: 500.0");
    }

    #[test]
    fn test_material_lookup() {
        let task = calculation();
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        let outcome = env.step(
            &action(json!({"name": "getMaterialProperties", "kwargs": {"name": "Aluminum"}})),
            false,
            &mut session,
        );
        assert!(outcome.observation.starts_with("Material properties for Aluminum:"));
        assert!(outcome.observation.contains("\"youngs_modulus\""));

        let outcome = env.step(
            &action(json!({"name": "getMaterialProperties", "kwargs": {"material": "wood"}})),
            false,
            &mut session,
        );
        assert!(outcome.observation.contains("Available materials: aluminum, composite"));
    }

    #[test]
    fn test_unknown_action_continues() {
        let task = calculation();
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        let outcome = env.step(
            &action(json!({"name": "search", "kwargs": {"q": "beam"}})),
            false,
            &mut session,
        );
        assert_eq!(outcome.observation, "Unknown action: search");
        assert!(!outcome.done);
    }

    #[test]
    fn test_respond_completion_predicate() {
        let task = calculation();
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        let vague = Action::respond("I am not sure yet.");
        let outcome = env.step(&vague, false, &mut session);
        assert!(!outcome.done);
        assert!(outcome.observation.contains("final answer"));

        let outcome = env.step(&vague, true, &mut session);
        assert!(outcome.done);
        assert_eq!(outcome.reward, 0.0);

        let answer = Action::respond("The answer is 500000 Pa.");
        let outcome = env.step(&answer, false, &mut session);
        assert!(outcome.done);
        assert_eq!(outcome.reward, 1.0);
        let parsed = outcome.parsed_response().unwrap();
        assert_eq!(parsed.raw_text, "The answer is 500000 Pa.");
    }

    #[test]
    fn test_design_respond_needs_structured_block() {
        let task = TaskInstance::new("c-1", TaskKind::Design, "Design a beam.");
        let (materials, grader) = (MaterialDatabase::builtin(), grader());
        let env = TaskEnvironment::new(&task, &materials, &grader);
        let mut session = ConversationSession::new(Duration::from_secs(5));

        let prose = Action::respond("I would make the beam height = 0.3 m.");
        assert!(!env.step(&prose, false, &mut session).done);

        let block = Action::respond(
            "```json\n{\"design\": {\"height_m\": 0.3}, \"rationale\": \"r\", \"code\": \"\"}\n```",
        );
        let outcome = env.step(&block, false, &mut session);
        assert!(outcome.done);
        assert_eq!(outcome.reward, 0.0);
    }
}
