//! Deterministic grading against numeric gold values.
//!
//! Relative error is compared to the instance tolerance (never below the
//! configured floor). Gold values close to zero switch to absolute error so
//! the comparison stays finite.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::TolerancePolicy;
use crate::sandbox::{SandboxExecutor, RESERVED_NAMES};
use crate::task::{GoldAnswer, TaskInstance};

/// Outcome of comparing one answer to one gold value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub correctness: f64,
    pub within_tolerance: bool,
    pub unit_consistency: f64,
    pub absolute_error: f64,
    /// `None` on the near-zero path.
    pub relative_error: Option<f64>,
}

/// Criteria and diagnostics from one deterministic grading pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grade {
    pub scores: BTreeMap<String, f64>,
    pub diagnostics: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl Grade {
    fn set(&mut self, criterion: &str, value: f64) {
        self.scores.insert(criterion.to_string(), value);
    }
}

#[derive(Debug, Clone)]
pub struct ToleranceGrader {
    policy: TolerancePolicy,
    sandbox_timeout: Duration,
}

impl ToleranceGrader {
    pub fn new(policy: TolerancePolicy, sandbox_timeout: Duration) -> Self {
        Self {
            policy,
            sandbox_timeout,
        }
    }

    pub fn policy(&self) -> &TolerancePolicy {
        &self.policy
    }

    /// Relative tolerance for an instance: its own value, floored.
    pub fn relative_tolerance(&self, gold: &GoldAnswer) -> f64 {
        gold.tolerance
            .unwrap_or(self.policy.min_relative_tolerance)
            .max(self.policy.min_relative_tolerance)
    }

    /// Compares `answer` to `gold` under `tolerance`.
    ///
    /// Correctness is 1 inside the tolerance and `1 - error / tolerance`
    /// (floored at 0) outside it, so it is 0 as soon as the tolerance is
    /// exceeded.
    pub fn compare(&self, answer: f64, gold: f64, tolerance: f64) -> Comparison {
        let absolute_error = (answer - gold).abs();

        let (ratio, relative_error) = if gold.abs() < self.policy.near_zero_threshold {
            (absolute_error / self.policy.absolute_floor, None)
        } else {
            let relative = absolute_error / gold.abs();
            (relative / tolerance, Some(relative))
        };

        let within_tolerance = ratio <= 1.0;
        let correctness = if within_tolerance {
            1.0
        } else {
            (1.0 - ratio).max(0.0)
        };

        let lower = self.policy.unit_band_lower * gold.abs();
        let upper = self.policy.unit_band_upper * gold.abs();
        let unit_consistency = if lower < answer.abs() && answer.abs() < upper {
            1.0
        } else {
            0.5
        };

        Comparison {
            correctness,
            within_tolerance,
            unit_consistency,
            absolute_error,
            relative_error,
        }
    }

    /// Grades a calculation answer, running `code` first when present.
    ///
    /// The code's value (or the last number it printed) supersedes
    /// `text_answer`. A failing snippet zeroes `code_execution` and records
    /// the error; the text answer is still graded.
    pub fn grade_calculation(
        &self,
        task: &TaskInstance,
        text_answer: Option<f64>,
        code: Option<&str>,
    ) -> Grade {
        let mut grade = Grade::default();
        let mut code_answer = None;

        match code {
            Some(code) => {
                let mut executor = SandboxExecutor::new(self.sandbox_timeout);
                let result = executor.execute(code, &injectable(&task.parameters), None);
                match result.error {
                    Some(error) => {
                        debug!(task = %task.id, error = %error, "Submitted code failed");
                        grade.set("code_execution", 0.0);
                        grade.set("intermediate_logic", 0.5);
                        grade.error = Some(error);
                    }
                    None => {
                        code_answer = result.numeric_value().or_else(|| result.last_stdout_number());
                        grade.set("code_execution", 1.0);
                        grade.set("intermediate_logic", 1.0);
                    }
                }
            }
            None => {
                grade.set("code_execution", 0.5);
                grade.set("intermediate_logic", 0.5);
            }
        }

        let Some(gold) = task.gold.value else {
            warn!(task = %task.id, "Calculation task has no gold value");
            grade.set("correctness", 0.0);
            grade.set("value_tolerance", 0.0);
            grade.error.get_or_insert_with(|| "Task has no gold value".to_string());
            return grade;
        };

        let Some(answer) = code_answer.or(text_answer) else {
            grade.set("correctness", 0.0);
            grade.set("value_tolerance", 0.0);
            grade.set("unit_consistency", 0.0);
            grade.error.get_or_insert_with(|| "No answer provided".to_string());
            return grade;
        };

        let comparison = self.compare(answer, gold, self.relative_tolerance(&task.gold));
        grade.set("correctness", comparison.correctness);
        grade.set(
            "value_tolerance",
            if comparison.within_tolerance { 1.0 } else { 0.0 },
        );
        grade.set("unit_consistency", comparison.unit_consistency);
        grade
            .diagnostics
            .insert("absolute_error".to_string(), comparison.absolute_error);
        grade.diagnostics.insert(
            "relative_error".to_string(),
            comparison.relative_error.unwrap_or(comparison.absolute_error),
        );
        grade
    }

    /// Runs design code with the scalar design parameters injected.
    pub fn grade_design_code(&self, design: &Map<String, Value>, code: Option<&str>) -> Grade {
        let mut grade = Grade::default();
        let Some(code) = code else {
            grade.set("code_execution", 0.0);
            grade.set("syntax_correct", 0.0);
            return grade;
        };

        let scalars: Map<String, Value> = design
            .iter()
            .filter(|(_, value)| matches!(value, Value::Number(_) | Value::String(_) | Value::Bool(_)))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut executor = SandboxExecutor::new(self.sandbox_timeout);
        let result = executor.execute(code, &injectable(&scalars), None);
        match result.error {
            Some(error) => {
                grade.set("code_execution", 0.0);
                grade.set("syntax_correct", 0.0);
                grade.error = Some(error);
            }
            None => {
                let has_output = result.value.is_some() || !result.stdout.trim().is_empty();
                grade.set("code_execution", if has_output { 1.0 } else { 0.5 });
                grade.set("syntax_correct", 1.0);
            }
        }
        grade
    }
}

/// Task or design parameters as sandbox variables.
///
/// Parameter objects carrying a `value` field (`{"value": 2.0, "unit": "m"}`)
/// are flattened to that value. Names reserved for library handles are
/// dropped.
pub fn injectable(parameters: &Map<String, Value>) -> Map<String, Value> {
    parameters
        .iter()
        .filter(|(name, _)| {
            let reserved = RESERVED_NAMES.contains(&name.as_str());
            if reserved {
                debug!(parameter = %name, "Dropping parameter that shadows a library name");
            }
            !reserved
        })
        .map(|(name, value)| {
            let value = match value {
                Value::Object(object) => object.get("value").cloned().unwrap_or(Value::Null),
                other => other.clone(),
            };
            (name.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use serde_json::json;

    fn grader() -> ToleranceGrader {
        ToleranceGrader::new(TolerancePolicy::default(), Duration::from_secs(30))
    }

    fn calculation(gold: f64) -> TaskInstance {
        TaskInstance::new("b-1", TaskKind::Calculation, "Compute the tip deflection.")
            .with_gold_value(gold)
    }

    #[test]
    fn test_within_relative_tolerance() {
        let grade = grader().grade_calculation(&calculation(0.001), Some(0.001 * 1.005), None);
        assert_eq!(grade.scores["value_tolerance"], 1.0);
        assert_eq!(grade.scores["correctness"], 1.0);
        assert_eq!(grade.scores["unit_consistency"], 1.0);
        assert!(grade.error.is_none());
    }

    #[test]
    fn test_order_of_magnitude_error() {
        let grade = grader().grade_calculation(&calculation(0.001), Some(0.001 * 10.0), None);
        assert!(grade.scores["correctness"] < 0.5);
        assert_eq!(grade.scores["value_tolerance"], 0.0);
        assert_eq!(grade.scores["unit_consistency"], 0.5);
    }

    #[test]
    fn test_no_credit_outside_tolerance() {
        let comparison = grader().compare(101.5, 100.0, 0.01);
        assert!(!comparison.within_tolerance);
        assert_eq!(comparison.correctness, 0.0);
        assert!((comparison.relative_error.unwrap() - 0.015).abs() < 1e-12);

        let comparison = grader().compare(101.4, 100.0, 0.01);
        assert!(!comparison.within_tolerance);
        assert_eq!(comparison.correctness, 0.0);

        let near_zero = grader().compare(2.5e-6, 0.0, 0.01);
        assert!(!near_zero.within_tolerance);
        assert_eq!(near_zero.correctness, 0.0);
    }

    #[test]
    fn test_answer_just_outside_tolerance_is_not_a_success() {
        let grade = grader().grade_calculation(&calculation(100.0), Some(101.4), None);
        assert_eq!(grade.scores["value_tolerance"], 0.0);
        assert_eq!(grade.scores["correctness"], 0.0);
        assert!(!crate::scoring::is_success(TaskKind::Calculation, &grade.scores));

        let grade = grader().grade_calculation(&calculation(100.0), Some(100.9), None);
        assert!(crate::scoring::is_success(TaskKind::Calculation, &grade.scores));
    }

    #[test]
    fn test_near_zero_gold_uses_absolute_error() {
        let comparison = grader().compare(1.1e-8, 1e-8, 0.01);
        assert!(comparison.relative_error.is_none());
        assert!(comparison.within_tolerance);
        assert!(comparison.correctness.is_finite());

        let grade = grader().grade_calculation(&calculation(1e-8), Some(1.1e-8), None);
        assert_eq!(grade.scores["value_tolerance"], 1.0);
        assert!(grade.diagnostics.values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_zero_gold_is_finite() {
        let comparison = grader().compare(0.5, 0.0, 0.01);
        assert_eq!(comparison.correctness, 0.0);
        assert_eq!(comparison.unit_consistency, 0.5);
    }

    #[test]
    fn test_instance_tolerance_is_floored() {
        let task = calculation(1.0).with_tolerance(0.001);
        assert_eq!(grader().relative_tolerance(&task.gold), 0.01);
        let task = calculation(1.0).with_tolerance(0.05);
        assert_eq!(grader().relative_tolerance(&task.gold), 0.05);
    }

    #[test]
    fn test_code_value_supersedes_text() {
        let task = calculation(0.0015)
            .with_parameter("P", json!(1000.0))
            .with_parameter("L", json!({"value": 2.0, "unit": "m"}));
        let code = "deflection = P * L / 1000000 * 0.75\nresult = deflection";
        let grade = grader().grade_calculation(&task, Some(99.0), Some(code));
        assert_eq!(grade.scores["code_execution"], 1.0);
        assert_eq!(grade.scores["intermediate_logic"], 1.0);
        assert_eq!(grade.scores["correctness"], 1.0);
    }

    #[test]
    fn test_code_error_still_grades_text_answer() {
        let grade = grader().grade_calculation(
            &calculation(0.0015),
            Some(0.0015),
            Some("result = undefined_name * 2"),
        );
        assert_eq!(grade.scores["code_execution"], 0.0);
        assert_eq!(grade.scores["correctness"], 1.0);
        assert!(grade.error.as_deref().unwrap_or_default().contains("NameError"));
    }

    #[test]
    fn test_printed_value_is_used() {
        let grade = grader().grade_calculation(
            &calculation(42.0),
            None,
            Some("x = 6 * 7\nprint(f\"stress = {x} Pa\")\nx = 0"),
        );
        assert_eq!(grade.scores["correctness"], 0.0);

        let grade = grader().grade_calculation(&calculation(42.0), None, Some("print(6 * 7)"));
        assert_eq!(grade.scores["correctness"], 1.0);
    }

    #[test]
    fn test_no_answer() {
        let grade = grader().grade_calculation(&calculation(1.0), None, None);
        assert_eq!(grade.scores["correctness"], 0.0);
        assert_eq!(grade.scores["code_execution"], 0.5);
        assert_eq!(grade.error.as_deref(), Some("No answer provided"));
    }

    #[test]
    fn test_design_code_grading() {
        let design = json!({"height_m": 0.25, "width_m": 0.1, "material": "steel", "dims": [1, 2]});
        let design = design.as_object().unwrap();

        let grade = grader().grade_design_code(design, Some("result = height_m * width_m"));
        assert_eq!(grade.scores["code_execution"], 1.0);
        assert_eq!(grade.scores["syntax_correct"], 1.0);

        let grade = grader().grade_design_code(design, Some("area = height_m * width_m"));
        assert_eq!(grade.scores["code_execution"], 1.0);

        let grade = grader().grade_design_code(design, Some("import os"));
        assert_eq!(grade.scores["code_execution"], 0.0);
        assert!(grade.error.is_some());

        let grade = grader().grade_design_code(design, None);
        assert_eq!(grade.scores["syntax_correct"], 0.0);
    }

    #[test]
    fn test_injectable_drops_reserved_names() {
        let params = json!({"np": 3, "E": {"value": 200e9, "unit": "Pa"}});
        let injected = injectable(params.as_object().unwrap());
        assert!(!injected.contains_key("np"));
        assert_eq!(injected["E"], json!(200e9));
    }
}
