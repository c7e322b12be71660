//! Combines deterministic and judged grading into one [`ScoreSet`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::deterministic::{Grade, ToleranceGrader};
use super::judge::{neutral_scores, NeutralJudge, RubricJudge};
use super::score_set::ScoreSet;
use crate::config::BenchConfig;
use crate::extraction::{ParsedAnswer, ParsedResponse};
use crate::metrics::MetricsCollector;
use crate::task::TaskInstance;

/// Correctness of a multiple-choice selection: 0.5 when either side is
/// unknown.
pub fn choice_correctness(selected: Option<usize>, correct: Option<usize>) -> f64 {
    match (selected, correct) {
        (Some(selected), Some(correct)) if selected == correct => 1.0,
        (Some(_), Some(_)) => 0.0,
        _ => 0.5,
    }
}

pub struct ScoringEngine {
    grader: ToleranceGrader,
    judge: Arc<dyn RubricJudge>,
    metrics: MetricsCollector,
}

impl ScoringEngine {
    pub fn new(grader: ToleranceGrader, judge: Arc<dyn RubricJudge>) -> Self {
        Self {
            grader,
            judge,
            metrics: MetricsCollector::new(),
        }
    }

    /// Engine with the configured tolerance policy and the given judge.
    pub fn from_config(config: &BenchConfig, judge: Arc<dyn RubricJudge>) -> Self {
        Self::new(
            ToleranceGrader::new(config.tolerance, config.sandbox_timeout()),
            judge,
        )
    }

    /// Engine that never calls out: default tolerances and neutral judging.
    pub fn offline(sandbox_timeout: Duration) -> Self {
        Self::new(
            ToleranceGrader::new(Default::default(), sandbox_timeout),
            Arc::new(NeutralJudge),
        )
    }

    pub fn grader(&self) -> &ToleranceGrader {
        &self.grader
    }

    /// Scores one parsed response. Never fails: grading faults are
    /// recorded in the score set's `error` key.
    pub async fn score(&self, task: &TaskInstance, parsed: &ParsedResponse) -> ScoreSet {
        let kind = task.kind;
        if parsed.kind() != kind {
            warn!(
                task = %task.id,
                expected = %kind,
                actual = %parsed.kind(),
                "Parsed response does not match the task kind"
            );
            return ScoreSet::failed(
                kind,
                format!("Response parsed as {} for a {} task", parsed.kind(), kind),
            );
        }

        let mut errors = Vec::new();
        let grade = match &parsed.answer {
            ParsedAnswer::MultipleChoice { selected_option } => {
                let mut grade = Grade::default();
                grade.scores.insert(
                    "correctness".to_string(),
                    choice_correctness(*selected_option, task.gold.correct_option),
                );
                grade
            }
            ParsedAnswer::Calculation { answer, code } => {
                self.grader
                    .grade_calculation(task, *answer, code.as_deref().filter(|c| !c.trim().is_empty()))
            }
            ParsedAnswer::Design { design, .. } | ParsedAnswer::MultiStepDesign { design, .. } => {
                self.grader.grade_design_code(design, parsed.answer.code())
            }
        };

        let mut scores: BTreeMap<String, f64> = grade.scores;
        if let Some(error) = grade.error {
            errors.push(error);
        }

        match self.judge.judge(task, parsed).await {
            Ok(judged) => scores.extend(judged),
            Err(e) => {
                warn!(task = %task.id, error = %e, "Judge failed, using neutral scores");
                scores.extend(neutral_scores(kind));
                errors.push(format!("judge: {}", e));
            }
        }

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        let score_set = ScoreSet::new(kind, scores, grade.diagnostics, error);
        self.metrics.record_success(score_set.success());
        debug!(
            task = %task.id,
            success = score_set.success(),
            criteria = score_set.scores().len(),
            "Scored response"
        );
        score_set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{extract, ExtractionStrategy};
    use crate::scoring::judge::JudgeError;
    use crate::task::TaskKind;
    use async_trait::async_trait;

    struct FixedJudge(BTreeMap<String, f64>);

    #[async_trait]
    impl RubricJudge for FixedJudge {
        async fn judge(
            &self,
            _task: &TaskInstance,
            _parsed: &ParsedResponse,
        ) -> Result<BTreeMap<String, f64>, JudgeError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenJudge;

    #[async_trait]
    impl RubricJudge for BrokenJudge {
        async fn judge(
            &self,
            _task: &TaskInstance,
            _parsed: &ParsedResponse,
        ) -> Result<BTreeMap<String, f64>, JudgeError> {
            Err(JudgeError::EmptyReply)
        }
    }

    fn engine(judge: Arc<dyn RubricJudge>) -> ScoringEngine {
        ScoringEngine::from_config(&BenchConfig::default(), judge)
    }

    fn mc_task() -> TaskInstance {
        TaskInstance::new("a-1", TaskKind::MultipleChoice, "Which theory applies?").with_options(
            vec![
                "Euler-Bernoulli".into(),
                "Timoshenko".into(),
                "Mindlin".into(),
                "Kirchhoff".into(),
            ],
            1,
        )
    }

    #[test]
    fn test_choice_correctness() {
        assert_eq!(choice_correctness(Some(1), Some(1)), 1.0);
        assert_eq!(choice_correctness(Some(0), Some(1)), 0.0);
        assert_eq!(choice_correctness(None, Some(1)), 0.5);
        assert_eq!(choice_correctness(Some(1), None), 0.5);
    }

    #[tokio::test]
    async fn test_multiple_choice_correct() {
        let parsed = extract(
            "...the correct answer is Option 2...",
            TaskKind::MultipleChoice,
            4,
        );
        let set = engine(Arc::new(NeutralJudge)).score(&mc_task(), &parsed).await;
        assert_eq!(set.get("correctness"), Some(1.0));
        assert_eq!(set.get("overall"), Some(0.5));
        assert!(set.success());
        assert!(set.error().is_none());
    }

    #[tokio::test]
    async fn test_calculation_from_prose() {
        let task = TaskInstance::new("b-1", TaskKind::Calculation, "Compute the deflection.")
            .with_gold_value(0.0015);
        let parsed = extract(
            "Using PL^3/3EI, the deflection is 0.0015 m.",
            TaskKind::Calculation,
            0,
        );
        let set = engine(Arc::new(NeutralJudge)).score(&task, &parsed).await;
        assert!(set.get("correctness").unwrap() >= 0.99);
        assert_eq!(set.get("value_tolerance"), Some(1.0));
        assert_eq!(set.get("judge_overall"), Some(0.5));
        assert!(set.success());
    }

    #[tokio::test]
    async fn test_judge_failure_falls_back_to_neutral() {
        let task = TaskInstance::new("c-1", TaskKind::Design, "Design a bracket.");
        let parsed = ParsedResponse::new(
            "design text",
            ParsedAnswer::empty(TaskKind::Design),
            ExtractionStrategy::Fallback,
        );
        let set = engine(Arc::new(BrokenJudge)).score(&task, &parsed).await;
        assert_eq!(set.get("safety_constraint_awareness"), Some(0.5));
        assert_eq!(set.get("overall"), Some(0.5));
        assert!(set.error().unwrap().starts_with("judge:"));
        assert!(!set.success());
    }

    #[tokio::test]
    async fn test_design_success_from_judge() {
        let judged: BTreeMap<String, f64> = [
            ("technical_accuracy", 0.8),
            ("safety_constraint_awareness", 0.8),
            ("reasoning_quality", 0.8),
            ("engineering_judgment", 0.8),
            ("overall", 0.8),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();
        let task = TaskInstance::new("c-1", TaskKind::Design, "Design a bracket.");
        let raw = "```json\n{\"design\": {\"height_m\": 0.25}, \"rationale\": \"stiff\", \
                   \"code\": \"result = height_m * 2\"}\n```";
        let parsed = extract(raw, TaskKind::Design, 0);
        let set = engine(Arc::new(FixedJudge(judged))).score(&task, &parsed).await;
        assert_eq!(set.get("code_execution"), Some(1.0));
        assert_eq!(set.get("syntax_correct"), Some(1.0));
        assert!(set.success());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_recorded() {
        let parsed = extract("Option 1", TaskKind::MultipleChoice, 4);
        let task = TaskInstance::new("b-1", TaskKind::Calculation, "Compute.").with_gold_value(1.0);
        let set = engine(Arc::new(NeutralJudge)).score(&task, &parsed).await;
        assert!(!set.success());
        assert!(set.error().is_some());
        assert!(set.scores().is_empty());
    }
}
