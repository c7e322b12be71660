//! Scoring Engine.
//!
//! A deterministic grader (tolerance comparison, code re-execution) and a
//! judged grader (LLM rubric) feed one [`ScoreSet`] per evaluation. Success
//! is derived from the tier's predicate in [`success`].

pub mod deterministic;
pub mod engine;
pub mod judge;
pub mod score_set;
pub mod success;

pub use deterministic::{injectable, Comparison, Grade, ToleranceGrader};
pub use engine::{choice_correctness, ScoringEngine};
pub use judge::{
    criterion_name, neutral_scores, parse_scores, rubric_keys, JudgeError, LlmJudge, NeutralJudge,
    RubricJudge, NEUTRAL_SCORE,
};
pub use score_set::ScoreSet;
pub use success::{is_success, DESIGN_CRITERIA, MULTI_STEP_CRITERIA};
