//! Turn-by-turn exchange with a target agent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::environment::TaskEnvironment;
use super::materials::MaterialDatabase;
use super::prompts::{needs_repair, repair_prompt, task_prompt};
use super::session::{ConversationSession, Speaker, Utterance};
use crate::config::BenchConfig;
use crate::error::{ConfigError, DriverError};
use crate::extraction::{extract, extract_action, ParsedResponse};
use crate::metrics::MetricsCollector;
use crate::scoring::ToleranceGrader;
use crate::target::TargetAgent;
use crate::task::TaskInstance;

/// How a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// A `respond` action was accepted by the completion predicate.
    Completed,
    /// The raw text of an unparseable reply was taken as the final answer.
    FormatFallback,
    /// The turn budget ran out before a final answer.
    BudgetExhausted,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::FormatFallback => "format_fallback",
            Termination::BudgetExhausted => "budget_exhausted",
        }
    }
}

/// Serializable digest of a finished conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverSummary {
    pub reward: f64,
    pub termination: Termination,
    pub turns: usize,
    pub repair_prompts: usize,
    pub format_failures: usize,
    pub context_id: Option<String>,
    pub cost: f64,
}

/// Everything a conversation produced.
#[derive(Debug, Clone)]
pub struct DriverOutcome {
    pub reward: f64,
    pub termination: Termination,
    /// Prompts sent to the target, repair prompts excluded.
    pub turns: usize,
    pub repair_prompts: usize,
    pub format_failures: usize,
    pub context_id: Option<String>,
    /// Sum of the costs reported by the target.
    pub cost: f64,
    /// The accepted final answer, or an extraction of the last reply when the
    /// budget ran out.
    pub final_response: ParsedResponse,
    /// Info of the terminal step.
    pub info: Map<String, Value>,
    pub transcript: Vec<Utterance>,
}

impl DriverOutcome {
    pub fn summary(&self) -> DriverSummary {
        DriverSummary {
            reward: self.reward,
            termination: self.termination,
            turns: self.turns,
            repair_prompts: self.repair_prompts,
            format_failures: self.format_failures,
            context_id: self.context_id.clone(),
            cost: self.cost,
        }
    }
}

/// Drives one task instance at a time against a target agent.
///
/// Each call to [`ConversationDriver::run`] owns a fresh
/// [`ConversationSession`], so nothing carries over between instances.
pub struct ConversationDriver {
    max_turns: usize,
    max_format_retries: usize,
    grader: ToleranceGrader,
    materials: Arc<MaterialDatabase>,
    sandbox_timeout: Duration,
    metrics: MetricsCollector,
}

impl ConversationDriver {
    pub fn new(
        max_turns: usize,
        max_format_retries: usize,
        grader: ToleranceGrader,
        materials: Arc<MaterialDatabase>,
        sandbox_timeout: Duration,
    ) -> Self {
        Self {
            max_turns,
            max_format_retries,
            grader,
            materials,
            sandbox_timeout,
            metrics: MetricsCollector::new(),
        }
    }

    /// Builds a driver from configuration, loading the material file if one
    /// is configured.
    pub fn from_config(config: &BenchConfig) -> Result<Self, ConfigError> {
        let materials = MaterialDatabase::load(config.materials_file.as_deref())?;
        Ok(Self::new(
            config.max_turns,
            config.max_format_retries,
            ToleranceGrader::new(config.tolerance, config.sandbox_timeout()),
            Arc::new(materials),
            config.sandbox_timeout(),
        ))
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn materials(&self) -> &MaterialDatabase {
        &self.materials
    }

    /// Runs the conversation for `task` until a final answer is accepted or
    /// the turn budget is spent.
    ///
    /// # Errors
    ///
    /// Transport failures and context id changes end the instance with an
    /// error. Format problems never do: they lead to one repair prompt at
    /// most, then to a forced final answer.
    pub async fn run(
        &self,
        target: &dyn TargetAgent,
        task: &TaskInstance,
    ) -> Result<DriverOutcome, DriverError> {
        let level = task.kind.level().to_string();
        let environment = TaskEnvironment::new(task, &self.materials, &self.grader);
        let mut session = ConversationSession::new(self.sandbox_timeout);

        let mut prompt = task_prompt(task);
        let mut turns = 0usize;
        let mut repair_prompts = 0usize;
        let mut format_failures = 0usize;
        let mut cost = 0.0;
        let mut sending_repair = false;
        let mut last_reply = String::new();

        info!(task = %task.id, kind = %task.kind, max_turns = self.max_turns, "Starting conversation");

        let (termination, reward, final_response, info) = loop {
            if !sending_repair {
                if turns >= self.max_turns {
                    warn!(task = %task.id, turns, "Turn budget exhausted");
                    let parsed = extract(&last_reply, task.kind, task.num_options());
                    break (Termination::BudgetExhausted, 0.0, parsed, Map::new());
                }
                turns += 1;
            }

            debug!(task = %task.id, turn = turns, repair = sending_repair, "Sending prompt");
            session.record(Speaker::Evaluator, prompt.clone());
            let reply = target.send_message(&prompt, session.context_id()).await?;
            session.bind_context(reply.context_id.as_deref())?;
            cost += reply.cost.unwrap_or(0.0);
            session.record(Speaker::Target, reply.text.clone());
            last_reply = reply.text;

            let extracted = extract_action(&last_reply, task.kind, task.num_options());
            let forced = extracted.is_fallback();
            if forced {
                format_failures += 1;
                if !sending_repair
                    && repair_prompts < self.max_format_retries
                    && needs_repair(&last_reply)
                {
                    repair_prompts += 1;
                    debug!(task = %task.id, turn = turns, "Reply lacks required structure, sending repair prompt");
                    prompt = repair_prompt(task.kind);
                    sending_repair = true;
                    continue;
                }
                info!(task = %task.id, turn = turns, "Falling back to raw reply as final answer");
            }
            sending_repair = false;

            let outcome = environment.step(&extracted.action, forced, &mut session);
            if outcome.done {
                let parsed = outcome
                    .parsed_response()
                    .unwrap_or_else(|| extract(&last_reply, task.kind, task.num_options()));
                let termination = if forced {
                    Termination::FormatFallback
                } else {
                    Termination::Completed
                };
                break (termination, outcome.reward, parsed, outcome.info);
            }
            prompt = outcome.observation;
        };

        self.metrics
            .record_format_failures(&level, u32::try_from(format_failures).unwrap_or(u32::MAX));
        self.metrics
            .record_turns(&level, u32::try_from(turns).unwrap_or(u32::MAX));

        info!(
            task = %task.id,
            termination = termination.as_str(),
            turns,
            repair_prompts,
            format_failures,
            reward,
            "Conversation finished"
        );

        Ok(DriverOutcome {
            reward,
            termination,
            turns,
            repair_prompts,
            format_failures,
            context_id: session.context_id().map(str::to_string),
            cost,
            final_response,
            info,
            transcript: session.into_history(),
        })
    }
}
