//! Task instances and task-file loading.
//!
//! A task instance is one concrete problem of a given tier. The tier decides
//! which reply shape the target must produce and how the reply is graded.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::TaskError;

/// The closed set of task tiers.
///
/// Tier A is a knowledge check with numbered options, tier B a parametric
/// calculation with a numeric gold value, tier C a single component design
/// and tier D a coupled multi-step design with system-level metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[serde(alias = "A", alias = "a", alias = "knowledge_check")]
    MultipleChoice,
    #[serde(alias = "B", alias = "b", alias = "parametric_calculation")]
    Calculation,
    #[serde(alias = "C", alias = "c", alias = "single_design")]
    Design,
    #[serde(alias = "D", alias = "d", alias = "multi_step")]
    MultiStepDesign,
}

impl TaskKind {
    /// All tiers in order.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::MultipleChoice,
        TaskKind::Calculation,
        TaskKind::Design,
        TaskKind::MultiStepDesign,
    ];

    /// Returns the snake_case name used in reports and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::MultipleChoice => "multiple_choice",
            TaskKind::Calculation => "calculation",
            TaskKind::Design => "design",
            TaskKind::MultiStepDesign => "multi_step_design",
        }
    }

    /// Returns the tier letter (A-D).
    pub fn level(&self) -> char {
        match self {
            TaskKind::MultipleChoice => 'A',
            TaskKind::Calculation => 'B',
            TaskKind::Design => 'C',
            TaskKind::MultiStepDesign => 'D',
        }
    }

    /// Whether the final answer is a structured design block.
    pub fn is_design(&self) -> bool {
        matches!(self, TaskKind::Design | TaskKind::MultiStepDesign)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a" | "multiple_choice" | "knowledge_check" => Ok(TaskKind::MultipleChoice),
            "b" | "calculation" | "parametric_calculation" => Ok(TaskKind::Calculation),
            "c" | "design" | "single_design" => Ok(TaskKind::Design),
            "d" | "multi_step_design" | "multi_step" => Ok(TaskKind::MultiStepDesign),
            other => Err(format!("unknown task kind '{}'", other)),
        }
    }
}

/// Reference answer for a task instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoldAnswer {
    /// Zero-based index of the correct option (tier A).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<usize>,
    /// Numeric gold value (tier B).
    #[serde(default, alias = "solution", skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Per-instance tolerance overriding the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Reference explanation or design shown to the judge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// One concrete problem presented to the target agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    /// Unique instance identifier.
    pub id: String,
    /// Task family this instance was generated from; defaults to `id`.
    #[serde(default)]
    pub task_id: String,
    #[serde(alias = "level", alias = "task_type")]
    pub kind: TaskKind,
    /// Problem statement or question.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Named inputs, also injected into submitted code.
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub gold: GoldAnswer,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objectives: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl TaskInstance {
    /// Creates a task instance with empty parameters and gold answer.
    pub fn new(id: impl Into<String>, kind: TaskKind, prompt: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            task_id: id.clone(),
            id,
            kind,
            prompt: prompt.into(),
            options: Vec::new(),
            parameters: Map::new(),
            gold: GoldAnswer::default(),
            objectives: Vec::new(),
            constraints: Vec::new(),
            topic: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>, correct_option: usize) -> Self {
        self.options = options;
        self.gold.correct_option = Some(correct_option);
        self
    }

    pub fn with_gold_value(mut self, value: f64) -> Self {
        self.gold.value = Some(value);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.gold.tolerance = Some(tolerance);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = task_id.into();
        self
    }

    pub fn with_objectives(mut self, objectives: Vec<String>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<String>) -> Self {
        self.constraints = constraints;
        self
    }

    /// Number of answer options (zero outside tier A).
    pub fn num_options(&self) -> usize {
        self.options.len()
    }

    /// Task family identifier used for aggregation.
    pub fn family(&self) -> &str {
        if self.task_id.is_empty() {
            &self.id
        } else {
            &self.task_id
        }
    }

    /// Checks that the instance carries what its tier needs to be graded.
    pub fn validate(&self) -> Result<(), TaskError> {
        let invalid = |reason: &str| TaskError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("empty id"));
        }
        if self.prompt.trim().is_empty() {
            return Err(invalid("empty prompt"));
        }

        match self.kind {
            TaskKind::MultipleChoice => {
                if self.options.is_empty() {
                    return Err(invalid("multiple-choice task without options"));
                }
                match self.gold.correct_option {
                    Some(idx) if idx < self.options.len() => {}
                    Some(_) => return Err(invalid("correct_option out of range")),
                    None => return Err(invalid("missing gold correct_option")),
                }
            }
            TaskKind::Calculation => match self.gold.value {
                Some(v) if v.is_finite() => {}
                _ => return Err(invalid("missing or non-finite gold value")),
            },
            TaskKind::Design | TaskKind::MultiStepDesign => {}
        }

        if let Some(tol) = self.gold.tolerance {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(invalid("tolerance must be a non-negative number"));
            }
        }

        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<TaskInstance>),
    Wrapped { tasks: Vec<TaskInstance> },
}

/// Parses task instances from JSON or YAML text.
///
/// Accepts either a bare list or an object with a `tasks` list.
pub fn parse_tasks(content: &str, yaml: bool) -> Result<Vec<TaskInstance>, TaskError> {
    let file: TaskFile = if yaml {
        serde_yaml::from_str(content)?
    } else {
        serde_json::from_str(content)?
    };

    let mut tasks = match file {
        TaskFile::List(tasks) | TaskFile::Wrapped { tasks } => tasks,
    };

    let mut seen = HashSet::new();
    for task in &mut tasks {
        if task.task_id.is_empty() {
            task.task_id = task.id.clone();
        }
        task.validate()?;
        if !seen.insert(task.id.clone()) {
            return Err(TaskError::DuplicateId(task.id.clone()));
        }
    }

    Ok(tasks)
}

/// Loads task instances from a `.json`, `.yaml` or `.yml` file.
pub fn load_tasks(path: &Path) -> Result<Vec<TaskInstance>, TaskError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let yaml = match extension.as_str() {
        "json" => false,
        "yaml" | "yml" => true,
        other => return Err(TaskError::UnsupportedFormat(other.to_string())),
    };

    let content = std::fs::read_to_string(path)?;
    let tasks = parse_tasks(&content, yaml)?;
    tracing::info!(path = %path.display(), count = tasks.len(), "Loaded task instances");
    Ok(tasks)
}
