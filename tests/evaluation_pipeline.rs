//! End-to-end evaluation runs against in-memory target and judge doubles.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::Write;
use std::sync::{Arc, Mutex};

use mecheval::config::BenchConfig;
use mecheval::driver::Termination;
use mecheval::error::TransportError;
use mecheval::evaluation::{
    aggregate_records, read_records, write_records, Evaluator, RunSummary, DEFAULT_CRITERION,
};
use mecheval::extraction::{ExtractionStrategy, ParsedAnswer, ParsedResponse};
use mecheval::scoring::{neutral_scores, JudgeError, RubricJudge};
use mecheval::statistics::{Bootstrap, GroupKey};
use mecheval::target::{AgentCard, TargetAgent, TargetReply};
use mecheval::task::{load_tasks, TaskInstance, TaskKind};

/// Picks a reply script from the first prompt of each conversation and
/// continues it under the context id it hands out.
struct RoutedTarget {
    routes: Vec<(&'static str, Vec<&'static str>)>,
    conversations: Mutex<HashMap<String, VecDeque<String>>>,
    next_id: Mutex<usize>,
}

impl RoutedTarget {
    fn new(routes: Vec<(&'static str, Vec<&'static str>)>) -> Self {
        Self {
            routes,
            conversations: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

#[async_trait]
impl TargetAgent for RoutedTarget {
    async fn send_message(
        &self,
        text: &str,
        context_id: Option<&str>,
    ) -> Result<TargetReply, TransportError> {
        let context_id = match context_id {
            Some(id) => id.to_string(),
            None => {
                let script = self
                    .routes
                    .iter()
                    .find(|(keyword, _)| text.contains(keyword))
                    .map(|(_, replies)| replies.iter().map(|r| r.to_string()).collect())
                    .ok_or_else(|| TransportError::RequestFailed("no route".to_string()))?;
                let mut next_id = self.next_id.lock().expect("lock poisoned");
                *next_id += 1;
                let id = format!("ctx-{}", next_id);
                self.conversations
                    .lock()
                    .expect("lock poisoned")
                    .insert(id.clone(), script);
                id
            }
        };

        let reply = self
            .conversations
            .lock()
            .expect("lock poisoned")
            .get_mut(&context_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| "I have nothing more to add.".to_string());
        Ok(TargetReply::new(reply)
            .with_context_id(context_id)
            .with_cost(0.01))
    }

    async fn agent_card(&self) -> Result<AgentCard, TransportError> {
        Ok(AgentCard {
            name: "scripted".to_string(),
            ..AgentCard::default()
        })
    }
}

/// High design scores, neutral everything else; counts calls.
struct ScriptedJudge {
    calls: Mutex<usize>,
}

#[async_trait]
impl RubricJudge for ScriptedJudge {
    async fn judge(
        &self,
        task: &TaskInstance,
        _parsed: &ParsedResponse,
    ) -> Result<BTreeMap<String, f64>, JudgeError> {
        *self.calls.lock().expect("lock poisoned") += 1;
        if task.kind.is_design() {
            let mut scores = neutral_scores(task.kind);
            for value in scores.values_mut() {
                *value = 0.8;
            }
            return Ok(scores);
        }
        Ok(neutral_scores(task.kind))
    }
}

const TASKS_YAML: &str = r#"
tasks:
  - id: a-1-1
    task_id: a-1
    kind: A
    prompt: "BEAMTHEORY: which beam theory accounts for shear deformation?"
    options: ["Euler-Bernoulli", "Timoshenko", "Kirchhoff", "Rankine"]
    gold:
      correct_option: 1
  - id: b-1-1
    task_id: b-1
    kind: B
    prompt: "DEFLECTION: midspan deflection of a simply supported beam under a central load."
    parameters:
      P: 9000
      L: 2.0
      E: 200000000000.0
      I: 0.000005
    gold:
      value: 0.0015
      unit: m
  - id: c-1-1
    task_id: c-1
    kind: C
    prompt: "BRACKET: size a rectangular cantilever section."
    constraints: ["bending stress below 150 MPa"]
"#;

fn write_tasks() -> (tempfile::TempDir, Vec<TaskInstance>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(TASKS_YAML.as_bytes()).unwrap();
    let tasks = load_tasks(&path).unwrap();
    (dir, tasks)
}

fn evaluator(judge: Arc<dyn RubricJudge>, concurrency: usize) -> Evaluator {
    let config = BenchConfig::default().with_max_turns(6);
    Evaluator::from_config(&config, judge, "scripted-agent")
        .unwrap()
        .with_concurrency(concurrency)
}

fn scripted_target() -> RoutedTarget {
    RoutedTarget::new(vec![
        (
            "BEAMTHEORY",
            vec!["Euler-Bernoulli ignores shear, so the correct answer is Option 2 (Timoshenko)."],
        ),
        (
            "DEFLECTION",
            vec![
                r#"<json>{"name": "getMaterialProperties", "kwargs": {"material": "steel"}}</json>"#,
                r#"<json>{"name": "codeExec", "kwargs": {"code": "delta = 9000 * 2.0**3 / (48 * 200e9 * 5e-6)"}}</json>"#,
                "```python\ndelta = P * L**3 / (48 * E * I)\nprint(delta)\n```\nSo the deflection is 0.0015 m.",
            ],
        ),
        (
            "BRACKET",
            vec![
                r#"<json>{"name": "calculator", "kwargs": {"expression": "0.1 * 0.3^2 / 6"}}</json>"#,
                "```json\n{\"design\": {\"width_m\": 0.1, \"height_m\": 0.3}, \"rationale\": \"Section modulus sized for the moment.\", \"code\": \"S = width_m * height_m**2 / 6\\nresult = S\"}\n```",
            ],
        ),
    ])
}

#[tokio::test]
async fn test_batch_across_tiers() {
    let (_dir, tasks) = write_tasks();
    let judge = Arc::new(ScriptedJudge {
        calls: Mutex::new(0),
    });
    let records = evaluator(judge.clone(), 3)
        .evaluate_batch(&scripted_target(), &tasks)
        .await;

    assert_eq!(records.len(), 3);
    assert_eq!(*judge.calls.lock().unwrap(), 3);
    let ids: Vec<&str> = records.iter().map(|r| r.task_instance_id.as_str()).collect();
    assert_eq!(ids, vec!["a-1-1", "b-1-1", "c-1-1"]);

    let choice = &records[0];
    assert_eq!(
        choice.response.answer,
        ParsedAnswer::MultipleChoice {
            selected_option: Some(1)
        }
    );
    assert_eq!(choice.scores.get("correctness"), Some(1.0));
    assert!(choice.success());

    let calculation = &records[1];
    let driver = calculation.driver.as_ref().unwrap();
    assert_eq!(driver.termination, Termination::Completed);
    assert_eq!(driver.turns, 3);
    assert!((driver.cost - 0.03).abs() < 1e-12);
    assert!(calculation.scores.get("correctness").unwrap() >= 0.99);
    assert_eq!(calculation.scores.get("value_tolerance"), Some(1.0));
    assert_eq!(calculation.scores.get("code_execution"), Some(1.0));
    assert!(calculation.success());

    let design = &records[2];
    let driver = design.driver.as_ref().unwrap();
    assert_eq!(driver.turns, 2);
    assert_eq!(driver.format_failures, 0);
    assert_eq!(design.response.strategy, ExtractionStrategy::FencedBlock);
    assert_eq!(design.scores.get("overall"), Some(0.8));
    assert_eq!(design.scores.get("code_execution"), Some(1.0));
    assert!(design.success());

    let summary = RunSummary::from_records(&records);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.errored, 0);
}

#[tokio::test]
async fn test_garbage_target_degrades_without_failing() {
    let (_dir, tasks) = write_tasks();
    let target = RoutedTarget::new(vec![
        ("BEAMTHEORY", vec!["lorem ipsum"]),
        ("DEFLECTION", vec!["lorem ipsum"]),
        ("BRACKET", vec!["my design rationale is coming", "still thinking about the design"]),
    ]);
    let records = evaluator(Arc::new(mecheval::scoring::NeutralJudge), 1)
        .evaluate_batch(&target, &tasks)
        .await;

    assert_eq!(records.len(), 3);
    for record in &records {
        let driver = record.driver.as_ref().unwrap();
        assert_eq!(driver.termination, Termination::FormatFallback);
        assert!(driver.turns <= 6 + 1);
        assert!(!record.success());
    }
    assert_eq!(records[1].kind, TaskKind::Calculation);
    assert_eq!(records[1].error(), Some("No answer provided"));
    assert_eq!(records[2].driver.as_ref().unwrap().repair_prompts, 1);
    assert_eq!(records[2].response.raw_text, "still thinking about the design");
}

#[tokio::test]
async fn test_unreachable_instance_is_recorded() {
    let (_dir, tasks) = write_tasks();
    let target = RoutedTarget::new(vec![(
        "BEAMTHEORY",
        vec!["The correct answer is Option 2."],
    )]);
    let records = evaluator(Arc::new(mecheval::scoring::NeutralJudge), 2)
        .evaluate_batch(&target, &tasks)
        .await;

    assert_eq!(records.len(), 3);
    assert!(records[0].success());
    for record in &records[1..] {
        assert!(!record.success());
        assert!(record.error().unwrap().contains("no route"));
        assert!(record.driver.is_none());
    }
}

#[tokio::test]
async fn test_report_round_trip_and_stats() {
    let (dir, tasks) = write_tasks();
    let records = evaluator(Arc::new(mecheval::scoring::NeutralJudge), 1)
        .evaluate_batch(&scripted_target(), &tasks)
        .await;

    let path = dir.path().join("out").join("report.jsonl");
    write_records(&path, &records).unwrap();
    let back = read_records(&path).unwrap();
    assert_eq!(back, records);

    let bootstrap = Bootstrap::default().with_seed(5);
    let stats = aggregate_records(&back, DEFAULT_CRITERION, &bootstrap);
    assert_eq!(stats.len(), 3);
    let choice = stats[&GroupKey::new("a-1", "scripted-agent")];
    assert_eq!(choice.n, 1);
    assert_eq!(choice.mean, 1.0);
}

#[tokio::test]
async fn test_offline_answer_outside_tolerance_fails() {
    let (_dir, tasks) = write_tasks();
    let evaluator = evaluator(Arc::new(mecheval::scoring::NeutralJudge), 1);
    let deflection = &tasks[1];

    let record = evaluator
        .score_response(deflection, "So the deflection is 0.00152 m.", None)
        .await;
    assert_eq!(record.scores.get("value_tolerance"), Some(0.0));
    assert_eq!(record.scores.get("correctness"), Some(0.0));
    assert!(!record.success());

    let record = evaluator
        .score_response(deflection, "So the deflection is 0.001510 m.", None)
        .await;
    assert_eq!(record.scores.get("value_tolerance"), Some(1.0));
    assert!(record.success());
}
