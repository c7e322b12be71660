//! Prompts sent to the target agent.

use crate::task::{TaskInstance, TaskKind};

const TOOLS: &str = r#"Available actions:
- calculator: evaluate one arithmetic expression. kwargs: {"expression": "5000 / 0.01"}
- codeExec: run a short numeric script (math and numpy are available; variables persist between calls). kwargs: {"code": "stress = F / A\nresult = stress"}
- getMaterialProperties: look up a material (steel, aluminum, titanium, composite). kwargs: {"material": "steel"}
- respond: give your final answer. kwargs: {"content": "..."}

Emit exactly one action per message as JSON wrapped in <json>...</json> tags, for example:
<json>
{"name": "calculator", "kwargs": {"expression": "2 + 2"}}
</json>
"#;

/// Required shape of the final answer for a tier.
pub fn output_contract(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::MultipleChoice => {
            "State the option you select by number (for example \"The correct answer is Option 2\") \
             and explain why the other options are wrong."
        }
        TaskKind::Calculation => {
            "State the final numerical value with its unit (for example \"The answer is 123.45 Pa\") \
             and include the code you used to compute it."
        }
        TaskKind::Design => {
            "Your final message must contain exactly one ```json fenced block with the keys \
             \"design\" (an object of design variables), \"rationale\" (a string) and \"code\" \
             (a script that checks the design). Do not write prose outside the block."
        }
        TaskKind::MultiStepDesign => {
            "Your final message must contain exactly one ```json fenced block with the keys \
             \"design\" (an object of design variables), \"systemMetrics\" (an object of \
             system-level results), \"rationale\" (a string) and \"code\" (a script that \
             checks the design). Do not write prose outside the block."
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First prompt of a task instance.
pub fn task_prompt(task: &TaskInstance) -> String {
    let mut sections = vec![format!(
        "Mechanical engineering problem (level {}, {}):\n\n{}",
        task.kind.level(),
        task.kind.as_str().replace('_', " "),
        task.prompt.trim()
    )];

    if !task.options.is_empty() {
        let options: Vec<String> = task
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| format!("Option {}: {}", i + 1, option))
            .collect();
        sections.push(format!("Options:\n{}", options.join("\n")));
    }

    if !task.parameters.is_empty() {
        let parameters: Vec<String> = task
            .parameters
            .iter()
            .map(|(name, value)| format!("{} = {}", name, value))
            .collect();
        sections.push(format!("Given:\n{}", bullet_list(&parameters)));
    }

    if !task.objectives.is_empty() {
        sections.push(format!("Objectives:\n{}", bullet_list(&task.objectives)));
    }
    if !task.constraints.is_empty() {
        sections.push(format!("Constraints:\n{}", bullet_list(&task.constraints)));
    }

    sections.push(TOOLS.trim_end().to_string());
    sections.push(format!("Final answer: {}", output_contract(task.kind)));
    sections.join("\n\n")
}

/// Sent once when a reply looked like an answer but lacked the required
/// structure.
pub fn repair_prompt(kind: TaskKind) -> String {
    format!(
        "Your last message could not be parsed. Reply again with the same content in the \
         required format.\n\n{}\n\nTo call a tool instead, wrap the action JSON in <json>...</json> tags.",
        output_contract(kind)
    )
}

/// Observation returned when a `respond` lacks a usable final answer.
pub fn final_answer_reminder(kind: TaskKind) -> String {
    format!(
        "Your response does not contain a final answer yet. {}",
        output_contract(kind)
    )
}

const STRUCTURE_KEYWORDS: &[&str] = &[
    "design",
    "rationale",
    "code",
    "json",
    "answer",
    "option",
    "result",
    "systemmetrics",
    "system_metrics",
    "kwargs",
];

/// Whether an unparseable reply seems to be attempting a structured answer.
///
/// A keyword sniff; it can misfire on unusual replies.
pub fn needs_repair(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    lower.contains('{') || STRUCTURE_KEYWORDS.iter().any(|k| lower.contains(k))
}
