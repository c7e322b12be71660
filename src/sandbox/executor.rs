//! Snippet execution with result inference and post-hoc timeout detection.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::interpreter::{Interpreter, Namespace};
use super::parser::{parse_expression, parse_program};
use super::value::{Library, ScriptError, ScriptValue};
use crate::metrics::MetricsCollector;
use crate::utils::cached_regex;

/// Library handles bound in every fresh namespace. Injected variables may not
/// use these names.
pub const RESERVED_NAMES: &[&str] = &["math", "np", "numpy"];

static PRINTED_NUMBER: OnceLock<Option<regex::Regex>> = OnceLock::new();

/// Variable a snippet assigns to state its answer explicitly.
pub const RESULT_VARIABLE: &str = "result";

/// Name fragments that mark a variable as the likely answer.
pub const RESULT_KEYWORDS: &[&str] = &[
    "result", "answer", "solution", "delta", "final", "output", "value",
];

/// Outcome of one execution. Failures are represented, never raised.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SandboxResult {
    pub value: Option<Value>,
    pub error: Option<String>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_seconds: f64,
}

impl SandboxResult {
    fn failed(error: String, stdout: String, elapsed: Duration) -> Self {
        Self {
            value: None,
            stderr: format!("Traceback (most recent call last):\n{}\n", error),
            error: Some(error),
            stdout,
            elapsed_seconds: elapsed.as_secs_f64(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// The inferred value as a finite number, if it is one.
    pub fn numeric_value(&self) -> Option<f64> {
        match self.value.as_ref()? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// The last number printed to stdout, for snippets that only print.
    pub fn last_stdout_number(&self) -> Option<f64> {
        let re = cached_regex(&PRINTED_NUMBER, r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?")?;
        re.find_iter(&self.stdout)
            .filter_map(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .last()
    }
}

/// Runs snippets against a namespace that persists until [`reset`].
///
/// This is a restricted interpreter, not a security boundary, and the
/// timeout is measured after the call returns.
///
/// [`reset`]: SandboxExecutor::reset
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    timeout: Duration,
    namespace: Namespace,
    injected: HashSet<String>,
    metrics: MetricsCollector,
}

impl SandboxExecutor {
    pub fn new(timeout: Duration) -> Self {
        let mut executor = Self {
            timeout,
            namespace: Namespace::new(),
            injected: HashSet::new(),
            metrics: MetricsCollector::new(),
        };
        executor.bind_libraries();
        executor
    }

    fn bind_libraries(&mut self) {
        self.namespace.set("math", ScriptValue::Module(Library::Math));
        self.namespace.set("np", ScriptValue::Module(Library::Numpy));
        self.namespace.set("numpy", ScriptValue::Module(Library::Numpy));
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Clears every variable, keeping only the library handles.
    pub fn reset(&mut self) {
        self.namespace.clear();
        self.injected.clear();
        self.bind_libraries();
    }

    pub fn variable(&self, name: &str) -> Option<&ScriptValue> {
        self.namespace.get(name)
    }

    /// Names defined by snippets or injection, in declaration order.
    pub fn variable_names(&self) -> Vec<String> {
        self.namespace
            .iter()
            .filter(|(name, value)| !RESERVED_NAMES.contains(name) && value.is_data())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Runs `code` with `injected` merged into the namespace.
    ///
    /// `timeout` overrides the executor default for this call only.
    pub fn execute(
        &mut self,
        code: &str,
        injected: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> SandboxResult {
        let budget = timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        let mut stdout = String::new();

        if let Some(reserved) = injected
            .keys()
            .find(|name| RESERVED_NAMES.contains(&name.as_str()))
        {
            let error = format!(
                "ValueError: injected variable '{}' collides with a reserved library name",
                reserved
            );
            self.metrics.record_sandbox_execution("error");
            return SandboxResult::failed(error, stdout, started.elapsed());
        }

        for (name, value) in injected {
            match ScriptValue::from_json(value) {
                Some(converted) => {
                    self.namespace.set(name.clone(), converted);
                    self.injected.insert(name.clone());
                }
                None => debug!(variable = %name, "Skipping non-scalar injected variable"),
            }
        }

        let before: HashMap<String, ScriptValue> = self
            .namespace
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();

        let outcome = parse_program(code).and_then(|program| {
            Interpreter::new(&mut self.namespace, &mut stdout).run(&program)
        });
        let elapsed = started.elapsed();

        let mut result = match outcome {
            Ok(last_expr) => SandboxResult {
                value: self.infer_result(&before, last_expr).map(|v| v.to_json()),
                error: None,
                stdout,
                stderr: String::new(),
                elapsed_seconds: elapsed.as_secs_f64(),
            },
            Err(e) => {
                debug!(error = %e.render(), "Sandbox snippet failed");
                SandboxResult::failed(e.render(), stdout, elapsed)
            }
        };

        if elapsed > budget {
            warn!(
                elapsed_secs = elapsed.as_secs_f64(),
                budget_secs = budget.as_secs_f64(),
                "Sandbox execution exceeded its time budget"
            );
            result.error = Some(format!(
                "Execution timeout after {} seconds",
                budget.as_secs_f64()
            ));
            self.metrics.record_sandbox_execution("timeout");
        } else {
            self.metrics
                .record_sandbox_execution(if result.is_ok() { "ok" } else { "error" });
        }

        result
    }

    /// Evaluates a single expression against a copy of the namespace.
    pub fn evaluate_expression(&self, expression: &str) -> Result<ScriptValue, ScriptError> {
        let expr = parse_expression(expression)?;
        let mut scratch = self.namespace.clone();
        let mut stdout = String::new();
        Interpreter::new(&mut scratch, &mut stdout).eval(&expr)
    }

    /// Picks the snippet's answer: the explicit result variable, then the
    /// trailing expression, then keyword-named variables, then the most recent
    /// variable.
    fn infer_result(
        &self,
        before: &HashMap<String, ScriptValue>,
        last_expr: Option<ScriptValue>,
    ) -> Option<ScriptValue> {
        let touched: Vec<(&str, &ScriptValue)> = self
            .namespace
            .iter()
            .filter(|(name, value)| {
                !RESERVED_NAMES.contains(name)
                    && !self.injected.contains(*name)
                    && value.is_data()
                    && before.get(*name) != Some(*value)
            })
            .collect();

        if let Some((_, value)) = touched.iter().find(|(name, _)| *name == RESULT_VARIABLE) {
            return Some((*value).clone());
        }

        if let Some(value) = last_expr.filter(|v| v.is_data() && *v != ScriptValue::None) {
            return Some(value);
        }

        let keyword_match = touched.iter().rev().find(|(name, _)| {
            let lower = name.to_lowercase();
            RESULT_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
        });
        if let Some((_, value)) = keyword_match {
            return Some((*value).clone());
        }

        touched.last().map(|(_, value)| (*value).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor() -> SandboxExecutor {
        SandboxExecutor::new(Duration::from_secs(30))
    }

    fn no_vars() -> Map<String, Value> {
        Map::new()
    }

    #[test]
    fn test_result_variable_beats_other_assignments() {
        let mut sandbox = executor();
        let result = sandbox.execute("x = 1\nresult = 42\ny = 3", &no_vars(), None);
        assert!(result.is_ok());
        assert_eq!(result.value, Some(json!(42)));
    }

    #[test]
    fn test_trailing_expression_is_the_value() {
        let mut sandbox = executor();
        let result = sandbox.execute("a = 2\nb = 3\na * b", &no_vars(), None);
        assert_eq!(result.numeric_value(), Some(6.0));
    }

    #[test]
    fn test_keyword_variable_preferred() {
        let mut sandbox = executor();
        let result = sandbox.execute("final_stress = 250.0\nscratch = 1", &no_vars(), None);
        assert_eq!(result.value, Some(json!(250.0)));
    }

    #[test]
    fn test_most_recent_variable_fallback() {
        let mut sandbox = executor();
        let result = sandbox.execute("a = 1\nb = 2", &no_vars(), None);
        assert_eq!(result.value, Some(json!(2)));
    }

    #[test]
    fn test_print_only_snippet_has_stdout_number() {
        let mut sandbox = executor();
        let result = sandbox.execute("print('sigma =', 120.5, 'MPa')", &no_vars(), None);
        assert!(result.is_ok());
        assert_eq!(result.value, None);
        assert_eq!(result.last_stdout_number(), Some(120.5));
    }

    #[test]
    fn test_oversized_format_precision_is_an_error() {
        let mut sandbox = executor();
        let result = sandbox.execute(
            "x = 1.5\nprint(f'{x:.70000f}')\nresult = 2",
            &no_vars(),
            None,
        );
        assert!(!result.is_ok());
        assert!(result
            .error
            .as_deref()
            .unwrap()
            .contains("Format precision too large"));

        let result = sandbox.execute("y = 1.5\nprint(f'{y:.3f}')", &no_vars(), None);
        assert!(result.is_ok());
        assert_eq!(result.stdout.trim(), "1.500");
    }

    #[test]
    fn test_injected_variables_are_visible_but_not_results() {
        let mut sandbox = executor();
        let mut vars = Map::new();
        vars.insert("load".into(), json!(1000.0));
        vars.insert("length".into(), json!(2.0));
        let result = sandbox.execute("moment = load * length / 4", &vars, None);
        assert_eq!(result.numeric_value(), Some(500.0));

        let result = sandbox.execute("pass", &vars, None);
        assert_eq!(result.value, None);
    }

    #[test]
    fn test_injected_reserved_name_rejected() {
        let mut sandbox = executor();
        let mut vars = Map::new();
        vars.insert("np".into(), json!(1));
        let result = sandbox.execute("x = 1", &vars, None);
        assert!(result.error.unwrap().contains("reserved"));
    }

    #[test]
    fn test_errors_are_captured() {
        let mut sandbox = executor();
        let result = sandbox.execute("x = 1\ny = undefined_name + 1", &no_vars(), None);
        assert_eq!(result.value, None);
        let error = result.error.unwrap();
        assert!(error.starts_with("NameError"));
        assert!(error.ends_with("(line 2)"));
        assert!(result.stderr.contains("Traceback"));

        let result = sandbox.execute("for i in range(3):\n    pass", &no_vars(), None);
        assert!(result.error.unwrap().starts_with("SyntaxError"));
    }

    #[test]
    fn test_timeout_is_detected_after_the_fact() {
        let mut sandbox = executor();
        let result = sandbox.execute("x = 1", &no_vars(), Some(Duration::ZERO));
        // Any measurable elapsed time exceeds a zero budget
        if result.elapsed_seconds > 0.0 {
            assert_eq!(
                result.error.as_deref(),
                Some("Execution timeout after 0 seconds")
            );
        }
    }

    #[test]
    fn test_namespace_persists_until_reset() {
        let mut sandbox = executor();
        sandbox.execute("E = 200e9", &no_vars(), None);
        let result = sandbox.execute("stress = E * 2", &no_vars(), None);
        assert_eq!(result.numeric_value(), Some(400e9));

        sandbox.reset();
        let result = sandbox.execute("E", &no_vars(), None);
        assert!(result.error.unwrap().contains("NameError"));
        assert!(sandbox.variable("np").is_some());
    }

    #[test]
    fn test_evaluate_expression_is_read_only() {
        let mut sandbox = executor();
        sandbox.execute("r = 0.05", &no_vars(), None);
        let area = sandbox.evaluate_expression("math.pi * r ** 2").unwrap();
        assert!((area.as_f64().unwrap() - 0.007853981633974483).abs() < 1e-12);
        assert_eq!(sandbox.variable_names(), vec!["r".to_string()]);
    }
}
