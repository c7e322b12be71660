//! Runtime values and errors of the sandbox language.

use serde_json::{Number, Value};
use std::fmt;
use thiserror::Error;

/// Error categories, named after their Python counterparts so that targets
/// recognise them in observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptErrorKind {
    SyntaxError,
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    ImportError,
    AttributeError,
    IndexError,
}

impl fmt::Display for ScriptErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptErrorKind::SyntaxError => "SyntaxError",
            ScriptErrorKind::NameError => "NameError",
            ScriptErrorKind::TypeError => "TypeError",
            ScriptErrorKind::ValueError => "ValueError",
            ScriptErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ScriptErrorKind::ImportError => "ImportError",
            ScriptErrorKind::AttributeError => "AttributeError",
            ScriptErrorKind::IndexError => "IndexError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub message: String,
    pub line: Option<usize>,
}

impl ScriptError {
    pub fn new(kind: ScriptErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    /// Attaches a line number unless one is already set.
    pub fn at_line(mut self, line: usize) -> Self {
        self.line.get_or_insert(line);
        self
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ScriptErrorKind::ValueError, message)
    }

    /// Renders the error with its line, as shown to targets and graders.
    pub fn render(&self) -> String {
        match self.line {
            Some(line) => format!("{} (line {})", self, line),
            None => self.to_string(),
        }
    }
}

/// Library handles available to snippets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Math,
    Numpy,
}

impl Library {
    /// Resolves an importable module name.
    pub fn from_module(name: &str) -> Option<Self> {
        match name {
            "math" => Some(Library::Math),
            "numpy" => Some(Library::Numpy),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Library::Math => "math",
            Library::Numpy => "numpy",
        }
    }
}

/// A builtin or library function, identified by its canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtin(pub &'static str);

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ScriptValue>),
    Tuple(Vec<ScriptValue>),
    Module(Library),
    Function(Builtin),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::None => "NoneType",
            ScriptValue::Bool(_) => "bool",
            ScriptValue::Int(_) => "int",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "str",
            ScriptValue::List(_) => "list",
            ScriptValue::Tuple(_) => "tuple",
            ScriptValue::Module(_) => "module",
            ScriptValue::Function(_) => "builtin_function",
        }
    }

    /// Whether the value is data, as opposed to a module or function handle.
    pub fn is_data(&self) -> bool {
        !matches!(self, ScriptValue::Module(_) | ScriptValue::Function(_))
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            ScriptValue::None => false,
            ScriptValue::Bool(b) => *b,
            ScriptValue::Int(i) => *i != 0,
            ScriptValue::Float(f) => *f != 0.0,
            ScriptValue::Str(s) => !s.is_empty(),
            ScriptValue::List(items) | ScriptValue::Tuple(items) => !items.is_empty(),
            ScriptValue::Module(_) | ScriptValue::Function(_) => true,
        }
    }

    /// Numeric view of the value; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScriptValue::Int(i) => Some(*i as f64),
            ScriptValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            ScriptValue::Bool(_) | ScriptValue::Int(_) | ScriptValue::Float(_)
        )
    }

    /// Converts an injected JSON value. Objects have no counterpart.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(ScriptValue::None),
            Value::Bool(b) => Some(ScriptValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(ScriptValue::Int(i)),
                None => n.as_f64().map(ScriptValue::Float),
            },
            Value::String(s) => Some(ScriptValue::Str(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(ScriptValue::from_json)
                .collect::<Option<Vec<_>>>()
                .map(ScriptValue::List),
            Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ScriptValue::None => Value::Null,
            ScriptValue::Bool(b) => Value::Bool(*b),
            ScriptValue::Int(i) => Value::Number((*i).into()),
            ScriptValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_float(*f))),
            ScriptValue::Str(s) => Value::String(s.clone()),
            ScriptValue::List(items) | ScriptValue::Tuple(items) => {
                Value::Array(items.iter().map(ScriptValue::to_json).collect())
            }
            ScriptValue::Module(_) | ScriptValue::Function(_) => Value::String(self.repr()),
        }
    }

    /// Python-style `repr`.
    pub fn repr(&self) -> String {
        match self {
            ScriptValue::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::None => f.write_str("None"),
            ScriptValue::Bool(true) => f.write_str("True"),
            ScriptValue::Bool(false) => f.write_str("False"),
            ScriptValue::Int(i) => write!(f, "{}", i),
            ScriptValue::Float(x) => f.write_str(&format_float(*x)),
            ScriptValue::Str(s) => f.write_str(s),
            ScriptValue::List(items) => {
                let inner: Vec<String> = items.iter().map(ScriptValue::repr).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            ScriptValue::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(ScriptValue::repr).collect();
                if items.len() == 1 {
                    write!(f, "({},)", inner[0])
                } else {
                    write!(f, "({})", inner.join(", "))
                }
            }
            ScriptValue::Module(lib) => write!(f, "<module '{}'>", lib.name()),
            ScriptValue::Function(Builtin(name)) => write!(f, "<built-in function {}>", name),
        }
    }
}

/// Formats a float the way Python's `repr` does for common magnitudes.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == x.trunc() && x.abs() < 1e16 {
        return format!("{:.1}", x);
    }

    let debug = format!("{:?}", x);
    match debug.split_once('e') {
        Some((mantissa, exponent)) => {
            let exp: i32 = exponent.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exp.abs())
        }
        None => debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(500000.0), "500000.0");
        assert_eq!(format_float(0.0015), "0.0015");
        assert_eq!(format_float(1e-8), "1e-08");
        assert_eq!(format_float(f64::INFINITY), "inf");
        assert_eq!(format_float(-2.5), "-2.5");
    }

    #[test]
    fn test_display_collections() {
        let list = ScriptValue::List(vec![
            ScriptValue::Int(1),
            ScriptValue::Float(2.5),
            ScriptValue::Str("a".into()),
        ]);
        assert_eq!(list.to_string(), "[1, 2.5, 'a']");
        assert_eq!(
            ScriptValue::Tuple(vec![ScriptValue::Int(1)]).to_string(),
            "(1,)"
        );
    }

    #[test]
    fn test_json_round_trip_shapes() {
        let injected = json!([1, 2.5, "x", null, true]);
        let value = ScriptValue::from_json(&injected).unwrap();
        assert_eq!(value.to_json(), injected);
        assert!(ScriptValue::from_json(&json!({"a": 1})).is_none());
    }

    #[test]
    fn test_non_finite_to_json() {
        assert_eq!(ScriptValue::Float(f64::NAN).to_json(), json!("nan"));
    }

    #[test]
    fn test_error_render() {
        let err = ScriptError::new(ScriptErrorKind::NameError, "name 'x' is not defined")
            .at_line(3)
            .at_line(7);
        assert_eq!(err.render(), "NameError: name 'x' is not defined (line 3)");
    }
}
