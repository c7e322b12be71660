//! Tree-walking evaluator for parsed snippets.

use std::collections::HashMap;

use super::builtins::{self, MAX_SEQUENCE_LEN};
use super::parser::{BinaryOp, CompareOp, Expr, FStringPart, Statement, Stmt, Target, UnaryOp};
use super::value::{format_float, Library, ScriptError, ScriptErrorKind, ScriptValue};

/// Variable bindings in first-declaration order.
///
/// Rebinding a name keeps its original position, matching how the target's
/// own runtime orders its globals.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    entries: Vec<(String, ScriptValue)>,
    index: HashMap<String, usize>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn set(&mut self, name: impl Into<String>, value: ScriptValue) {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Bindings in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScriptValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

pub struct Interpreter<'a> {
    namespace: &'a mut Namespace,
    stdout: &'a mut String,
}

impl<'a> Interpreter<'a> {
    pub fn new(namespace: &'a mut Namespace, stdout: &'a mut String) -> Self {
        Self { namespace, stdout }
    }

    /// Runs every statement; returns the value of the final statement when it
    /// is a bare expression.
    pub fn run(&mut self, program: &[Statement]) -> Result<Option<ScriptValue>, ScriptError> {
        let mut last = None;
        for statement in program {
            last = self
                .exec(&statement.stmt)
                .map_err(|e| e.at_line(statement.line))?;
        }
        Ok(last)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Option<ScriptValue>, ScriptError> {
        match stmt {
            Stmt::Expr(expr) => self.eval(expr).map(Some),
            Stmt::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(None)
            }
            Stmt::AugAssign { name, op, value } => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let updated = binary_op(*op, &current, &rhs)?;
                self.namespace.set(name.clone(), updated);
                Ok(None)
            }
            Stmt::Import { module, alias } => {
                let library = import_library(module)?;
                let bound = alias.clone().unwrap_or_else(|| module.clone());
                self.namespace.set(bound, ScriptValue::Module(library));
                Ok(None)
            }
            Stmt::FromImport { module, names } => {
                let library = import_library(module)?;
                for (name, alias) in names {
                    if name == "*" {
                        for exported in builtins::exported_names(library) {
                            if let Some(value) = builtins::attribute(library, exported) {
                                self.namespace.set(exported, value);
                            }
                        }
                        continue;
                    }
                    let value = builtins::attribute(library, name).ok_or_else(|| {
                        ScriptError::new(
                            ScriptErrorKind::ImportError,
                            format!("cannot import name '{}' from '{}'", name, module),
                        )
                    })?;
                    self.namespace
                        .set(alias.clone().unwrap_or_else(|| name.clone()), value);
                }
                Ok(None)
            }
            Stmt::Pass => Ok(None),
        }
    }

    fn assign(&mut self, target: &Target, value: ScriptValue) -> Result<(), ScriptError> {
        match target {
            Target::Name(name) => {
                self.namespace.set(name.clone(), value);
                Ok(())
            }
            Target::Unpack(names) => {
                let items = match value {
                    ScriptValue::List(items) | ScriptValue::Tuple(items) => items,
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "cannot unpack non-iterable {} object",
                            other.type_name()
                        )))
                    }
                };
                if items.len() != names.len() {
                    return Err(ScriptError::value_error(format!(
                        "expected {} values to unpack, got {}",
                        names.len(),
                        items.len()
                    )));
                }
                for (name, item) in names.iter().zip(items) {
                    self.namespace.set(name.clone(), item);
                }
                Ok(())
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<ScriptValue, ScriptError> {
        if let Some(value) = self.namespace.get(name) {
            return Ok(value.clone());
        }
        builtins::global(name).ok_or_else(|| {
            ScriptError::new(
                ScriptErrorKind::NameError,
                format!("name '{}' is not defined", name),
            )
        })
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<ScriptValue, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.lookup(name),
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => out.push_str(text),
                        FStringPart::Field { expr, spec } => {
                            let value = self.eval(expr)?;
                            out.push_str(&format_value(&value, spec.as_deref())?);
                        }
                    }
                }
                Ok(ScriptValue::Str(out))
            }
            Expr::List(items) => Ok(ScriptValue::List(self.eval_all(items)?)),
            Expr::Tuple(items) => Ok(ScriptValue::Tuple(self.eval_all(items)?)),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                unary_op(*op, &value)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary_op(*op, &left, &right)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, right) in rest {
                    let right = self.eval(right)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(ScriptValue::Bool(false));
                    }
                    left = right;
                }
                Ok(ScriptValue::Bool(true))
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Conditional { test, body, orelse } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Call { func, args, kwargs } => {
                let callee = self.eval(func)?;
                let ScriptValue::Function(builtin) = callee else {
                    return Err(ScriptError::type_error(format!(
                        "'{}' object is not callable",
                        callee.type_name()
                    )));
                };
                let args = self.eval_all(args)?;
                let mut evaluated = Vec::with_capacity(kwargs.len());
                for (name, value) in kwargs {
                    evaluated.push((name.clone(), self.eval(value)?));
                }
                builtins::call(builtin, args, evaluated, self.stdout)
            }
            Expr::Attribute { value, attr } => match self.eval(value)? {
                ScriptValue::Module(library) => {
                    builtins::attribute(library, attr).ok_or_else(|| {
                        ScriptError::new(
                            ScriptErrorKind::AttributeError,
                            format!(
                                "module '{}' has no attribute '{}' in the sandbox",
                                library.name(),
                                attr
                            ),
                        )
                    })
                }
                other => Err(ScriptError::new(
                    ScriptErrorKind::AttributeError,
                    format!(
                        "'{}' object has no attribute '{}'",
                        other.type_name(),
                        attr
                    ),
                )),
            },
            Expr::Index { value, index } => {
                let container = self.eval(value)?;
                let index = self.eval(index)?;
                index_value(&container, &index)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<ScriptValue>, ScriptError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }
}

fn import_library(module: &str) -> Result<Library, ScriptError> {
    Library::from_module(module).ok_or_else(|| {
        ScriptError::new(
            ScriptErrorKind::ImportError,
            format!("module '{}' is not available in the sandbox", module),
        )
    })
}

fn unary_op(op: UnaryOp, value: &ScriptValue) -> Result<ScriptValue, ScriptError> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(ScriptValue::Bool(!v.is_truthy())),
        (UnaryOp::Neg, ScriptValue::Int(i)) => Ok(i
            .checked_neg()
            .map(ScriptValue::Int)
            .unwrap_or(ScriptValue::Float(-(*i as f64)))),
        (UnaryOp::Neg, ScriptValue::Bool(b)) => Ok(ScriptValue::Int(-(*b as i64))),
        (UnaryOp::Neg, ScriptValue::Float(f)) => Ok(ScriptValue::Float(-f)),
        (UnaryOp::Pos, ScriptValue::Bool(b)) => Ok(ScriptValue::Int(*b as i64)),
        (UnaryOp::Pos, v @ (ScriptValue::Int(_) | ScriptValue::Float(_))) => Ok(v.clone()),
        (_, v) => Err(ScriptError::type_error(format!(
            "bad operand type for unary operator: '{}'",
            v.type_name()
        ))),
    }
}

fn as_int(value: &ScriptValue) -> Option<i64> {
    match value {
        ScriptValue::Int(i) => Some(*i),
        ScriptValue::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn zero_division(what: &str) -> ScriptError {
    ScriptError::new(ScriptErrorKind::ZeroDivisionError, what.to_string())
}

/// Applies a binary operator with Python numeric semantics.
pub fn binary_op(
    op: BinaryOp,
    left: &ScriptValue,
    right: &ScriptValue,
) -> Result<ScriptValue, ScriptError> {
    if let (Some(a), Some(b)) = (as_int(left), as_int(right)) {
        return int_op(op, a, b);
    }
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return float_op(op, a, b);
    }

    match (op, left, right) {
        (BinaryOp::Add, ScriptValue::Str(a), ScriptValue::Str(b)) => {
            Ok(ScriptValue::Str(format!("{}{}", a, b)))
        }
        (BinaryOp::Add, ScriptValue::List(a), ScriptValue::List(b)) => {
            Ok(ScriptValue::List(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Add, ScriptValue::Tuple(a), ScriptValue::Tuple(b)) => {
            Ok(ScriptValue::Tuple(a.iter().chain(b).cloned().collect()))
        }
        (BinaryOp::Mul, seq, n) | (BinaryOp::Mul, n, seq) if as_int(n).is_some() => {
            repeat(seq, as_int(n).unwrap_or(0))
        }
        _ => Err(ScriptError::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op_symbol(op),
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn repeat(seq: &ScriptValue, times: i64) -> Result<ScriptValue, ScriptError> {
    let times = times.max(0) as usize;
    let too_long = |len: usize| {
        len.checked_mul(times)
            .map_or(true, |total| total > MAX_SEQUENCE_LEN)
    };
    match seq {
        ScriptValue::Str(s) if !too_long(s.len()) => Ok(ScriptValue::Str(s.repeat(times))),
        ScriptValue::List(items) if !too_long(items.len()) => Ok(ScriptValue::List(
            items.iter().cloned().cycle().take(items.len() * times).collect(),
        )),
        ScriptValue::Str(_) | ScriptValue::List(_) => Err(ScriptError::value_error(
            "sequence repetition exceeds the sandbox size limit",
        )),
        other => Err(ScriptError::type_error(format!(
            "can't multiply sequence of type '{}'",
            other.type_name()
        ))),
    }
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> Result<ScriptValue, ScriptError> {
    let checked = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div => {
            if b == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(ScriptValue::Float(a as f64 / b as f64));
        }
        BinaryOp::FloorDiv => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_div(b).map(|q| {
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    q - 1
                } else {
                    q
                }
            })
        }
        BinaryOp::Mod => {
            if b == 0 {
                return Err(zero_division("integer division or modulo by zero"));
            }
            a.checked_rem(b).map(|r| if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
        }
        BinaryOp::Pow => {
            if b < 0 {
                return float_op(op, a as f64, b as f64);
            }
            u32::try_from(b).ok().and_then(|e| a.checked_pow(e))
        }
    };
    match checked {
        Some(value) => Ok(ScriptValue::Int(value)),
        None => float_op(op, a as f64, b as f64),
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<ScriptValue, ScriptError> {
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(zero_division("float division by zero"));
            }
            a / b
        }
        BinaryOp::FloorDiv => {
            if b == 0.0 {
                return Err(zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinaryOp::Mod => {
            if b == 0.0 {
                return Err(zero_division("float modulo"));
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
        BinaryOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ScriptError::value_error(
                    "negative number raised to a fractional power has a complex result",
                ));
            }
            a.powf(b)
        }
    };
    Ok(ScriptValue::Float(value))
}

fn compare(op: CompareOp, left: &ScriptValue, right: &ScriptValue) -> Result<bool, ScriptError> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return Ok(match op {
            CompareOp::Eq => a == b,
            CompareOp::NotEq => a != b,
            CompareOp::Lt => a < b,
            CompareOp::LtE => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::GtE => a >= b,
        });
    }
    match (op, left, right) {
        (CompareOp::Eq, l, r) => Ok(l == r),
        (CompareOp::NotEq, l, r) => Ok(l != r),
        (_, ScriptValue::Str(a), ScriptValue::Str(b)) => Ok(match op {
            CompareOp::Lt => a < b,
            CompareOp::LtE => a <= b,
            CompareOp::Gt => a > b,
            _ => a >= b,
        }),
        _ => Err(ScriptError::type_error(format!(
            "comparison not supported between instances of '{}' and '{}'",
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn index_value(container: &ScriptValue, index: &ScriptValue) -> Result<ScriptValue, ScriptError> {
    let Some(i) = as_int(index) else {
        return Err(ScriptError::type_error(format!(
            "indices must be integers, not {}",
            index.type_name()
        )));
    };
    let resolve = |len: usize| -> Result<usize, ScriptError> {
        let len = len as i64;
        let pos = if i < 0 { i + len } else { i };
        if pos < 0 || pos >= len {
            Err(ScriptError::new(
                ScriptErrorKind::IndexError,
                "index out of range",
            ))
        } else {
            Ok(pos as usize)
        }
    };
    match container {
        ScriptValue::List(items) | ScriptValue::Tuple(items) => {
            Ok(items[resolve(items.len())?].clone())
        }
        ScriptValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(ScriptValue::Str(chars[resolve(chars.len())?].to_string()))
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Largest precision accepted in a format spec.
const MAX_FORMAT_PRECISION: usize = 100;

/// Applies an f-string format spec. Supports precision with `f`, `e`, `g`
/// and `%` types plus a `,` thousands separator; anything else falls back to
/// plain display.
fn format_value(value: &ScriptValue, spec: Option<&str>) -> Result<String, ScriptError> {
    let Some(spec) = spec else {
        return Ok(value.to_string());
    };
    let Some(x) = value.as_f64() else {
        return Ok(value.to_string());
    };

    let kind = spec.chars().last().filter(|c| c.is_ascii_alphabetic() || *c == '%');
    let body = match kind {
        Some(_) => &spec[..spec.len() - 1],
        None => spec,
    };
    let grouping = body.contains(',');
    let precision = body
        .split_once('.')
        .and_then(|(_, p)| p.trim_matches(',').parse::<usize>().ok());
    if precision.is_some_and(|p| p > MAX_FORMAT_PRECISION) {
        return Err(ScriptError::value_error(format!(
            "Format precision too large (maximum {})",
            MAX_FORMAT_PRECISION
        )));
    }

    let formatted = match kind {
        Some('f') | Some('F') => format!("{:.*}", precision.unwrap_or(6), x),
        Some('%') => format!("{:.*}%", precision.unwrap_or(6), x * 100.0),
        Some('e') | Some('E') => {
            let raw = format!("{:.*e}", precision.unwrap_or(6), x);
            let pythonic = match raw.split_once('e') {
                Some((mantissa, exp)) => {
                    let exp: i32 = exp.parse().unwrap_or(0);
                    let sign = if exp < 0 { '-' } else { '+' };
                    format!("{}e{}{:02}", mantissa, sign, exp.abs())
                }
                None => raw,
            };
            if kind == Some('E') {
                pythonic.to_uppercase()
            } else {
                pythonic
            }
        }
        Some('g') | Some('G') => format_general(x, precision.unwrap_or(6)),
        Some('d') => match value {
            ScriptValue::Int(i) => i.to_string(),
            _ => {
                return Err(ScriptError::value_error(
                    "Unknown format code 'd' for object of type 'float'",
                ))
            }
        },
        _ => match value {
            ScriptValue::Float(f) => format_float(*f),
            other => other.to_string(),
        },
    };

    Ok(if grouping {
        group_thousands(&formatted)
    } else {
        formatted
    })
}

fn format_general(x: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if x == 0.0 || !x.is_finite() {
        return format_float(x).trim_end_matches(".0").to_string();
    }
    let exponent = x.abs().log10().floor() as i32;
    if exponent < -4 || exponent >= precision as i32 {
        let raw = format!("{:.*e}", precision - 1, x);
        let Some((mantissa, exp)) = raw.split_once('e') else {
            return raw;
        };
        let mantissa = if mantissa.contains('.') {
            mantissa.trim_end_matches('0').trim_end_matches('.')
        } else {
            mantissa
        };
        let exp: i32 = exp.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        let raw = format!("{:.*}", decimals, x);
        if raw.contains('.') {
            raw.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            raw
        }
    }
}

fn group_thousands(number: &str) -> String {
    let (sign, rest) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };
    let (int_part, frac_part) = match rest.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}{}", sign, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::parser::parse_program;

    fn run(source: &str) -> (Namespace, String, Result<Option<ScriptValue>, ScriptError>) {
        let mut namespace = Namespace::new();
        let mut stdout = String::new();
        let program = parse_program(source).unwrap();
        let result = Interpreter::new(&mut namespace, &mut stdout).run(&program);
        (namespace, stdout, result)
    }

    fn eval(source: &str) -> ScriptValue {
        run(source).2.unwrap().unwrap()
    }

    #[test]
    fn test_arithmetic_semantics() {
        assert_eq!(eval("7 // 2"), ScriptValue::Int(3));
        assert_eq!(eval("-7 // 2"), ScriptValue::Int(-4));
        assert_eq!(eval("-7 % 3"), ScriptValue::Int(2));
        assert_eq!(eval("7 / 2"), ScriptValue::Float(3.5));
        assert_eq!(eval("2 ** 10"), ScriptValue::Int(1024));
        assert_eq!(eval("2 ** -1"), ScriptValue::Float(0.5));
        assert_eq!(eval("-2 ** 2"), ScriptValue::Int(-4));
        assert_eq!(eval("1 + 2.5"), ScriptValue::Float(3.5));
    }

    #[test]
    fn test_int_overflow_promotes_to_float() {
        assert!(matches!(eval("10 ** 30"), ScriptValue::Float(_)));
    }

    #[test]
    fn test_division_by_zero() {
        let (_, _, result) = run("x = 1 / 0");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::ZeroDivisionError);
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn test_chained_comparison_and_conditional() {
        assert_eq!(eval("1 < 2 < 3"), ScriptValue::Bool(true));
        assert_eq!(eval("1 < 3 < 2"), ScriptValue::Bool(false));
        assert_eq!(eval("'ok' if 2 > 1 else 'no'"), ScriptValue::Str("ok".into()));
    }

    #[test]
    fn test_imports_and_library_calls() {
        let (ns, _, result) = run("import numpy as np\nfrom math import sqrt\nx = np.sqrt(16) + sqrt(9)");
        result.unwrap();
        assert_eq!(ns.get("x"), Some(&ScriptValue::Float(7.0)));
    }

    #[test]
    fn test_disallowed_import() {
        let (_, _, result) = run("import os");
        assert_eq!(result.unwrap_err().kind, ScriptErrorKind::ImportError);
    }

    #[test]
    fn test_unknown_attribute() {
        let (_, _, result) = run("import math\nmath.system('ls')");
        let err = result.unwrap_err();
        assert_eq!(err.kind, ScriptErrorKind::AttributeError);
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_print_and_fstring() {
        let (_, stdout, result) = run("d = 0.0015\nprint(f'deflection = {d:.2e} m')\nprint('n', 3)");
        result.unwrap();
        assert_eq!(stdout, "deflection = 1.50e-03 m\nn 3\n");
    }

    #[test]
    fn test_tuple_unpack_and_aug_assign() {
        let (ns, _, result) = run("a, b = 2, 3\na *= b");
        result.unwrap();
        assert_eq!(ns.get("a"), Some(&ScriptValue::Int(6)));
    }

    #[test]
    fn test_namespace_preserves_first_declaration_order() {
        let (ns, _, result) = run("a = 1\nb = 2\na = 3");
        result.unwrap();
        let names: Vec<&str> = ns.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_indexing() {
        assert_eq!(eval("[1, 2, 3][-1]"), ScriptValue::Int(3));
        let (_, _, result) = run("[1][5]");
        assert_eq!(result.unwrap_err().kind, ScriptErrorKind::IndexError);
    }

    #[test]
    fn test_sequence_repetition_limit() {
        let (_, _, result) = run("x = [0] * 10 ** 9");
        assert_eq!(result.unwrap_err().kind, ScriptErrorKind::ValueError);
    }

    #[test]
    fn test_format_specs() {
        let v = ScriptValue::Float(1234.5678);
        assert_eq!(format_value(&v, Some(".2f")).unwrap(), "1234.57");
        assert_eq!(format_value(&v, Some(",.1f")).unwrap(), "1,234.6");
        assert_eq!(format_value(&v, Some(".3g")).unwrap(), "1.23e+03");
        assert_eq!(format_value(&ScriptValue::Float(0.25), Some(".0%")).unwrap(), "25%");
        assert_eq!(format_general(0.000123, 6), "0.000123");
        assert!(format_value(&v, Some(".100f")).is_ok());
        for spec in [".70000f", ".101e", ".500g", ".200%"] {
            let err = format_value(&v, Some(spec)).unwrap_err();
            assert_eq!(err.kind, ScriptErrorKind::ValueError);
        }
    }
}
