//! Builtin functions and library attributes.
//!
//! `math` and `numpy` share one function table; numpy-only helpers
//! (`array`, `mean`) resolve only through the numpy handle, and
//! element-wise application covers lists for the unary functions.

use super::value::{format_float, Builtin, Library, ScriptError, ScriptErrorKind, ScriptValue};
use std::f64::consts;

/// Upper bound on the captured stdout size.
pub const MAX_STDOUT_BYTES: usize = 1 << 20;

/// Upper bound on list and string sizes produced by repetition.
pub const MAX_SEQUENCE_LEN: usize = 1_000_000;

/// Builtins reachable without an import.
const GLOBAL_FUNCTIONS: &[&str] = &[
    "abs", "min", "max", "round", "pow", "sum", "len", "float", "int", "str", "print",
];

const MATH_FUNCTIONS: &[&str] = &[
    "sqrt", "exp", "log", "log10", "sin", "cos", "tan", "asin", "acos", "atan", "atan2",
    "radians", "degrees", "floor", "ceil", "pow",
];

const NUMPY_ONLY: &[&str] = &["array", "mean", "sum", "max", "min", "abs", "round"];

const CONSTANTS: &[(&str, f64)] = &[
    ("pi", consts::PI),
    ("e", consts::E),
    ("inf", f64::INFINITY),
    ("nan", f64::NAN),
];

/// Resolves a global builtin by name.
pub fn global(name: &str) -> Option<ScriptValue> {
    GLOBAL_FUNCTIONS
        .iter()
        .find(|f| **f == name)
        .map(|f| ScriptValue::Function(Builtin(*f)))
}

/// Resolves `library.attr`.
pub fn attribute(library: Library, attr: &str) -> Option<ScriptValue> {
    if let Some((_, value)) = CONSTANTS.iter().find(|(name, _)| *name == attr) {
        return Some(ScriptValue::Float(*value));
    }

    let canonical = match (library, attr) {
        (Library::Numpy, "arcsin") => "asin",
        (Library::Numpy, "arccos") => "acos",
        (Library::Numpy, "arctan") => "atan",
        (Library::Numpy, "arctan2") => "atan2",
        (Library::Numpy, "deg2rad") => "radians",
        (Library::Numpy, "rad2deg") => "degrees",
        (Library::Numpy, "power") => "pow",
        (_, other) => other,
    };

    let found = MATH_FUNCTIONS.iter().find(|f| **f == canonical).or_else(|| {
        if library == Library::Numpy {
            NUMPY_ONLY.iter().find(|f| **f == canonical)
        } else {
            None
        }
    })?;
    Some(ScriptValue::Function(Builtin(*found)))
}

/// Every importable name of a library, for `from lib import *`.
pub fn exported_names(library: Library) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CONSTANTS.iter().map(|(name, _)| *name).collect();
    names.extend(MATH_FUNCTIONS.iter().copied());
    if library == Library::Numpy {
        names.extend(NUMPY_ONLY.iter().copied());
    }
    names
}

/// Calls a builtin. `print` writes into `stdout`.
pub fn call(
    Builtin(name): Builtin,
    args: Vec<ScriptValue>,
    kwargs: Vec<(String, ScriptValue)>,
    stdout: &mut String,
) -> Result<ScriptValue, ScriptError> {
    if name == "print" {
        return print(args, kwargs, stdout);
    }
    if let Some((key, _)) = kwargs.iter().find(|(key, _)| !(name == "round" && key == "ndigits")) {
        return Err(ScriptError::type_error(format!(
            "{}() got an unexpected keyword argument '{}'",
            name, key
        )));
    }
    let mut args = args;
    args.extend(kwargs.into_iter().map(|(_, value)| value));

    match name {
        "sqrt" => unary(name, &args, |x| domain(x >= 0.0, x.sqrt())),
        "exp" => unary(name, &args, |x| Ok(x.exp())),
        "log10" => unary(name, &args, |x| domain(x > 0.0, x.log10())),
        "sin" => unary(name, &args, |x| Ok(x.sin())),
        "cos" => unary(name, &args, |x| Ok(x.cos())),
        "tan" => unary(name, &args, |x| Ok(x.tan())),
        "asin" => unary(name, &args, |x| domain((-1.0..=1.0).contains(&x), x.asin())),
        "acos" => unary(name, &args, |x| domain((-1.0..=1.0).contains(&x), x.acos())),
        "atan" => unary(name, &args, |x| Ok(x.atan())),
        "radians" => unary(name, &args, |x| Ok(x.to_radians())),
        "degrees" => unary(name, &args, |x| Ok(x.to_degrees())),
        "floor" => rounding(name, &args, f64::floor),
        "ceil" => rounding(name, &args, f64::ceil),
        "log" => log(&args),
        "atan2" => {
            let (y, x) = two_numbers(name, &args)?;
            Ok(ScriptValue::Float(y.atan2(x)))
        }
        "pow" => {
            expect_args(name, &args, 2)?;
            super::interpreter::binary_op(super::parser::BinaryOp::Pow, &args[0], &args[1])
        }
        "abs" => abs(&args),
        "round" => round(&args),
        "min" => extremum(name, args, |a, b| a < b),
        "max" => extremum(name, args, |a, b| a > b),
        "sum" => sum(&args),
        "mean" => mean(&args),
        "len" => {
            expect_args(name, &args, 1)?;
            match &args[0] {
                ScriptValue::Str(s) => Ok(ScriptValue::Int(s.chars().count() as i64)),
                ScriptValue::List(items) | ScriptValue::Tuple(items) => {
                    Ok(ScriptValue::Int(items.len() as i64))
                }
                other => Err(ScriptError::type_error(format!(
                    "object of type '{}' has no len()",
                    other.type_name()
                ))),
            }
        }
        "float" => to_float(&args),
        "int" => to_int(&args),
        "str" => {
            expect_args(name, &args, 1)?;
            Ok(ScriptValue::Str(args[0].to_string()))
        }
        "array" => {
            expect_args(name, &args, 1)?;
            match &args[0] {
                ScriptValue::Tuple(items) => Ok(ScriptValue::List(items.clone())),
                other => Ok(other.clone()),
            }
        }
        other => Err(ScriptError::new(
            ScriptErrorKind::NameError,
            format!("function '{}' is not available in the sandbox", other),
        )),
    }
}

fn print(
    args: Vec<ScriptValue>,
    kwargs: Vec<(String, ScriptValue)>,
    stdout: &mut String,
) -> Result<ScriptValue, ScriptError> {
    let mut sep = " ".to_string();
    let mut end = "\n".to_string();
    for (key, value) in kwargs {
        let text = match value {
            ScriptValue::Str(s) => s,
            ScriptValue::None => continue,
            other => {
                return Err(ScriptError::type_error(format!(
                    "{} must be None or a string, not {}",
                    key,
                    other.type_name()
                )))
            }
        };
        match key.as_str() {
            "sep" => sep = text,
            "end" => end = text,
            "flush" | "file" => {}
            other => {
                return Err(ScriptError::type_error(format!(
                    "print() got an unexpected keyword argument '{}'",
                    other
                )))
            }
        }
    }

    let line: Vec<String> = args.iter().map(ScriptValue::to_string).collect();
    if stdout.len() < MAX_STDOUT_BYTES {
        stdout.push_str(&line.join(&sep));
        stdout.push_str(&end);
        if stdout.len() > MAX_STDOUT_BYTES {
            let mut cut = MAX_STDOUT_BYTES;
            while !stdout.is_char_boundary(cut) {
                cut -= 1;
            }
            stdout.truncate(cut);
        }
    }
    Ok(ScriptValue::None)
}

fn expect_args(name: &str, args: &[ScriptValue], count: usize) -> Result<(), ScriptError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(ScriptError::type_error(format!(
            "{}() takes {} argument{} ({} given)",
            name,
            count,
            if count == 1 { "" } else { "s" },
            args.len()
        )))
    }
}

fn number(name: &str, value: &ScriptValue) -> Result<f64, ScriptError> {
    value.as_f64().ok_or_else(|| {
        ScriptError::type_error(format!(
            "{}() expects a number, not '{}'",
            name,
            value.type_name()
        ))
    })
}

fn two_numbers(name: &str, args: &[ScriptValue]) -> Result<(f64, f64), ScriptError> {
    expect_args(name, args, 2)?;
    Ok((number(name, &args[0])?, number(name, &args[1])?))
}

fn domain(ok: bool, value: f64) -> Result<f64, ScriptError> {
    if ok {
        Ok(value)
    } else {
        Err(ScriptError::value_error("math domain error"))
    }
}

/// Applies `f` to a number or element-wise to a list.
fn map_numeric<F>(name: &str, value: &ScriptValue, f: &F) -> Result<ScriptValue, ScriptError>
where
    F: Fn(f64) -> Result<ScriptValue, ScriptError>,
{
    match value {
        ScriptValue::List(items) | ScriptValue::Tuple(items) => items
            .iter()
            .map(|item| map_numeric(name, item, f))
            .collect::<Result<Vec<_>, _>>()
            .map(ScriptValue::List),
        other => f(number(name, other)?),
    }
}

fn unary<F>(name: &str, args: &[ScriptValue], f: F) -> Result<ScriptValue, ScriptError>
where
    F: Fn(f64) -> Result<f64, ScriptError>,
{
    expect_args(name, args, 1)?;
    map_numeric(name, &args[0], &|x| f(x).map(ScriptValue::Float))
}

fn rounding(name: &str, args: &[ScriptValue], f: fn(f64) -> f64) -> Result<ScriptValue, ScriptError> {
    expect_args(name, args, 1)?;
    map_numeric(name, &args[0], &|x| float_to_int(f(x)))
}

fn float_to_int(x: f64) -> Result<ScriptValue, ScriptError> {
    if !x.is_finite() {
        return Err(ScriptError::value_error(format!(
            "cannot convert float {} to integer",
            format_float(x)
        )));
    }
    if x.abs() < 9.2e18 {
        Ok(ScriptValue::Int(x as i64))
    } else {
        Ok(ScriptValue::Float(x))
    }
}

fn log(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match args {
        [x] => map_numeric("log", x, &|x| domain(x > 0.0, x.ln()).map(ScriptValue::Float)),
        [x, base] => {
            let base = number("log", base)?;
            if base <= 0.0 || base == 1.0 {
                return Err(ScriptError::value_error("math domain error"));
            }
            map_numeric("log", x, &|x| {
                domain(x > 0.0, x.ln() / base.ln()).map(ScriptValue::Float)
            })
        }
        _ => Err(ScriptError::type_error(format!(
            "log() takes 1 or 2 arguments ({} given)",
            args.len()
        ))),
    }
}

fn abs(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    expect_args("abs", args, 1)?;
    fn abs_value(value: &ScriptValue) -> Result<ScriptValue, ScriptError> {
        match value {
            ScriptValue::Int(i) => Ok(i
                .checked_abs()
                .map(ScriptValue::Int)
                .unwrap_or(ScriptValue::Float((*i as f64).abs()))),
            ScriptValue::Bool(b) => Ok(ScriptValue::Int(*b as i64)),
            ScriptValue::Float(f) => Ok(ScriptValue::Float(f.abs())),
            ScriptValue::List(items) | ScriptValue::Tuple(items) => items
                .iter()
                .map(abs_value)
                .collect::<Result<Vec<_>, _>>()
                .map(ScriptValue::List),
            other => Err(ScriptError::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        }
    }
    abs_value(&args[0])
}

fn round(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match args {
        [x] => match x {
            ScriptValue::Int(_) | ScriptValue::Bool(_) => Ok(x.clone()),
            other => float_to_int(number("round", other)?.round_ties_even()),
        },
        [x, digits] => {
            let digits = match digits {
                ScriptValue::Int(d) => *d,
                ScriptValue::None => return round(&args[..1]),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "'{}' object cannot be interpreted as an integer",
                        other.type_name()
                    )))
                }
            };
            if let ScriptValue::Int(_) = x {
                if digits >= 0 {
                    return Ok(x.clone());
                }
            }
            let value = number("round", x)?;
            // Beyond f64 precision rounding is the identity.
            if digits > 17 {
                return Ok(ScriptValue::Float(value));
            }
            if digits < -308 {
                return Ok(ScriptValue::Float(0.0_f64.copysign(value)));
            }
            let factor = 10f64.powi(digits as i32);
            Ok(ScriptValue::Float((value * factor).round_ties_even() / factor))
        }
        _ => Err(ScriptError::type_error(format!(
            "round() takes 1 or 2 arguments ({} given)",
            args.len()
        ))),
    }
}

/// Collects the operands of min/max/sum: a single iterable or the
/// arguments themselves.
fn operands(name: &str, args: Vec<ScriptValue>) -> Result<Vec<ScriptValue>, ScriptError> {
    let iterable = match args.as_slice() {
        [ScriptValue::List(items)] | [ScriptValue::Tuple(items)] => Some(items.clone()),
        [single] if !single.is_number() => {
            return Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                single.type_name()
            )))
        }
        _ => None,
    };
    let items = iterable.unwrap_or(args);
    if items.is_empty() {
        return Err(ScriptError::value_error(format!(
            "{}() arg is an empty sequence",
            name
        )));
    }
    Ok(items)
}

fn extremum(
    name: &str,
    args: Vec<ScriptValue>,
    better: fn(f64, f64) -> bool,
) -> Result<ScriptValue, ScriptError> {
    let items = operands(name, args)?;
    let mut best: Option<(f64, ScriptValue)> = None;
    for item in items {
        let x = number(name, &item)?;
        let replace = match &best {
            None => true,
            Some((current, _)) => better(x, *current),
        };
        if replace {
            best = Some((x, item));
        }
    }
    best.map(|(_, item)| item)
        .ok_or_else(|| ScriptError::value_error(format!("{}() arg is an empty sequence", name)))
}

fn sum(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    let (iterable, start) = match args {
        [iterable] => (iterable, ScriptValue::Int(0)),
        [iterable, start] => (iterable, start.clone()),
        _ => {
            return Err(ScriptError::type_error(format!(
                "sum() takes 1 or 2 arguments ({} given)",
                args.len()
            )))
        }
    };
    let items = match iterable {
        ScriptValue::List(items) | ScriptValue::Tuple(items) => items,
        other => {
            return Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            )))
        }
    };
    items.iter().try_fold(start, |acc, item| {
        super::interpreter::binary_op(super::parser::BinaryOp::Add, &acc, item)
    })
}

fn mean(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    expect_args("mean", args, 1)?;
    let items = match &args[0] {
        ScriptValue::List(items) | ScriptValue::Tuple(items) => items.clone(),
        single => vec![single.clone()],
    };
    if items.is_empty() {
        return Ok(ScriptValue::Float(f64::NAN));
    }
    let total = items
        .iter()
        .map(|item| number("mean", item))
        .sum::<Result<f64, _>>()?;
    Ok(ScriptValue::Float(total / items.len() as f64))
}

fn to_float(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match args {
        [] => Ok(ScriptValue::Float(0.0)),
        [ScriptValue::Str(s)] => {
            let trimmed = s.trim().to_lowercase();
            let parsed = match trimmed.as_str() {
                "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                "nan" => Some(f64::NAN),
                _ => trimmed.parse::<f64>().ok(),
            };
            parsed.map(ScriptValue::Float).ok_or_else(|| {
                ScriptError::value_error(format!("could not convert string to float: '{}'", s))
            })
        }
        [value] => Ok(ScriptValue::Float(number("float", value)?)),
        _ => Err(ScriptError::type_error(format!(
            "float() takes at most 1 argument ({} given)",
            args.len()
        ))),
    }
}

fn to_int(args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match args {
        [] => Ok(ScriptValue::Int(0)),
        [ScriptValue::Str(s)] => s.trim().parse::<i64>().map(ScriptValue::Int).map_err(|_| {
            ScriptError::value_error(format!("invalid literal for int() with base 10: '{}'", s))
        }),
        [value] => float_to_int(number("int", value)?.trunc()),
        _ => Err(ScriptError::type_error(format!(
            "int() takes at most 1 argument ({} given)",
            args.len()
        ))),
    }
}
