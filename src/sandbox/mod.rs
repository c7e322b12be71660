//! Sandbox Executor: runs untrusted numeric snippets in a restricted,
//! in-process scripting language with Python-compatible surface syntax.
//!
//! Only straight-line code is accepted (assignments, expressions, imports of
//! `math` and `numpy`), so snippets cannot loop forever. The namespace is a
//! best-effort restriction, not an isolation boundary.

pub mod builtins;
pub mod executor;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

pub use executor::{SandboxExecutor, SandboxResult, RESERVED_NAMES, RESULT_KEYWORDS, RESULT_VARIABLE};
pub use interpreter::Namespace;
pub use value::{ScriptError, ScriptErrorKind, ScriptValue};
