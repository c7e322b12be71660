//! Response Extraction Engine.
//!
//! Turns free-form target replies into typed answers and actions. Strategies
//! run in a fixed order (tag-delimited block, last fenced block, balanced
//! braces, nested-brace regex, free-text patterns, fallback) and the first
//! success wins. Extraction never fails; the strategy that produced a result
//! is kept with it for audit.
//!
//! # Example
//!
//! ```
//! use mecheval::extraction::{extract, ParsedAnswer};
//! use mecheval::task::TaskKind;
//!
//! let parsed = extract("...so the correct answer is Option 2.", TaskKind::MultipleChoice, 4);
//! assert_eq!(parsed.answer, ParsedAnswer::MultipleChoice { selected_option: Some(1) });
//! ```

pub mod engine;
pub mod free_text;
pub mod structured;
pub mod types;

pub use engine::{extract, extract_action, ExtractedAction, DESIGN_REQUIRED_KEY};
pub use types::{Action, ActionName, ExtractionStrategy, ParsedAnswer, ParsedResponse, KWARGS_KEYS};
