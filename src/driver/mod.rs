//! Conversation Driver.
//!
//! Sends the task prompt, turns every reply into an [`Action`], dispatches it
//! against the [`TaskEnvironment`] and decides when the instance ends. Format
//! problems are recovered with at most one repair prompt before the raw reply
//! is taken as the final answer; transport failures and context id changes
//! are fatal for the instance.
//!
//! [`Action`]: crate::extraction::Action

pub mod conversation;
pub mod environment;
pub mod materials;
pub mod prompts;
pub mod session;

pub use conversation::{ConversationDriver, DriverOutcome, DriverSummary, Termination};
pub use environment::{StepOutcome, TaskEnvironment};
pub use materials::{Material, MaterialDatabase};
pub use prompts::{final_answer_reminder, needs_repair, output_contract, repair_prompt, task_prompt};
pub use session::{ConversationSession, Speaker, Utterance};
