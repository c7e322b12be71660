//! LLM integration used by the judged grader.
//!
//! ```ignore
//! use mecheval::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_config(&config.judge)?;
//! let request = GenerationRequest::new("", vec![Message::user("Rate this answer")])
//!     .with_json_response();
//! let response = client.generate(request).await?;
//! ```

pub mod litellm;

pub use litellm::{
    Choice, GenerationRequest, GenerationResponse, LiteLlmClient, LlmProvider, Message,
    ResponseFormat, Usage, DEFAULT_API_BASE,
};
