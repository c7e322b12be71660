//! Error types for mecheval operations.
//!
//! Defines error types for the subsystems that can fail outward:
//! - LLM API interactions (judge calls)
//! - Target agent transport
//! - Conversation driving (protocol violations)
//! - Task file loading
//! - Configuration loading and validation
//! - Report reading and writing
//!
//! Extraction, sandbox execution, scoring and statistics never fail outward
//! and therefore have no entries here.

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: MECHEVAL_JUDGE_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the transport to the agent under evaluation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request to target failed: {0}")]
    RequestFailed(String),

    #[error("Target returned HTTP {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Target returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed reply from target: {0}")]
    MalformedReply(String),

    #[error("Target at '{url}' not ready after {attempts} attempts")]
    NotReady { url: String, attempts: u32 },
}

/// Errors that abort a single conversation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Protocol violation: context id changed from '{expected}' to '{actual}'")]
    ContextChanged { expected: String, actual: String },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Errors that can occur while loading task instances.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Unsupported task file extension '{0}': expected .json, .yaml or .yml")]
    UnsupportedFormat(String),

    #[error("Invalid task '{id}': {reason}")]
    Invalid { id: String, reason: String },

    #[error("Duplicate task instance id '{0}'")]
    DuplicateId(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse material database '{path}': {message}")]
    Materials { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors that can occur while reading or writing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Malformed report line {line}: {message}")]
    MalformedLine { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
