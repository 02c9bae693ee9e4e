//! Error types for qa-forge operations.
//!
//! Defines error types for the major subsystems:
//! - Queue and sink storage
//! - LLM API interactions
//! - Team balance checks
//! - The QA training pipeline

use thiserror::Error;

/// Errors that can occur in the training queue and the persistence sinks.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid message format")]
    InvalidMessageFormat,

    #[error("Invalid stored value for '{field}': {value}")]
    InvalidValue { field: String, value: String },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("No model configured for QA generation")]
    MissingModel,

    /// The provider answered with an error body.
    ///
    /// `status` is the HTTP status; `code` is the numeric code carried in
    /// the error body, if any.
    #[error("API error ({status}): {message}")]
    ApiError {
        status: u16,
        code: Option<u16>,
        error_type: Option<String>,
        message: String,
    },
}

impl LlmError {
    /// Whether the provider produced a response at all (as opposed to a
    /// transport failure).
    pub fn has_response(&self) -> bool {
        matches!(self, LlmError::ApiError { .. } | LlmError::RateLimited(_))
    }
}

/// Errors returned by a balance authority.
#[derive(Debug, Error)]
pub enum BalanceError {
    #[error("Team '{team_id}' has insufficient balance")]
    Insufficient { team_id: String },

    #[error("Balance lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by a single run of the QA pipeline, tagged by stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Balance check failed: {0}")]
    Balance(#[source] BalanceError),

    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Pushing chunks failed: {0}")]
    Ingest(#[source] StoreError),

    #[error("Retiring task failed: {0}")]
    Retire(#[source] StoreError),
}
