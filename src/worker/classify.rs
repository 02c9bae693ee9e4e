//! Failure classification for the QA pipeline.

use crate::error::{LlmError, PipelineError, StoreError};

/// Error type reported by the completion API for malformed requests.
pub const INVALID_REQUEST_ERROR: &str = "invalid_request_error";

/// Error-body code the provider uses for account-level failures.
pub const ACCOUNT_ERROR_CODE: u16 = 500;

/// How a failed task is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retrying cannot help: the task is parked and the loop moves on.
    Permanent,
    /// The task keeps its lease and the loop retries after a delay.
    Transient,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Permanent => "permanent",
            FailureClass::Transient => "transient",
        }
    }
}

/// Classifies a pipeline failure.
///
/// Malformed messages, `invalid_request_error` responses and an error body
/// carrying code 500 (account-level errors) are permanent. A bare HTTP 500
/// without a body code is an upstream failure and stays transient.
pub fn classify(error: &PipelineError) -> FailureClass {
    match error {
        PipelineError::Llm(LlmError::ApiError {
            code,
            error_type,
            message,
            ..
        }) => {
            if *code == Some(ACCOUNT_ERROR_CODE)
                || error_type.as_deref() == Some(INVALID_REQUEST_ERROR)
                || is_invalid_message_format(message)
            {
                FailureClass::Permanent
            } else {
                FailureClass::Transient
            }
        }
        PipelineError::Ingest(StoreError::InvalidMessageFormat) => FailureClass::Permanent,
        _ => FailureClass::Transient,
    }
}

fn is_invalid_message_format(message: &str) -> bool {
    message == StoreError::InvalidMessageFormat.to_string()
}
