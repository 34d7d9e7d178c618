use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NoDestinationSelected,
    Timeout,
    Transport,
    Server,
    /// The request conflicts with existing server state; retrying cannot help.
    Conflict,
    Internal,
}

impl ErrorCode {
    /// Remote failures the user may clear by retrying the triggering action.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::Transport | Self::Server)
    }
}

/// User input rejected before anything leaves the current context.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Selected text is too short (minimum {min} characters)")]
    TextTooShort { len: usize, min: usize },
    #[error("Selected text is too long (maximum {max} characters)")]
    TextTooLong { len: usize, max: usize },
    #[error("Please enter a cabinet name")]
    EmptyCabinetName,
    #[error("Cabinet name must be {max} characters or less (got {len})")]
    CabinetNameTooLong { len: usize, max: usize },
    #[error("Please enter a search query")]
    EmptyQuery,
    #[error("Min length must be at least 1 and less than max length (got {min} and {max})")]
    InvalidBounds { min: usize, max: usize },
}

/// Error payload that crosses a context boundary for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub code: ErrorCode,
    pub message: String,
}

impl ReportedError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ValidationError> for ReportedError {
    fn from(value: ValidationError) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}
