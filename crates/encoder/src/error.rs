use std::path::PathBuf;
use thiserror::Error;

/// Why an encode run did not produce a slide
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Invalid slide source path provided: {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    #[error("Failed to create an Iris encoder for {}", source_path.display())]
    CreationFailed { source_path: PathBuf },

    #[error("Failed to dispatch encoder: {message}")]
    DispatchFailed { message: String },

    #[error("Error during encoding progress check: {message}")]
    PollFailed { message: String },

    #[error("Error during final progress check: {message}")]
    FinalCheckFailed { message: String },

    /// Engine reported terminal failure; the message is the engine's, verbatim
    #[error("{message}")]
    EncodingFailed { message: String },

    #[error("Encoding cancelled")]
    Cancelled,
}

/// Fieldless discriminant of [`EncodeError`], for callers that only branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidSource,
    CreationFailed,
    DispatchFailed,
    PollFailed,
    FinalCheckFailed,
    EncodingFailed,
    Cancelled,
}

impl EncodeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EncodeError::InvalidSource { .. } => ErrorKind::InvalidSource,
            EncodeError::CreationFailed { .. } => ErrorKind::CreationFailed,
            EncodeError::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            EncodeError::PollFailed { .. } => ErrorKind::PollFailed,
            EncodeError::FinalCheckFailed { .. } => ErrorKind::FinalCheckFailed,
            EncodeError::EncodingFailed { .. } => ErrorKind::EncodingFailed,
            EncodeError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
