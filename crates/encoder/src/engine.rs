use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Tile compression used by the encoding engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Encoding {
    Iris,
    #[default]
    Jpeg,
    Avif,
}

impl Encoding {
    /// Name understood by the encoder executable
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Iris => "IRIS",
            Encoding::Jpeg => "JPEG",
            Encoding::Avif => "AVIF",
        }
    }
}

/// Pixel byte ordering of the encoded tiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    #[serde(rename = "B8G8R8")]
    B8G8R8,
    #[default]
    #[serde(rename = "R8G8B8")]
    R8G8B8,
    #[serde(rename = "B8G8R8A8")]
    B8G8R8A8,
    #[serde(rename = "R8G8B8A8")]
    R8G8B8A8,
}

impl PixelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelFormat::B8G8R8 => "B8G8R8",
            PixelFormat::R8G8B8 => "R8G8B8",
            PixelFormat::B8G8R8A8 => "B8G8R8A8",
            PixelFormat::R8G8B8A8 => "R8G8B8A8",
        }
    }
}

/// Error returned when an encoding or pixel format name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what} \"{value}\" (expected one of: {expected})")]
pub struct ParseNameError {
    what: &'static str,
    value: String,
    expected: &'static str,
}

impl FromStr for Encoding {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IRIS" => Ok(Encoding::Iris),
            "JPEG" | "JPG" => Ok(Encoding::Jpeg),
            "AVIF" => Ok(Encoding::Avif),
            _ => Err(ParseNameError {
                what: "encoding",
                value: s.to_string(),
                expected: "IRIS, JPEG, AVIF",
            }),
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "B8G8R8" => Ok(PixelFormat::B8G8R8),
            "R8G8B8" => Ok(PixelFormat::R8G8B8),
            "B8G8R8A8" => Ok(PixelFormat::B8G8R8A8),
            "R8G8B8A8" => Ok(PixelFormat::R8G8B8A8),
            _ => Err(ParseNameError {
                what: "pixel format",
                value: s.to_string(),
                expected: "B8G8R8, R8G8B8, B8G8R8A8, R8G8B8A8",
            }),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to one submitted encode job.
///
/// Deliberately neither `Clone` nor `Copy`: whoever holds the handle owns the job.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct JobHandle {
    id: Uuid,
}

impl JobHandle {
    /// Mint a fresh handle. Only engines should call this.
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Outcome of a single engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub ok: bool,
    pub message: String,
}

impl OperationResult {
    pub fn success() -> Self {
        Self { ok: true, message: String::new() }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { ok: false, message: message.into() }
    }
}

/// Status reported by the engine for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncoderStatus {
    Active,
    Complete,
    Error,
}

/// One polled snapshot of a job
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub status: EncoderStatus,
    /// Fraction complete in [0.0, 1.0]
    pub progress: f32,
    pub error_message: Option<String>,
}

impl ProgressSample {
    pub fn active(progress: f32) -> Self {
        Self { status: EncoderStatus::Active, progress, error_message: None }
    }

    pub fn complete() -> Self {
        Self { status: EncoderStatus::Complete, progress: 1.0, error_message: None }
    }

    pub fn error(progress: f32, message: impl Into<String>) -> Self {
        Self {
            status: EncoderStatus::Error,
            progress,
            error_message: Some(message.into()),
        }
    }
}

/// Parameters handed to the engine when a job is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInfo {
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub encoding: Encoding,
    pub pixel_format: PixelFormat,
    pub strip_metadata: bool,
}

/// The external encoding engine.
///
/// Jobs run asynchronously inside the engine; every call here is expected to
/// return promptly.
pub trait Engine {
    /// Create a job without starting it. `None` means the engine refused.
    fn create_encoder(&mut self, info: &CreateInfo) -> Option<JobHandle>;

    /// Start a created job.
    fn dispatch(&mut self, job: &JobHandle) -> OperationResult;

    /// Current status and progress of a job.
    fn poll_progress(&mut self, job: &JobHandle) -> (OperationResult, ProgressSample);

    /// Stop a job. Best-effort.
    fn interrupt(&mut self, job: &JobHandle) -> OperationResult;

    /// The caller is done with a stopped job; the engine may free what it kept for it.
    fn release(&mut self, _job: &JobHandle) {}
}

impl<E: Engine + ?Sized> Engine for &mut E {
    fn create_encoder(&mut self, info: &CreateInfo) -> Option<JobHandle> {
        (**self).create_encoder(info)
    }

    fn dispatch(&mut self, job: &JobHandle) -> OperationResult {
        (**self).dispatch(job)
    }

    fn poll_progress(&mut self, job: &JobHandle) -> (OperationResult, ProgressSample) {
        (**self).poll_progress(job)
    }

    fn interrupt(&mut self, job: &JobHandle) -> OperationResult {
        (**self).interrupt(job)
    }

    fn release(&mut self, job: &JobHandle) {
        (**self).release(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_parse_is_case_insensitive() {
        assert_eq!("jpeg".parse::<Encoding>().unwrap(), Encoding::Jpeg);
        assert_eq!("Avif".parse::<Encoding>().unwrap(), Encoding::Avif);
        assert_eq!("IRIS".parse::<Encoding>().unwrap(), Encoding::Iris);
    }

    #[test]
    fn test_unknown_encoding_names_the_value() {
        let err = "webp".parse::<Encoding>().unwrap_err();
        assert!(err.to_string().contains("\"webp\""));
    }

    #[test]
    fn test_pixel_format_round_trips_through_display() {
        for format in [
            PixelFormat::B8G8R8,
            PixelFormat::R8G8B8,
            PixelFormat::B8G8R8A8,
            PixelFormat::R8G8B8A8,
        ] {
            assert_eq!(format.to_string().parse::<PixelFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_defaults_match_encoder_defaults() {
        assert_eq!(Encoding::default(), Encoding::Jpeg);
        assert_eq!(PixelFormat::default(), PixelFormat::R8G8B8);
    }

    #[test]
    fn test_handles_are_unique() {
        assert_ne!(JobHandle::new(), JobHandle::new());
    }
}
