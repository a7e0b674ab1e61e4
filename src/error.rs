//! Error types for the note splitter

use std::fmt;

/// Custom error type for take segmentation and sample export
#[derive(Debug, Clone)]
pub enum SplitError {
    /// E001: Invalid audio format (e.g., compressed WAV, >32-bit samples)
    InvalidAudioFormat(String),
    /// E002: Unsupported sample rate
    UnsupportedSampleRate(u32),
    /// E003: Configuration validation failed
    ConfigValidationFailed(String),
    /// E004: Audio file I/O error
    AudioFileError(String),
    /// E005: Read or seek outside the sample stream
    StreamReadError { frame: usize, total: usize },
    /// E006: No quiet, flat point between the search floor and the trigger
    OnsetNotFound {
        trigger: usize,
        floor: usize,
        threshold_db: f32,
    },
    /// E007: Sample, log or report export error
    ExportError(String),
    /// E008: Input validation error
    InputValidationError(String),
    /// E009: Processing pipeline error
    ProcessingPipelineError(String),
    /// E010: No positive-slope zero crossing between the search floor and the trigger
    ZeroCrossingNotFound { trigger: usize, floor: usize },
}

impl SplitError {
    /// Whether this error aborts the current take only (a batch may continue).
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            SplitError::OnsetNotFound { .. }
                | SplitError::ZeroCrossingNotFound { .. }
                | SplitError::StreamReadError { .. }
        )
    }
}

impl fmt::Display for SplitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitError::InvalidAudioFormat(msg) => {
                write!(f, "E001: Invalid audio format - {}", msg)
            }
            SplitError::UnsupportedSampleRate(sr) => {
                write!(f, "E002: Unsupported sample rate {} Hz", sr)
            }
            SplitError::ConfigValidationFailed(msg) => {
                write!(f, "E003: Configuration validation failed - {}", msg)
            }
            SplitError::AudioFileError(msg) => {
                write!(f, "E004: Audio file I/O error - {}", msg)
            }
            SplitError::StreamReadError { frame, total } => {
                write!(
                    f,
                    "E005: Stream read error at frame {} (stream has {} frames)",
                    frame, total
                )
            }
            SplitError::OnsetNotFound {
                trigger,
                floor,
                threshold_db,
            } => {
                write!(
                    f,
                    "E006: Can't find start of note - no quiet point below {:.1} dB in frames {}..{}",
                    threshold_db, floor, trigger
                )
            }
            SplitError::ExportError(msg) => {
                write!(f, "E007: Export error - {}", msg)
            }
            SplitError::InputValidationError(msg) => {
                write!(f, "E008: Input validation error - {}", msg)
            }
            SplitError::ProcessingPipelineError(msg) => {
                write!(f, "E009: Processing pipeline error - {}", msg)
            }
            SplitError::ZeroCrossingNotFound { trigger, floor } => {
                write!(
                    f,
                    "E010: No zero crossing with positive slope in frames {}..{}",
                    floor, trigger
                )
            }
        }
    }
}

impl std::error::Error for SplitError {}

// From implementations for common error types
impl From<std::io::Error> for SplitError {
    fn from(err: std::io::Error) -> Self {
        SplitError::AudioFileError(format!("File I/O error: {}", err))
    }
}

impl From<hound::Error> for SplitError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(e) => SplitError::AudioFileError(e.to_string()),
            hound::Error::Unsupported => {
                SplitError::InvalidAudioFormat("Compressed or unsupported WAV encoding".to_string())
            }
            other => SplitError::InvalidAudioFormat(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SplitError {
    fn from(err: serde_json::Error) -> Self {
        SplitError::ExportError(format!("JSON serialization error: {}", err))
    }
}

impl From<anyhow::Error> for SplitError {
    fn from(err: anyhow::Error) -> Self {
        SplitError::ProcessingPipelineError(format!("Generic error: {}", err))
    }
}

/// Result type alias for note splitter operations
pub type Result<T> = std::result::Result<T, SplitError>;
