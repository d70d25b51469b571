//! FFmpeg Integration Module
//!
//! Provides the external decoder/encoder backend for the reverse-asset
//! pipeline:
//! - Media probing (duration, dimensions, frame rate) via ffprobe
//! - Time-reversed re-encoding with live progress parsing
//!
//! Uses a system-installed FFmpeg; detection checks an explicit override
//! first, then common install locations, then PATH.

mod detection;
mod runner;

pub use detection::*;
pub use runner::{
    EncodeSettings, FFmpegRunner, MediaInfo, ReverseEncoder, TranscodeProgress, VideoStreamInfo,
};

/// FFmpeg-related error types
#[derive(Debug, thiserror::Error)]
pub enum FFmpegError {
    #[error("FFmpeg not found. Please install FFmpeg and ensure it is on PATH.")]
    NotFound,

    #[error("FFmpeg execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Invalid input file: {0}")]
    InvalidInput(String),

    #[error("Output path error: {0}")]
    OutputError(String),

    #[error("FFprobe error: {0}")]
    ProbeError(String),

    #[error("Process error: {0}")]
    ProcessError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type FFmpegResult<T> = Result<T, FFmpegError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FFmpegError::NotFound;
        assert!(err.to_string().contains("FFmpeg not found"));

        let err = FFmpegError::ExecutionFailed("exit code 1".to_string());
        assert!(err.to_string().contains("exit code 1"));
    }
}
