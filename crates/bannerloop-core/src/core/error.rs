//! BannerLoop Error Definitions
//!
//! Defines error types used throughout the engine.
//!
//! Propagation policy: only ingestion errors are synchronous and blocking.
//! Transcode failures are delivered through the event surface and leave the
//! asset usable in forward/loop mode; cleanup failures are logged warnings
//! and never reach callers.

use thiserror::Error;

use super::ffmpeg::FFmpegError;
use super::{AssetId, JobId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Asset Errors
    // =========================================================================
    #[error("Asset not found: {0}")]
    AssetNotFound(AssetId),

    #[error("Asset limit reached: at most {0} clips per session")]
    AssetLimitReached(usize),

    #[error("Failed to persist uploaded bytes: {0}")]
    IngestionFailed(String),

    // =========================================================================
    // Job Errors
    // =========================================================================
    #[error("A conversion job is already running for asset: {0}")]
    JobAlreadyRunning(AssetId),

    #[error("Conversion job not found: {0}")]
    JobNotFound(JobId),

    #[error("Reverse transcode failed: {0}")]
    TranscodeFailed(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(#[from] FFmpegError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_detail() {
        let err = CoreError::JobAlreadyRunning("asset_001".to_string());
        assert!(err.to_string().contains("asset_001"));

        let err = CoreError::AssetLimitReached(3);
        assert!(err.to_string().contains('3'));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::IoError(_)));
    }
}
