//! Conversion Job Module
//!
//! Handles background reverse-transcode jobs: the job model here, execution
//! in [`pipeline`].

mod pipeline;

pub use pipeline::*;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{AssetId, JobId};

/// Conversion job status
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JobState {
    /// Waiting for a transcode slot
    #[default]
    Queued,
    /// Currently encoding
    Running { percent: f32 },
    /// Reverse asset published at the target path
    Succeeded,
    /// Failed with a human-readable detail; not retried automatically
    Failed { error: String },
}

impl JobState {
    /// Whether the job reached a terminal state.
    pub fn is_done(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed { .. })
    }
}

/// One execution of the external reverse transcode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionJob {
    /// Unique job ID (ULID)
    pub id: JobId,
    /// Asset this job produces the reverse copy for
    pub asset_id: AssetId,
    /// Source media path
    pub source_path: PathBuf,
    /// Path the reverse copy is published at on success
    pub target_path: PathBuf,
    /// Current state
    pub state: JobState,
    /// Creation timestamp (ISO 8601)
    pub created_at: String,
    /// Completion timestamp, set on success or failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl ConversionJob {
    /// Creates a new queued job
    pub fn new(asset_id: &str, source_path: &Path, target_path: &Path) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            asset_id: asset_id.to_string(),
            source_path: source_path.to_path_buf(),
            target_path: target_path.to_path_buf(),
            state: JobState::Queued,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
        }
    }

    /// Checks if the job is queued or running
    pub fn is_active(&self) -> bool {
        !self.state.is_done()
    }
}
