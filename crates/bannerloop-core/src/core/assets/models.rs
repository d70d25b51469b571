//! Asset Model Definitions
//!
//! Defines the MediaAsset struct and the reverse-asset lifecycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::ffmpeg::MediaInfo;
use crate::core::{AssetId, Ratio};

/// Reverse asset generation status
///
/// Tracks the lifecycle of the pre-encoded reverse copy that ping-pong
/// playback switches to. Playback falls back to forward looping until the
/// status reaches `Ready`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReverseStatus {
    /// No reverse copy exists and none has been requested yet
    #[default]
    Absent,
    /// A conversion job has been submitted and is queued or running
    Pending,
    /// The reverse copy is fully written and playable
    Ready,
    /// Conversion failed; the asset stays in forward/loop mode
    Failed,
}

impl ReverseStatus {
    /// Whether the reverse stream may be entered.
    pub fn is_ready(&self) -> bool {
        matches!(self, ReverseStatus::Ready)
    }

    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReverseStatus::Ready | ReverseStatus::Failed)
    }
}

/// Opaque reference to a store-owned backing file.
///
/// Handles are unique within a process lifetime; the backing file may not
/// exist yet (a planned reverse copy) or may already have been cleaned up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHandle {
    /// Unique key within the session
    pub key: String,
    /// Backing file path
    pub path: PathBuf,
}

impl StorageHandle {
    pub fn new(key: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One user-supplied clip and its derived reverse copy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    /// Unique identifier (ULID)
    pub id: AssetId,
    /// Original file name as uploaded
    pub name: String,
    /// Position of the clip in the overlay stack
    pub display_index: usize,
    /// Original bytes on durable temporary storage
    pub source: StorageHandle,
    /// Planned (or completed) reverse copy
    pub reverse: StorageHandle,
    /// Reverse copy lifecycle state
    #[serde(default)]
    pub reverse_status: ReverseStatus,
    /// Duration in seconds, derived once from the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<f64>,
    /// Aspect ratio, derived once from the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<Ratio>,
    /// Registration timestamp (ISO 8601)
    pub registered_at: String,
}

impl MediaAsset {
    /// Creates a new asset with a generated ULID
    pub fn new(
        name: &str,
        display_index: usize,
        source: StorageHandle,
        reverse: StorageHandle,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            display_index,
            source,
            reverse,
            reverse_status: ReverseStatus::Absent,
            duration_sec: None,
            aspect_ratio: None,
            registered_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Fills probe-derived metadata (builder pattern)
    pub fn with_probed(mut self, info: &MediaInfo) -> Self {
        if info.duration_sec > 0.0 {
            self.duration_sec = Some(info.duration_sec);
        }
        if let Some(video) = &info.video {
            if video.width > 0 && video.height > 0 {
                self.aspect_ratio = Some(Ratio::new(video.width as i32, video.height as i32));
            }
        }
        self
    }

    /// Marks the reverse copy as queued for conversion
    pub fn mark_reverse_pending(&mut self) {
        self.reverse_status = ReverseStatus::Pending;
    }

    /// Marks the reverse copy as fully written and playable
    pub fn mark_reverse_ready(&mut self) {
        self.reverse_status = ReverseStatus::Ready;
    }

    /// Marks the conversion as failed
    pub fn mark_reverse_failed(&mut self) {
        self.reverse_status = ReverseStatus::Failed;
    }

    /// Both backing handles, for release
    pub fn handles(&self) -> [StorageHandle; 2] {
        [self.source.clone(), self.reverse.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ffmpeg::VideoStreamInfo;

    fn handles() -> (StorageHandle, StorageHandle) {
        (
            StorageHandle::new("k-orig", "/tmp/original_1.mp4"),
            StorageHandle::new("k-rev", "/tmp/reverse_1.mp4"),
        )
    }

    #[test]
    fn reverse_status_default_is_absent() {
        assert_eq!(ReverseStatus::default(), ReverseStatus::Absent);
    }

    #[test]
    fn reverse_status_serialization() {
        let cases = vec![
            (ReverseStatus::Absent, "\"absent\""),
            (ReverseStatus::Pending, "\"pending\""),
            (ReverseStatus::Ready, "\"ready\""),
            (ReverseStatus::Failed, "\"failed\""),
        ];

        for (status, expected) in cases {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, expected, "ReverseStatus::{:?}", status);
        }
    }

    #[test]
    fn reverse_status_flags() {
        assert!(ReverseStatus::Ready.is_ready());
        assert!(!ReverseStatus::Pending.is_ready());
        assert!(ReverseStatus::Failed.is_terminal());
        assert!(!ReverseStatus::Absent.is_terminal());
    }

    #[test]
    fn asset_lifecycle_transitions() {
        let (source, reverse) = handles();
        let mut asset = MediaAsset::new("clip.mp4", 0, source, reverse);

        assert_eq!(asset.reverse_status, ReverseStatus::Absent);
        asset.mark_reverse_pending();
        assert_eq!(asset.reverse_status, ReverseStatus::Pending);
        asset.mark_reverse_ready();
        assert_eq!(asset.reverse_status, ReverseStatus::Ready);
        asset.mark_reverse_failed();
        assert_eq!(asset.reverse_status, ReverseStatus::Failed);
    }

    #[test]
    fn asset_with_probed_metadata() {
        let (source, reverse) = handles();
        let info = MediaInfo {
            duration_sec: 4.2,
            video: Some(VideoStreamInfo {
                width: 1080,
                height: 1920,
                fps: 30.0,
                codec: "h264".to_string(),
                pixel_format: "yuv420p".to_string(),
            }),
            has_audio: false,
            format: "mp4".to_string(),
            size_bytes: 1234,
        };

        let asset = MediaAsset::new("clip.mp4", 1, source, reverse).with_probed(&info);

        assert_eq!(asset.duration_sec, Some(4.2));
        let aspect = asset.aspect_ratio.unwrap();
        assert!(!aspect.is_landscape());
    }

    #[test]
    fn asset_ids_are_unique() {
        let (s1, r1) = handles();
        let (s2, r2) = handles();
        let a = MediaAsset::new("a.mp4", 0, s1, r1);
        let b = MediaAsset::new("a.mp4", 1, s2, r2);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn asset_serialization_roundtrip() {
        let (source, reverse) = handles();
        let mut asset = MediaAsset::new("clip.mp4", 0, source, reverse);
        asset.mark_reverse_ready();

        let json = serde_json::to_string(&asset).unwrap();
        assert!(json.contains("reverseStatus"));

        let parsed: MediaAsset = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, asset);
    }
}
