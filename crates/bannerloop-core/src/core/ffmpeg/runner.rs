//! FFmpeg Runner Module
//!
//! Executes FFmpeg commands for probing and reverse re-encoding.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::core::process::configure_tokio_command;

use super::{FFmpegError, FFmpegInfo, FFmpegResult};

/// Progress information for a long-running encode
#[derive(Debug, Clone)]
pub struct TranscodeProgress {
    /// Current frame number
    pub frame: u64,
    /// Progress percentage (0.0 - 100.0)
    pub percent: f32,
    /// Current processing speed (fps)
    pub fps: f32,
    /// Current time position in the output
    pub time_sec: f64,
    /// Estimated time remaining (seconds)
    pub eta_seconds: Option<u64>,
}

/// Media information extracted by FFprobe
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    /// Duration in seconds
    pub duration_sec: f64,
    /// Video stream info (if present)
    pub video: Option<VideoStreamInfo>,
    /// Whether the container carries an audio stream (stripped on reverse)
    pub has_audio: bool,
    /// Container format
    pub format: String,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Video stream information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamInfo {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: f64,
    /// Codec name (e.g., "h264", "vp9")
    pub codec: String,
    /// Pixel format
    pub pixel_format: String,
}

impl VideoStreamInfo {
    /// Aspect ratio of the stream, or `None` for degenerate dimensions.
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(self.width as f64 / self.height as f64)
    }
}

/// Settings for the reverse re-encode
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSettings {
    /// Video codec (e.g., "libx264", "libvpx-vp9")
    pub video_codec: String,
    /// Preset (for x264/x265: ultrafast, veryfast, fast, medium, slow)
    pub preset: String,
    /// CRF value for quality-based encoding (0-51, lower is better)
    pub crf: u8,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self::reverse_default()
    }
}

impl EncodeSettings {
    /// Preset for reverse-asset generation.
    ///
    /// Banner clips are short and preview-only, so encode speed wins over
    /// compression efficiency.
    pub fn reverse_default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
        }
    }
}

// =============================================================================
// Encoder Seam
// =============================================================================

/// Backend that probes media and produces time-reversed copies.
///
/// The pipeline depends on this trait rather than on [`FFmpegRunner`]
/// directly so tests can substitute a controllable encoder.
#[async_trait]
pub trait ReverseEncoder: Send + Sync + 'static {
    /// Probe a media file for duration/stream information.
    async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo>;

    /// Encode a time-reversed copy of `input` at `output`.
    ///
    /// `output` is a private path owned by the caller; on failure a partial
    /// file may remain there and the caller is responsible for removing it.
    async fn encode_reversed(
        &self,
        input: &Path,
        output: &Path,
        settings: &EncodeSettings,
        progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
    ) -> FFmpegResult<()>;
}

// =============================================================================
// FFmpeg Runner
// =============================================================================

/// FFmpeg runner shelling out to a detected installation
#[derive(Clone)]
pub struct FFmpegRunner {
    info: Arc<FFmpegInfo>,
}

impl FFmpegRunner {
    /// Create a new runner from a detected FFmpeg installation
    pub fn new(info: FFmpegInfo) -> Self {
        Self {
            info: Arc::new(info),
        }
    }

    /// Get the FFmpeg info
    pub fn info(&self) -> &FFmpegInfo {
        &self.info
    }

    async fn run_probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        let mut cmd = tokio::process::Command::new(&self.info.ffprobe_path);
        configure_tokio_command(&mut cmd);
        let output = cmd
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                &input.to_string_lossy(),
            ])
            .output()
            .await
            .map_err(FFmpegError::ProcessError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FFmpegError::ProbeError(format!(
                "FFprobe failed: {}",
                stderr
            )));
        }

        let json_str = String::from_utf8_lossy(&output.stdout);
        parse_probe_output(&json_str)
    }

    async fn run_reverse_encode(
        &self,
        input: &Path,
        output: &Path,
        settings: &EncodeSettings,
        progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
    ) -> FFmpegResult<()> {
        if !input.exists() {
            return Err(FFmpegError::InvalidInput(format!(
                "Input file does not exist: {}",
                input.display()
            )));
        }

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FFmpegError::OutputError(format!("Failed to create output directory: {}", e))
            })?;
        }

        // Duration is needed to turn out_time into a percentage.
        let media_info = self.run_probe(input).await?;
        let duration = media_info.duration_sec;

        // `reverse` buffers the whole clip in memory, which is acceptable for
        // short banner assets. Audio is stripped: previews are muted.
        let mut cmd = tokio::process::Command::new(&self.info.ffmpeg_path);
        configure_tokio_command(&mut cmd);
        cmd.args([
            "-i",
            &input.to_string_lossy(),
            "-vf",
            "reverse",
            "-an",
            "-c:v",
            &settings.video_codec,
            "-preset",
            &settings.preset,
            "-crf",
            &settings.crf.to_string(),
            "-progress",
            "pipe:1",
            "-y",
            &output.to_string_lossy(),
        ]);

        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(FFmpegError::ProcessError)?;

        // Drain stderr concurrently, keeping a tail for error reporting.
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();
                let mut tail: Vec<String> = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    tail.push(line);
                    if tail.len() > 12 {
                        tail.remove(0);
                    }
                }
                tail.join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let tx = progress_tx;
            tokio::spawn(async move {
                let reader = BufReader::new(stdout);
                let mut lines = reader.lines();

                let mut current_frame = 0u64;
                let mut current_time = 0.0f64;
                let mut current_fps = 0.0f32;

                while let Ok(Some(line)) = lines.next_line().await {
                    // Parse FFmpeg -progress key=value output
                    if let Some(value) = line.strip_prefix("frame=") {
                        current_frame = value.trim().parse().unwrap_or(0);
                    } else if let Some(value) = line.strip_prefix("fps=") {
                        current_fps = value.trim().parse().unwrap_or(0.0);
                    } else if let Some(value) = line.strip_prefix("out_time_ms=") {
                        let us: u64 = value.trim().parse().unwrap_or(0);
                        current_time = us as f64 / 1_000_000.0;
                    } else if line.starts_with("progress=") {
                        let percent = if duration > 0.0 {
                            ((current_time / duration) * 100.0) as f32
                        } else {
                            0.0
                        };

                        let eta = if current_fps > 0.0 && duration > current_time {
                            let remaining = duration - current_time;
                            Some(remaining.ceil() as u64)
                        } else {
                            None
                        };

                        let progress = TranscodeProgress {
                            frame: current_frame,
                            percent: percent.min(100.0),
                            fps: current_fps,
                            time_sec: current_time,
                            eta_seconds: eta,
                        };

                        if let Some(tx) = &tx {
                            if tx.send(progress).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        let status = child.wait().await.map_err(FFmpegError::ProcessError)?;

        if !status.success() {
            let detail = match stderr_task {
                Some(task) => task.await.unwrap_or_default(),
                None => String::new(),
            };
            let detail = if detail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                detail
            };
            return Err(FFmpegError::ExecutionFailed(detail));
        }

        Ok(())
    }
}

#[async_trait]
impl ReverseEncoder for FFmpegRunner {
    async fn probe(&self, input: &Path) -> FFmpegResult<MediaInfo> {
        self.run_probe(input).await
    }

    async fn encode_reversed(
        &self,
        input: &Path,
        output: &Path,
        settings: &EncodeSettings,
        progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
    ) -> FFmpegResult<()> {
        self.run_reverse_encode(input, output, settings, progress_tx)
            .await
    }
}

// =============================================================================
// FFprobe Output Parsing
// =============================================================================

/// Parse FFprobe JSON output
fn parse_probe_output(json_str: &str) -> FFmpegResult<MediaInfo> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| FFmpegError::ParseError(format!("Failed to parse FFprobe output: {}", e)))?;

    let format = json
        .get("format")
        .ok_or_else(|| FFmpegError::ParseError("Missing format info".to_string()))?;

    let duration_sec = format
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size_bytes = format
        .get("size")
        .and_then(|s| s.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let format_name = format
        .get("format_name")
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let mut video_info: Option<VideoStreamInfo> = None;
    let mut has_audio = false;

    for stream in streams {
        match stream.get("codec_type").and_then(|c| c.as_str()) {
            Some("video") if video_info.is_none() => {
                video_info = Some(parse_video_stream(&stream));
            }
            Some("audio") => has_audio = true,
            _ => {}
        }
    }

    Ok(MediaInfo {
        duration_sec,
        video: video_info,
        has_audio,
        format: format_name,
        size_bytes,
    })
}

fn parse_video_stream(stream: &serde_json::Value) -> VideoStreamInfo {
    let width = stream.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32;
    let height = stream.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32;

    // Frame rate arrives as a fraction, e.g. "30/1" or "30000/1001"
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(|s| {
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 2 {
                let num: f64 = parts[0].parse().ok()?;
                let den: f64 = parts[1].parse().ok()?;
                if den > 0.0 {
                    Some(num / den)
                } else {
                    None
                }
            } else {
                s.parse().ok()
            }
        })
        .unwrap_or(30.0);

    let codec = stream
        .get("codec_name")
        .and_then(|c| c.as_str())
        .unwrap_or("unknown")
        .to_string();

    let pixel_format = stream
        .get("pix_fmt")
        .and_then(|p| p.as_str())
        .unwrap_or("unknown")
        .to_string();

    VideoStreamInfo {
        width,
        height,
        fps,
        codec,
        pixel_format,
    }
}
