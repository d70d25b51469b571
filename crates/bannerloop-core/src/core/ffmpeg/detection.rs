//! FFmpeg Detection Module
//!
//! Handles detection and validation of FFmpeg/FFprobe binaries.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::process::configure_std_command;

use super::{FFmpegError, FFmpegResult};

/// Information about a detected FFmpeg installation
#[derive(Debug, Clone)]
pub struct FFmpegInfo {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Path to ffprobe binary
    pub ffprobe_path: PathBuf,
    /// FFmpeg version string
    pub version: String,
}

/// Detect FFmpeg in an explicitly given directory.
///
/// Used when the embedding application ships its own binaries or the user
/// configured an install location.
pub fn detect_ffmpeg_in_dir(dir: &Path) -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = dir.join(binary_name("ffmpeg"));
    let ffprobe_path = dir.join(binary_name("ffprobe"));

    if ffmpeg_path.exists() && ffprobe_path.exists() {
        let version = get_ffmpeg_version(&ffmpeg_path)?;
        return Ok(FFmpegInfo {
            ffmpeg_path,
            ffprobe_path,
            version,
        });
    }

    Err(FFmpegError::NotFound)
}

/// Detect FFmpeg from the system.
///
/// Checks common install locations first, then falls back to a PATH lookup
/// via `where` (Windows) or `which` (Unix).
pub fn detect_system_ffmpeg() -> FFmpegResult<FFmpegInfo> {
    let ffmpeg_path = which_binary("ffmpeg")?;
    let ffprobe_path = which_binary("ffprobe")?;
    let version = get_ffmpeg_version(&ffmpeg_path)?;

    Ok(FFmpegInfo {
        ffmpeg_path,
        ffprobe_path,
        version,
    })
}

fn binary_name(base: &str) -> String {
    #[cfg(target_os = "windows")]
    {
        format!("{base}.exe")
    }
    #[cfg(not(target_os = "windows"))]
    {
        base.to_string()
    }
}

/// Find a binary in common locations or on PATH.
fn which_binary(base: &str) -> FFmpegResult<PathBuf> {
    let name = binary_name(base);

    for dir in common_install_dirs() {
        let candidate = dir.join(&name);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    #[cfg(target_os = "windows")]
    let mut cmd = Command::new("where");
    #[cfg(not(target_os = "windows"))]
    let mut cmd = Command::new("which");

    configure_std_command(&mut cmd);
    let output = cmd.arg(base).output().map_err(|_| FFmpegError::NotFound)?;

    if output.status.success() {
        let path_str = String::from_utf8_lossy(&output.stdout);
        if let Some(first_line) = path_str.lines().next() {
            let trimmed = first_line.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }
    }

    Err(FFmpegError::NotFound)
}

fn common_install_dirs() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\ffmpeg\\bin"),
            PathBuf::from("C:\\Program Files\\ffmpeg\\bin"),
        ]
    }
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/opt/homebrew/bin"),
            PathBuf::from("/usr/local/bin"),
        ]
    }
    #[cfg(all(not(target_os = "windows"), not(target_os = "macos")))]
    {
        vec![PathBuf::from("/usr/bin"), PathBuf::from("/usr/local/bin")]
    }
}

/// Query the version of an ffmpeg binary.
fn get_ffmpeg_version(ffmpeg_path: &Path) -> FFmpegResult<String> {
    let mut cmd = Command::new(ffmpeg_path);
    configure_std_command(&mut cmd);
    let output = cmd
        .arg("-version")
        .output()
        .map_err(|_| FFmpegError::NotFound)?;

    if !output.status.success() {
        return Err(FFmpegError::ExecutionFailed(
            "ffmpeg -version returned a non-zero exit code".to_string(),
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version_line(&stdout).ok_or_else(|| {
        FFmpegError::ParseError("Could not parse ffmpeg version output".to_string())
    })
}

/// Extract the version token from `ffmpeg -version` output.
fn parse_version_line(output: &str) -> Option<String> {
    let first_line = output.lines().next()?;
    let mut parts = first_line.split_whitespace();
    // Expected shape: "ffmpeg version 6.1.1 Copyright ..."
    if parts.next()? != "ffmpeg" || parts.next()? != "version" {
        return None;
    }
    parts.next().map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_line_extracts_token() {
        let out = "ffmpeg version 6.1.1 Copyright (c) 2000-2023 the FFmpeg developers\nbuilt with gcc";
        assert_eq!(parse_version_line(out), Some("6.1.1".to_string()));
    }

    #[test]
    fn parse_version_line_handles_distro_suffixes() {
        let out = "ffmpeg version n7.0-ubuntu1 Copyright (c) 2000-2024";
        assert_eq!(parse_version_line(out), Some("n7.0-ubuntu1".to_string()));
    }

    #[test]
    fn parse_version_line_rejects_garbage() {
        assert_eq!(parse_version_line("not ffmpeg output"), None);
        assert_eq!(parse_version_line(""), None);
    }

    #[test]
    fn detect_in_missing_dir_fails() {
        let result = detect_ffmpeg_in_dir(Path::new("/nonexistent/ffmpeg/bin"));
        assert!(matches!(result, Err(FFmpegError::NotFound)));
    }
}
