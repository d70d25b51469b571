//! Filesystem utilities.
//!
//! Safe primitives for writing and publishing files in a crash-tolerant way.
//!
//! Why this exists:
//! - Ingested source bytes must be durable before the caller gets a handle.
//! - A reverse asset must never be observable half-written: the encoder works
//!   on a private sibling path and the result is swapped into place only on
//!   success.
//! - Windows semantics differ from Unix for rename-over-existing; we handle
//!   both.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{CoreError, CoreResult};

// =============================================================================
// Path Validation Utilities
// =============================================================================

/// Validates that an identifier component is safe to use in file paths.
///
/// Rejects empty identifiers, path traversal sequences (`..`), path
/// separators, drive letter indicators and control characters. Any identifier
/// used as part of a file path MUST pass through this function.
pub fn validate_path_id_component(id: &str, label: &str) -> Result<(), String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Err(format!("{label} is empty or contains only whitespace"));
    }
    if trimmed.contains("..")
        || trimmed.contains('/')
        || trimmed.contains('\\')
        || trimmed.contains(':')
    {
        return Err(format!(
            "Invalid {label}: contains path traversal characters"
        ));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(format!("Invalid {label}: contains control characters"));
    }
    Ok(())
}

/// Validates a local file path for input operations.
///
/// Rejects empty paths and remote URLs, requires an absolute path, and
/// verifies the file exists and is a regular file.
pub fn validate_local_input_path(path: &str, label: &str) -> Result<PathBuf, String> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(format!("{label} is empty"));
    }

    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("://") {
        return Err(format!("{label} must be a local file path"));
    }

    let pb = PathBuf::from(trimmed);
    if !pb.is_absolute() {
        return Err(format!(
            "{label} must be an absolute path: {}",
            pb.display()
        ));
    }

    let meta =
        std::fs::metadata(&pb).map_err(|_| format!("{label} file not found: {}", pb.display()))?;
    if !meta.is_file() {
        return Err(format!("{label} is not a file: {}", pb.display()));
    }

    Ok(pb)
}

// =============================================================================
// Atomic Writes
// =============================================================================

/// Write bytes to `path` using an atomic replace pattern.
///
/// Writes to a sibling temporary file, flushes and syncs it, then swaps it
/// into place by renaming.
pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> CoreResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = tmp_path_for(path);
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }

    publish_file(&tmp_path, path)?;
    Ok(())
}

/// Write a JSON file atomically with pretty formatting.
pub fn atomic_write_json_pretty<T: serde::Serialize>(path: &Path, value: &T) -> CoreResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

/// Publish a fully-written private file at its destination path.
///
/// The destination either keeps its previous content or atomically becomes
/// the new file; readers never observe a truncated intermediate state.
pub fn publish_file(src_tmp: &Path, dest: &Path) -> CoreResult<()> {
    // Fast path: dest does not exist.
    if !dest.exists() {
        std::fs::rename(src_tmp, dest)?;
        return Ok(());
    }

    // Windows: rename-over-existing may fail depending on filesystem; use a
    // backup swap.
    let bak = bak_path_for(dest);
    if bak.exists() {
        let _ = std::fs::remove_file(&bak);
    }

    std::fs::rename(dest, &bak)?;
    match std::fs::rename(src_tmp, dest) {
        Ok(()) => {
            let _ = std::fs::remove_file(&bak);
            Ok(())
        }
        Err(e) => {
            // Try to restore the old file.
            let _ = std::fs::rename(&bak, dest);
            let _ = std::fs::remove_file(src_tmp);
            Err(CoreError::IoError(e))
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "tmp".to_string());
    tmp.set_file_name(format!("{file_name}.tmp"));
    tmp
}

fn bak_path_for(path: &Path) -> PathBuf {
    let mut bak = path.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "bak".to_string());
    bak.set_file_name(format!("{file_name}.bak"));
    bak
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_bytes_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.json");

        atomic_write_bytes(&path, b"one").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "one");

        atomic_write_bytes(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }

    #[test]
    fn publish_file_moves_private_file_into_place() {
        let dir = TempDir::new().unwrap();
        let private = dir.path().join("out.part.mp4");
        let dest = dir.path().join("out.mp4");
        std::fs::write(&private, b"encoded").unwrap();

        publish_file(&private, &dest).unwrap();

        assert!(!private.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"encoded");
    }

    #[test]
    fn publish_file_replaces_existing_destination() {
        let dir = TempDir::new().unwrap();
        let private = dir.path().join("new.part.mp4");
        let dest = dir.path().join("out.mp4");
        std::fs::write(&dest, b"old").unwrap();
        std::fs::write(&private, b"new").unwrap();

        publish_file(&private, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        assert!(!dir.path().join("out.mp4.bak").exists());
    }

    #[test]
    fn validate_path_id_component_accepts_plain_ids() {
        assert!(validate_path_id_component("asset_001", "assetId").is_ok());
        assert!(validate_path_id_component("01HXYZ123ABC", "assetId").is_ok());
    }

    #[test]
    fn validate_path_id_component_rejects_traversal() {
        assert!(validate_path_id_component("", "assetId").is_err());
        assert!(validate_path_id_component("..", "assetId").is_err());
        assert!(validate_path_id_component("foo/../bar", "assetId").is_err());
        assert!(validate_path_id_component("foo\\bar", "assetId").is_err());
        assert!(validate_path_id_component("C:", "assetId").is_err());
        assert!(validate_path_id_component("foo\0bar", "assetId").is_err());
    }

    #[test]
    fn validate_local_input_path_rejects_urls_and_relative_paths() {
        assert!(validate_local_input_path("http://example.com/a.mp4", "inputPath").is_err());
        assert!(validate_local_input_path("file://localhost/a.mp4", "inputPath").is_err());
        assert!(validate_local_input_path("relative/a.mp4", "inputPath").is_err());
        assert!(validate_local_input_path("", "inputPath").is_err());
    }

    #[test]
    fn validate_local_input_path_accepts_existing_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"data").unwrap();

        let result = validate_local_input_path(&file.to_string_lossy(), "inputPath");
        assert_eq!(result.unwrap(), file);
    }

    #[test]
    fn validate_local_input_path_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let result = validate_local_input_path(&dir.path().to_string_lossy(), "inputPath");
        assert!(result.unwrap_err().contains("not a file"));
    }
}
