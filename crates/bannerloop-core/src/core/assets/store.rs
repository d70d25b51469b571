//! Asset Store
//!
//! Owns the temporary on-disk copies of uploaded source media and their
//! derived reverse copies. All backing files live in one session directory;
//! no other component deletes or renames them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::core::{fs as corefs, CoreError, CoreResult};

use super::StorageHandle;

/// Handle pair returned by ingestion: the persisted source and the planned
/// reverse copy (allocated, not yet created).
#[derive(Clone, Debug)]
pub struct IngestedHandles {
    pub source: StorageHandle,
    pub planned_reverse: StorageHandle,
}

/// Owns temporary backing files for one preview session.
///
/// Handle uniqueness comes from the session stamp plus a monotonic counter,
/// never wall-clock time alone, so rapid bulk ingestion cannot collide.
pub struct AssetStore {
    session_dir: PathBuf,
    stamp: String,
    counter: AtomicU64,
}

impl AssetStore {
    /// Creates a store with a fresh session directory under `root`.
    pub fn new(root: &Path) -> CoreResult<Self> {
        let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S").to_string();
        let session_dir = root.join(format!("bannerloop_session_{stamp}"));
        std::fs::create_dir_all(&session_dir)
            .map_err(|e| CoreError::IngestionFailed(format!("cannot create session dir: {e}")))?;

        debug!(dir = %session_dir.display(), "asset store session directory created");

        Ok(Self {
            session_dir,
            stamp,
            counter: AtomicU64::new(0),
        })
    }

    /// Creates a store under the OS temporary directory.
    pub fn in_temp() -> CoreResult<Self> {
        Self::new(&std::env::temp_dir())
    }

    /// The session directory all backing files live in.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Persists uploaded bytes and allocates the reverse path.
    ///
    /// The source file is fully written and synced before this returns; the
    /// reverse path is reserved but nothing exists there until the pipeline
    /// publishes it.
    pub fn ingest(&self, bytes: &[u8], suggested_name: &str) -> CoreResult<IngestedHandles> {
        let seq = self.counter.fetch_add(1, Ordering::SeqCst);
        let ext = sanitized_extension(suggested_name);

        let source_path = self
            .session_dir
            .join(format!("original_{}_{}.{}", self.stamp, seq, ext));
        let reverse_path = self
            .session_dir
            .join(format!("reverse_{}_{}.{}", self.stamp, seq, ext));

        corefs::atomic_write_bytes(&source_path, bytes)
            .map_err(|e| CoreError::IngestionFailed(e.to_string()))?;

        debug!(
            source = %source_path.display(),
            bytes = bytes.len(),
            "ingested source asset"
        );

        Ok(IngestedHandles {
            source: StorageHandle::new(format!("{}-{}-orig", self.stamp, seq), source_path),
            planned_reverse: StorageHandle::new(
                format!("{}-{}-rev", self.stamp, seq),
                reverse_path,
            ),
        })
    }

    /// Deletes the backing files of the given handles.
    ///
    /// Tolerant of files that were never created or already cleaned up;
    /// deletion failures are logged and never fail the caller.
    pub fn release(&self, handles: &[StorageHandle]) {
        for handle in handles {
            if !handle.path.exists() {
                continue;
            }
            match std::fs::remove_file(&handle.path) {
                Ok(()) => debug!(path = %handle.path.display(), "released backing file"),
                Err(e) => warn!(
                    path = %handle.path.display(),
                    error = %e,
                    "failed to delete backing file; will retry on next cleanup pass"
                ),
            }
        }
    }

    /// Removes every file in the session directory. Safe to call repeatedly.
    pub fn release_all(&self) {
        let entries = match std::fs::read_dir(&self.session_dir) {
            Ok(entries) => entries,
            Err(_) => return, // directory already gone
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "failed to delete backing file");
                }
            }
        }
    }
}

impl Drop for AssetStore {
    fn drop(&mut self) {
        // Best-effort teardown; leftover files are in the OS temp dir anyway.
        self.release_all();
        let _ = std::fs::remove_dir(&self.session_dir);
    }
}

/// Extracts a safe file extension from an uploaded name.
fn sanitized_extension(suggested_name: &str) -> String {
    let ext = Path::new(suggested_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");

    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        "mp4".to_string()
    } else {
        ext.to_ascii_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn ingest_persists_source_bytes() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        let handles = store.ingest(b"clip-bytes", "banner.mp4").unwrap();

        assert_eq!(std::fs::read(&handles.source.path).unwrap(), b"clip-bytes");
        assert!(!handles.planned_reverse.path.exists());
    }

    #[test]
    fn identical_names_get_distinct_paths() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        let a = store.ingest(b"first", "same.mp4").unwrap();
        let b = store.ingest(b"second", "same.mp4").unwrap();

        assert_ne!(a.source.path, b.source.path);
        assert_ne!(a.planned_reverse.path, b.planned_reverse.path);
        assert_ne!(a.source.key, b.source.key);
    }

    #[test]
    fn naming_follows_original_reverse_scheme() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        let handles = store.ingest(b"x", "clip.webm").unwrap();

        let source_name = handles.source.path.file_name().unwrap().to_string_lossy();
        let reverse_name = handles
            .planned_reverse
            .path
            .file_name()
            .unwrap()
            .to_string_lossy();
        assert!(source_name.starts_with("original_"));
        assert!(source_name.ends_with(".webm"));
        assert!(reverse_name.starts_with("reverse_"));
        assert!(reverse_name.ends_with(".webm"));
    }

    #[test]
    fn weird_extension_falls_back_to_mp4() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        let handles = store.ingest(b"x", "no-extension").unwrap();
        assert!(handles
            .source
            .path
            .to_string_lossy()
            .ends_with(".mp4"));

        let handles = store.ingest(b"x", "evil.../../mp4").unwrap();
        assert!(handles.source.path.to_string_lossy().ends_with(".mp4"));
    }

    #[test]
    fn release_is_tolerant_and_idempotent() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        let handles = store.ingest(b"bytes", "clip.mp4").unwrap();
        let pair = [handles.source.clone(), handles.planned_reverse.clone()];

        // Reverse file never created; source released twice.
        store.release(&pair);
        assert!(!handles.source.path.exists());
        store.release(&pair);
    }

    #[test]
    fn release_all_is_repeatable() {
        let root = TempDir::new().unwrap();
        let store = AssetStore::new(root.path()).unwrap();

        store.ingest(b"one", "a.mp4").unwrap();
        store.ingest(b"two", "b.mp4").unwrap();

        store.release_all();
        let remaining: Vec<_> = std::fs::read_dir(store.session_dir())
            .unwrap()
            .flatten()
            .collect();
        assert!(remaining.is_empty());

        store.release_all();
    }
}
