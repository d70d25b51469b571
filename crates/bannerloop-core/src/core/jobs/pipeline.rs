//! Transcode Pipeline
//!
//! Executes reverse-transcode jobs against the encoder backend and relays
//! ordered progress events through the [`EventBus`].
//!
//! Invariants:
//! - At most one active job per asset; a duplicate submission is rejected.
//! - The target path is never observable half-written: the encoder works on
//!   a private sibling path, published by atomic rename only on success.
//! - Per job, events are `started`, zero or more `progress` with
//!   non-decreasing percent, then exactly one of `completed` or `failed`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use crate::core::ffmpeg::{EncodeSettings, ReverseEncoder, TranscodeProgress};
use crate::core::{fs as corefs, AssetId, CoreError, CoreResult, JobId};
use crate::events::{EventBus, PipelineEvent};

use super::{ConversionJob, JobState};

/// Pipeline configuration
#[derive(Clone, Debug)]
pub struct TranscodePipelineConfig {
    /// Maximum transcodes running at once
    pub max_concurrent: usize,
    /// Encoder settings applied to every job
    pub settings: EncodeSettings,
}

impl Default for TranscodePipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get().max(2),
            settings: EncodeSettings::reverse_default(),
        }
    }
}

struct PipelineInner {
    /// Active job per asset; enforces the one-job-per-asset invariant
    active: HashMap<AssetId, JobId>,
    /// All jobs submitted this session
    jobs: HashMap<JobId, ConversionJob>,
}

/// Runs reverse-transcode jobs asynchronously.
#[derive(Clone)]
pub struct TranscodePipeline {
    encoder: Arc<dyn ReverseEncoder>,
    bus: EventBus,
    settings: EncodeSettings,
    limiter: Arc<Semaphore>,
    inner: Arc<Mutex<PipelineInner>>,
}

impl TranscodePipeline {
    /// Creates a pipeline over the given encoder backend.
    pub fn new(
        encoder: Arc<dyn ReverseEncoder>,
        bus: EventBus,
        config: TranscodePipelineConfig,
    ) -> Self {
        Self {
            encoder,
            bus,
            settings: config.settings,
            limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            inner: Arc::new(Mutex::new(PipelineInner {
                active: HashMap::new(),
                jobs: HashMap::new(),
            })),
        }
    }

    /// Submits a reverse-transcode job for an asset.
    ///
    /// Rejects the submission if a job for the same asset is still active;
    /// resubmitting explicitly after a failure is allowed.
    pub fn submit(&self, asset_id: &str, source: &Path, target: &Path) -> CoreResult<JobId> {
        corefs::validate_path_id_component(asset_id, "assetId")
            .map_err(CoreError::ValidationError)?;

        let job = ConversionJob::new(asset_id, source, target);
        let job_id = job.id.clone();

        {
            let mut inner = self.inner.lock().unwrap();
            if inner.active.contains_key(asset_id) {
                return Err(CoreError::JobAlreadyRunning(asset_id.to_string()));
            }
            inner.active.insert(asset_id.to_string(), job_id.clone());
            inner.jobs.insert(job_id.clone(), job.clone());
        }

        debug!(job_id = %job_id, asset_id = %asset_id, "conversion job queued");

        let encoder = Arc::clone(&self.encoder);
        let bus = self.bus.clone();
        let settings = self.settings.clone();
        let limiter = Arc::clone(&self.limiter);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_job(encoder, bus, settings, limiter, inner, job));

        Ok(job_id)
    }

    /// Looks up a job by ID.
    pub fn get_job(&self, job_id: &str) -> Option<ConversionJob> {
        self.inner.lock().unwrap().jobs.get(job_id).cloned()
    }

    /// The active job for an asset, if any.
    pub fn active_job(&self, asset_id: &str) -> Option<JobId> {
        self.inner.lock().unwrap().active.get(asset_id).cloned()
    }

    /// Waits for a job to reach a terminal state.
    ///
    /// Returns `None` for unknown job IDs. Multiple callers may wait on the
    /// same job.
    pub async fn wait(&self, job_id: &str) -> Option<JobState> {
        loop {
            let state = self.inner.lock().unwrap().jobs.get(job_id)?.state.clone();
            if state.is_done() {
                return Some(state);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

// =============================================================================
// Job Execution
// =============================================================================

fn set_running(inner: &Mutex<PipelineInner>, job_id: &str, percent: f32) {
    let mut guard = inner.lock().unwrap();
    if let Some(job) = guard.jobs.get_mut(job_id) {
        job.state = JobState::Running { percent };
    }
}

async fn run_job(
    encoder: Arc<dyn ReverseEncoder>,
    bus: EventBus,
    settings: EncodeSettings,
    limiter: Arc<Semaphore>,
    inner: Arc<Mutex<PipelineInner>>,
    job: ConversionJob,
) {
    // The semaphore is never closed, so acquire cannot fail.
    let _permit = limiter.acquire_owned().await.expect("limiter closed");

    set_running(&inner, &job.id, 0.0);
    bus.publish(PipelineEvent::started(&job.asset_id, &job.id));
    info!(
        job_id = %job.id,
        asset_id = %job.asset_id,
        source = %job.source_path.display(),
        "starting reverse transcode"
    );

    let result = execute(encoder.as_ref(), &bus, &settings, &inner, &job).await;

    let completed_at = chrono::Utc::now().to_rfc3339();
    {
        let mut guard = inner.lock().unwrap();
        guard.active.remove(&job.asset_id);
        if let Some(stored) = guard.jobs.get_mut(&job.id) {
            stored.completed_at = Some(completed_at);
            stored.state = match &result {
                Ok(()) => JobState::Succeeded,
                Err(detail) => JobState::Failed {
                    error: detail.clone(),
                },
            };
        }
    }

    match result {
        Ok(()) => {
            info!(job_id = %job.id, target = %job.target_path.display(), "reverse asset published");
            bus.publish(PipelineEvent::completed(
                &job.asset_id,
                &job.id,
                job.target_path.clone(),
            ));
        }
        Err(detail) => {
            error!(job_id = %job.id, asset_id = %job.asset_id, error = %detail, "reverse transcode failed");
            bus.publish(PipelineEvent::failed(&job.asset_id, &job.id, &detail));
        }
    }
}

async fn execute(
    encoder: &dyn ReverseEncoder,
    bus: &EventBus,
    settings: &EncodeSettings,
    inner: &Arc<Mutex<PipelineInner>>,
    job: &ConversionJob,
) -> Result<(), String> {
    // Probe first: catches unreadable/unsupported sources before spending
    // encode time, with a clearer error than a mid-encode failure.
    encoder
        .probe(&job.source_path)
        .await
        .map_err(|e| e.to_string())?;

    let private = private_target_path(&job.target_path);

    let (progress_tx, mut progress_rx) = mpsc::channel::<TranscodeProgress>(32);
    let forwarder = {
        let bus = bus.clone();
        let inner = Arc::clone(inner);
        let asset_id = job.asset_id.clone();
        let job_id = job.id.clone();
        tokio::spawn(async move {
            let mut last = 0.0f32;
            while let Some(progress) = progress_rx.recv().await {
                // Percent is non-decreasing within one job.
                let percent = progress.percent.clamp(0.0, 100.0).max(last);
                last = percent;
                set_running(&inner, &job_id, percent);
                bus.publish(PipelineEvent::progress(&asset_id, &job_id, percent));
            }
        })
    };

    let encode_result = encoder
        .encode_reversed(&job.source_path, &private, settings, Some(progress_tx))
        .await;

    // All progress events are delivered before the terminal event.
    let _ = forwarder.await;

    match encode_result {
        Ok(()) => corefs::publish_file(&private, &job.target_path)
            .map_err(|e| format!("failed to publish reverse asset: {e}")),
        Err(e) => {
            if private.exists() {
                let _ = std::fs::remove_file(&private);
            }
            Err(e.to_string())
        }
    }
}

/// Private sibling path the encoder writes to before publication.
///
/// Keeps the real extension last so the muxer is inferred correctly.
fn private_target_path(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("reverse");
    let ext = target
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("mp4");
    let token = uuid::Uuid::new_v4().simple().to_string();
    target.with_file_name(format!("{stem}.{}.part.{ext}", &token[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ffmpeg::{FFmpegError, FFmpegResult, MediaInfo, VideoStreamInfo};
    use crate::events::PipelinePhase;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct MockEncoder {
        /// Bytes written to the private output path
        payload: &'static [u8],
        /// Progress percentages sent during the encode
        progress: Vec<f32>,
        /// Error returned after writing the (partial) output
        fail_with: Option<String>,
        /// Gate the encode waits on before finishing
        hold: Option<Arc<Notify>>,
    }

    impl MockEncoder {
        fn succeeding() -> Self {
            Self {
                payload: b"reversed-bytes",
                progress: vec![25.0, 50.0, 100.0],
                fail_with: None,
                hold: None,
            }
        }
    }

    #[async_trait]
    impl ReverseEncoder for MockEncoder {
        async fn probe(&self, _input: &Path) -> FFmpegResult<MediaInfo> {
            Ok(MediaInfo {
                duration_sec: 2.0,
                video: Some(VideoStreamInfo {
                    width: 1280,
                    height: 720,
                    fps: 30.0,
                    codec: "h264".to_string(),
                    pixel_format: "yuv420p".to_string(),
                }),
                has_audio: false,
                format: "mp4".to_string(),
                size_bytes: 64,
            })
        }

        async fn encode_reversed(
            &self,
            _input: &Path,
            output: &Path,
            _settings: &EncodeSettings,
            progress_tx: Option<mpsc::Sender<TranscodeProgress>>,
        ) -> FFmpegResult<()> {
            std::fs::write(output, self.payload).unwrap();

            if let Some(tx) = progress_tx {
                for percent in &self.progress {
                    let _ = tx
                        .send(TranscodeProgress {
                            frame: 0,
                            percent: *percent,
                            fps: 30.0,
                            time_sec: 0.0,
                            eta_seconds: None,
                        })
                        .await;
                }
            }

            if let Some(gate) = &self.hold {
                gate.notified().await;
            }

            match &self.fail_with {
                Some(detail) => Err(FFmpegError::ExecutionFailed(detail.clone())),
                None => Ok(()),
            }
        }
    }

    fn pipeline_with(encoder: MockEncoder) -> (TranscodePipeline, EventBus) {
        let bus = EventBus::new();
        let pipeline = TranscodePipeline::new(
            Arc::new(encoder),
            bus.clone(),
            TranscodePipelineConfig::default(),
        );
        (pipeline, bus)
    }

    async fn collect_until_terminal(
        rx: &mut mpsc::UnboundedReceiver<PipelineEvent>,
    ) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for pipeline events")
                .expect("event channel closed");
            let phase = event.phase;
            events.push(event);
            if matches!(phase, PipelinePhase::Completed | PipelinePhase::Failed) {
                return events;
            }
        }
    }

    #[tokio::test]
    async fn success_publishes_target_and_emits_ordered_events() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("reverse_1.mp4");
        let (pipeline, bus) = pipeline_with(MockEncoder::succeeding());
        let mut rx = bus.subscribe("asset_a");

        pipeline
            .submit("asset_a", &dir.path().join("original_1.mp4"), &target)
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        assert_eq!(events.first().unwrap().phase, PipelinePhase::Started);
        assert_eq!(events.last().unwrap().phase, PipelinePhase::Completed);
        assert_eq!(
            events.last().unwrap().target_path.as_deref(),
            Some(target.as_path())
        );

        assert_eq!(std::fs::read(&target).unwrap(), b"reversed-bytes");

        // No private `.part.` file survives publication.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".part."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failure_leaves_target_absent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("reverse_1.mp4");
        let (pipeline, bus) = pipeline_with(MockEncoder {
            fail_with: Some("unsupported codec".to_string()),
            ..MockEncoder::succeeding()
        });
        let mut rx = bus.subscribe("asset_a");

        let job_id = pipeline
            .submit("asset_a", &dir.path().join("original_1.mp4"), &target)
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        let failed = events.last().unwrap();
        assert_eq!(failed.phase, PipelinePhase::Failed);
        assert!(failed.error.as_ref().unwrap().contains("unsupported codec"));

        // Partial output was written to the private path, never to the target.
        assert!(!target.exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".part."))
            .collect();
        assert!(leftovers.is_empty());

        assert!(matches!(
            pipeline.wait(&job_id).await,
            Some(JobState::Failed { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_submission_for_active_asset_is_rejected() {
        let dir = TempDir::new().unwrap();
        let gate = Arc::new(Notify::new());
        let (pipeline, _bus) = pipeline_with(MockEncoder {
            hold: Some(Arc::clone(&gate)),
            ..MockEncoder::succeeding()
        });

        let source = dir.path().join("original_1.mp4");
        let first = pipeline
            .submit("asset_a", &source, &dir.path().join("reverse_1.mp4"))
            .unwrap();

        let second = pipeline.submit("asset_a", &source, &dir.path().join("reverse_1.mp4"));
        assert!(matches!(second, Err(CoreError::JobAlreadyRunning(_))));

        // A different asset is unaffected.
        pipeline
            .submit("asset_b", &source, &dir.path().join("reverse_2.mp4"))
            .unwrap();

        gate.notify_one();
        assert!(matches!(
            pipeline.wait(&first).await,
            Some(JobState::Succeeded)
        ));

        // Terminal job frees the slot for an explicit resubmission.
        pipeline
            .submit("asset_a", &source, &dir.path().join("reverse_1.mp4"))
            .unwrap();
    }

    #[tokio::test]
    async fn progress_percent_is_non_decreasing() {
        let dir = TempDir::new().unwrap();
        let (pipeline, bus) = pipeline_with(MockEncoder {
            progress: vec![30.0, 20.0, 80.0],
            ..MockEncoder::succeeding()
        });
        let mut rx = bus.subscribe("asset_a");

        pipeline
            .submit(
                "asset_a",
                &dir.path().join("original_1.mp4"),
                &dir.path().join("reverse_1.mp4"),
            )
            .unwrap();

        let events = collect_until_terminal(&mut rx).await;
        let percents: Vec<f32> = events
            .iter()
            .filter(|e| e.phase == PipelinePhase::Progress)
            .map(|e| e.percent.unwrap())
            .collect();
        assert_eq!(percents, vec![30.0, 30.0, 80.0]);
    }

    #[tokio::test]
    async fn submit_rejects_unsafe_asset_ids() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _bus) = pipeline_with(MockEncoder::succeeding());

        let result = pipeline.submit(
            "../escape",
            &dir.path().join("a.mp4"),
            &dir.path().join("b.mp4"),
        );
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[tokio::test]
    async fn wait_on_unknown_job_returns_none() {
        let (pipeline, _bus) = pipeline_with(MockEncoder::succeeding());
        assert!(pipeline.wait("nonexistent").await.is_none());
    }
}
