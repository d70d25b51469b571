//! Preview Session
//!
//! The engine facade the embedding application talks to: registers uploaded
//! clips, kicks off reverse transcodes, hands out playback controllers and
//! guarantees release of every backing file on asset removal or teardown,
//! on every exit path.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::assets::{AssetStore, MediaAsset, ReverseStatus};
use crate::core::ffmpeg::ReverseEncoder;
use crate::core::jobs::{JobState, TranscodePipeline, TranscodePipelineConfig};
use crate::core::playback::{PlayMode, PlaybackConfig, PlaybackController, VideoStream};
use crate::core::settings::EngineSettings;
use crate::core::{AssetId, CoreError, CoreResult};
use crate::events::{EventBus, PipelineEvent};

/// One banner preview session.
///
/// Owns the asset store, the transcode pipeline and one playback controller
/// per displayed asset.
pub struct PreviewSession {
    settings: EngineSettings,
    encoder: Arc<dyn ReverseEncoder>,
    store: Arc<AssetStore>,
    bus: EventBus,
    pipeline: TranscodePipeline,
    assets: Arc<Mutex<HashMap<AssetId, MediaAsset>>>,
    configs: Mutex<HashMap<AssetId, PlaybackConfig>>,
    controllers: Mutex<HashMap<AssetId, PlaybackController>>,
}

impl PreviewSession {
    /// Creates a session with its temp directory under the OS temp root.
    pub fn new(encoder: Arc<dyn ReverseEncoder>, settings: EngineSettings) -> CoreResult<Self> {
        let store = AssetStore::in_temp()?;
        Self::with_store(encoder, settings, store)
    }

    /// Creates a session with its temp directory under `root`.
    pub fn with_root(
        encoder: Arc<dyn ReverseEncoder>,
        settings: EngineSettings,
        root: &Path,
    ) -> CoreResult<Self> {
        let store = AssetStore::new(root)?;
        Self::with_store(encoder, settings, store)
    }

    fn with_store(
        encoder: Arc<dyn ReverseEncoder>,
        mut settings: EngineSettings,
        store: AssetStore,
    ) -> CoreResult<Self> {
        settings.normalize();

        let bus = EventBus::new();
        let pipeline = TranscodePipeline::new(
            Arc::clone(&encoder),
            bus.clone(),
            TranscodePipelineConfig {
                max_concurrent: settings.effective_concurrency(),
                settings: settings.transcode.clone(),
            },
        );

        info!(session_dir = %store.session_dir().display(), "preview session created");

        Ok(Self {
            settings,
            encoder,
            store: Arc::new(store),
            bus,
            pipeline,
            assets: Arc::new(Mutex::new(HashMap::new())),
            configs: Mutex::new(HashMap::new()),
            controllers: Mutex::new(HashMap::new()),
        })
    }

    /// The session's temp directory.
    pub fn session_dir(&self) -> &Path {
        self.store.session_dir()
    }

    /// Takes the upward UI event receiver (once).
    pub fn take_ui_events(&self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.bus.take_ui_receiver()
    }

    // =========================================================================
    // Ingestion
    // =========================================================================

    /// Registers an uploaded clip: persists the bytes, probes metadata and
    /// submits the reverse transcode.
    ///
    /// Forward playback can start immediately from the returned asset's
    /// source handle; the reverse copy arrives asynchronously.
    pub async fn register_asset(
        &self,
        bytes: &[u8],
        file_name: &str,
        display_index: usize,
    ) -> CoreResult<MediaAsset> {
        {
            let assets = self.assets.lock().unwrap();
            if assets.len() >= self.settings.limits.max_assets {
                return Err(CoreError::AssetLimitReached(self.settings.limits.max_assets));
            }
        }

        let handles = self.store.ingest(bytes, file_name)?;
        let mut asset = MediaAsset::new(
            file_name,
            display_index,
            handles.source,
            handles.planned_reverse,
        );

        // Probe failures are non-fatal: the clip may still decode in the
        // player, and the pipeline will surface its own error either way.
        match self.encoder.probe(asset.source.path()).await {
            Ok(info) => asset = asset.with_probed(&info),
            Err(e) => warn!(
                asset_id = %asset.id,
                error = %e,
                "probe failed, registering asset without metadata"
            ),
        }

        asset.mark_reverse_pending();
        let job_id = match self
            .pipeline
            .submit(&asset.id, asset.source.path(), asset.reverse.path())
        {
            Ok(job_id) => job_id,
            Err(e) => {
                self.store.release(&asset.handles());
                return Err(e);
            }
        };

        self.configs.lock().unwrap().insert(
            asset.id.clone(),
            PlaybackConfig {
                mode: self.settings.playback.mode,
                speed: self.settings.playback.speed,
                pause_sec: self.settings.playback.pause_sec,
            },
        );
        self.assets
            .lock()
            .unwrap()
            .insert(asset.id.clone(), asset.clone());

        // Track the job outcome on the stored asset for UI queries. The
        // asset's own controller learns it through its event channel.
        let pipeline = self.pipeline.clone();
        let assets = Arc::clone(&self.assets);
        let asset_id = asset.id.clone();
        tokio::spawn(async move {
            let state = pipeline.wait(&job_id).await;
            let mut assets = assets.lock().unwrap();
            if let Some(stored) = assets.get_mut(&asset_id) {
                match state {
                    Some(JobState::Succeeded) => stored.mark_reverse_ready(),
                    Some(JobState::Failed { .. }) => stored.mark_reverse_failed(),
                    _ => {}
                }
            }
        });

        info!(asset_id = %asset.id, name = %asset.name, "asset registered");
        Ok(asset)
    }

    /// Snapshot of a registered asset.
    pub fn asset(&self, asset_id: &str) -> Option<MediaAsset> {
        self.assets.lock().unwrap().get(asset_id).cloned()
    }

    /// Snapshot of all registered assets, ordered by display index.
    pub fn assets(&self) -> Vec<MediaAsset> {
        let mut all: Vec<_> = self.assets.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|a| a.display_index);
        all
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Starts playback for an asset over the two streams the UI provides.
    ///
    /// Replaces (and disposes) any previous controller for the asset.
    pub fn start_playback(
        &self,
        asset_id: &str,
        forward: Box<dyn VideoStream>,
        reverse: Box<dyn VideoStream>,
    ) -> CoreResult<()> {
        let (mut reverse_status, reverse_path) = {
            let assets = self.assets.lock().unwrap();
            let asset = assets
                .get(asset_id)
                .ok_or_else(|| CoreError::AssetNotFound(asset_id.to_string()))?;
            (asset.reverse_status, asset.reverse.path.clone())
        };
        // A job that completed before this subscription exists has already
        // published its target; the file is never visible half-written, so
        // existence is authoritative.
        if !reverse_status.is_terminal() && reverse_path.exists() {
            reverse_status = ReverseStatus::Ready;
        }
        let config = *self
            .configs
            .lock()
            .unwrap()
            .get(asset_id)
            .ok_or_else(|| CoreError::AssetNotFound(asset_id.to_string()))?;

        let pipeline_rx = self.bus.subscribe(asset_id);
        let controller = PlaybackController::spawn(
            asset_id,
            config,
            reverse_status,
            forward,
            reverse,
            pipeline_rx,
        );

        let previous = self
            .controllers
            .lock()
            .unwrap()
            .insert(asset_id.to_string(), controller);
        if let Some(previous) = previous {
            previous.dispose();
        }
        Ok(())
    }

    /// Stops playback for an asset (e.g. its visibility was toggled off).
    ///
    /// The running decode is stopped, not merely hidden. Idempotent.
    pub fn stop_playback(&self, asset_id: &str) {
        if let Some(controller) = self.controllers.lock().unwrap().remove(asset_id) {
            controller.dispose();
        }
        self.bus.unsubscribe(asset_id);
    }

    /// Relays a stream-end notification from the UI's decode surface.
    pub fn notify_stream_ended(&self, asset_id: &str) {
        if let Some(controller) = self.controllers.lock().unwrap().get(asset_id) {
            controller.notify_stream_ended();
        }
    }

    // =========================================================================
    // Parameter Adjustments
    // =========================================================================

    pub fn set_mode(&self, asset_id: &str, mode: PlayMode) -> CoreResult<()> {
        self.update_config(asset_id, |config| config.mode = mode)
    }

    pub fn set_speed(&self, asset_id: &str, speed: f64) -> CoreResult<()> {
        self.update_config(asset_id, |config| config.speed = speed)
    }

    pub fn set_pause(&self, asset_id: &str, pause_sec: f64) -> CoreResult<()> {
        self.update_config(asset_id, |config| config.pause_sec = pause_sec)
    }

    fn update_config(
        &self,
        asset_id: &str,
        mutate: impl FnOnce(&mut PlaybackConfig),
    ) -> CoreResult<()> {
        let config = {
            let mut configs = self.configs.lock().unwrap();
            let config = configs
                .get_mut(asset_id)
                .ok_or_else(|| CoreError::AssetNotFound(asset_id.to_string()))?;
            mutate(config);
            *config
        };

        if let Some(controller) = self.controllers.lock().unwrap().get(asset_id) {
            controller.reconfigure(config);
        }
        Ok(())
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Removes an asset: disposes its controller and releases its backing
    /// files once any in-flight transcode has finished or failed.
    pub fn remove_asset(&self, asset_id: &str) -> CoreResult<()> {
        let asset = self
            .assets
            .lock()
            .unwrap()
            .remove(asset_id)
            .ok_or_else(|| CoreError::AssetNotFound(asset_id.to_string()))?;

        self.stop_playback(asset_id);
        self.configs.lock().unwrap().remove(asset_id);

        // An in-flight job is allowed to finish or fail silently; its output
        // is released afterwards.
        let active_job = self.pipeline.active_job(asset_id);
        let pipeline = self.pipeline.clone();
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Some(job_id) = active_job {
                        let _ = pipeline.wait(&job_id).await;
                    }
                    store.release(&asset.handles());
                    debug!(asset_id = %asset.id, "asset removed and backing files released");
                });
            }
            // No runtime means no job can still be writing; release inline.
            Err(_) => store.release(&asset.handles()),
        }

        Ok(())
    }

    /// Removes every asset. Safe to call repeatedly; part of session
    /// teardown.
    pub fn release_all(&self) {
        let ids: Vec<AssetId> = self.assets.lock().unwrap().keys().cloned().collect();
        for id in ids {
            let _ = self.remove_asset(&id);
        }
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.release_all();
    }
}
