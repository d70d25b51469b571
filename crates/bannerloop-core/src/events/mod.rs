//! Event Relay Module
//!
//! Carries pipeline progress and lifecycle events from the transcode
//! pipeline's execution context to each playback controller's context, and
//! exposes one upward channel for UI consumption.
//!
//! Delivery is modeled as an ordered message channel per asset rather than a
//! shared mutable map keyed by file path: within one asset, events arrive in
//! the order they were published, and `completed`/`failed` is always observed
//! after every prior `progress`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{AssetId, JobId};

// =============================================================================
// Event Payloads
// =============================================================================

/// Pipeline lifecycle phase
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PipelinePhase {
    Started,
    Progress,
    Completed,
    Failed,
}

/// Event emitted for one conversion job
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    /// Asset the job belongs to
    pub asset_id: AssetId,
    /// Job ID
    pub job_id: JobId,
    /// Lifecycle phase
    pub phase: PipelinePhase,
    /// Progress percentage (0-100), present for progress events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f32>,
    /// Published reverse asset path, present on completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    /// Error detail, present on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineEvent {
    pub fn started(asset_id: &str, job_id: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            job_id: job_id.to_string(),
            phase: PipelinePhase::Started,
            percent: None,
            target_path: None,
            error: None,
        }
    }

    pub fn progress(asset_id: &str, job_id: &str, percent: f32) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            job_id: job_id.to_string(),
            phase: PipelinePhase::Progress,
            percent: Some(percent),
            target_path: None,
            error: None,
        }
    }

    pub fn completed(asset_id: &str, job_id: &str, target_path: PathBuf) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            job_id: job_id.to_string(),
            phase: PipelinePhase::Completed,
            percent: Some(100.0),
            target_path: Some(target_path),
            error: None,
        }
    }

    pub fn failed(asset_id: &str, job_id: &str, error: &str) -> Self {
        Self {
            asset_id: asset_id.to_string(),
            job_id: job_id.to_string(),
            phase: PipelinePhase::Failed,
            percent: None,
            target_path: None,
            error: Some(error.to_string()),
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

struct BusInner {
    per_asset: HashMap<AssetId, mpsc::UnboundedSender<PipelineEvent>>,
    ui_tx: mpsc::UnboundedSender<PipelineEvent>,
    ui_rx: Option<mpsc::UnboundedReceiver<PipelineEvent>>,
}

/// Relays pipeline events to per-asset subscribers and the UI surface.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                per_asset: HashMap::new(),
                ui_tx,
                ui_rx: Some(ui_rx),
            })),
        }
    }

    /// Subscribes to one asset's ordered event stream.
    ///
    /// A later subscription for the same asset replaces the earlier one; a
    /// controller owns its asset's channel exclusively.
    pub fn subscribe(&self, asset_id: &str) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        inner.per_asset.insert(asset_id.to_string(), tx);
        rx
    }

    /// Drops the subscription for an asset. Idempotent.
    pub fn unsubscribe(&self, asset_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.per_asset.remove(asset_id);
    }

    /// Takes the UI event receiver (can only be called once).
    pub fn take_ui_receiver(&self) -> Option<mpsc::UnboundedReceiver<PipelineEvent>> {
        self.inner.lock().unwrap().ui_rx.take()
    }

    /// Publishes an event to the asset's subscriber and the UI surface.
    ///
    /// Closed receivers are silently dropped; publishing never fails.
    pub fn publish(&self, event: PipelineEvent) {
        let mut inner = self.inner.lock().unwrap();

        let closed = match inner.per_asset.get(&event.asset_id) {
            Some(tx) => tx.send(event.clone()).is_err(),
            None => false,
        };
        if closed {
            inner.per_asset.remove(&event.asset_id);
        }

        let _ = inner.ui_tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
