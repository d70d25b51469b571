//! Settings Persistence System
//!
//! Persistent engine settings with atomic file writes, schema validation
//! with defaults, and value normalization so corrupted or old configs never
//! wedge the engine.
//!
//! Storage location: {config_dir}/bannerloop/settings.json

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::ffmpeg::EncodeSettings;
use crate::core::playback::PlayMode;
use crate::core::{fs as corefs, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Reverse-transcode settings
    #[serde(default)]
    pub transcode: EncodeSettings,

    /// Playback defaults applied to newly registered assets
    #[serde(default)]
    pub playback: PlaybackDefaults,

    /// Session limits
    #[serde(default)]
    pub limits: LimitSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            transcode: EncodeSettings::default(),
            playback: PlaybackDefaults::default(),
            limits: LimitSettings::default(),
        }
    }
}

/// Playback defaults for new assets
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackDefaults {
    /// Default playback mode
    #[serde(default)]
    pub mode: PlayMode,
    /// Default speed multiplier (the parameter UI exposes 0.5-3.0)
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Default pause seconds (the parameter UI exposes 0-10)
    #[serde(default)]
    pub pause_sec: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            mode: PlayMode::Loop,
            speed: 1.0,
            pause_sec: 0.0,
        }
    }
}

/// Session limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LimitSettings {
    /// Maximum clips per session
    #[serde(default = "default_max_assets")]
    pub max_assets: usize,
    /// Maximum concurrent transcodes; 0 means "auto" (CPU count)
    #[serde(default)]
    pub max_concurrent_jobs: usize,
}

fn default_max_assets() -> usize {
    3
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_assets: 3,
            max_concurrent_jobs: 0,
        }
    }
}

impl EngineSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Intentionally tolerant: corrects bad values instead of failing.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        self.transcode.video_codec = normalize_enum(
            &self.transcode.video_codec,
            &["libx264", "libx265", "libvpx-vp9"],
            "libx264",
        );
        self.transcode.preset = normalize_enum(
            &self.transcode.preset,
            &[
                "ultrafast", "superfast", "veryfast", "faster", "fast", "medium", "slow",
            ],
            "veryfast",
        );
        self.transcode.crf = self.transcode.crf.clamp(0, 51);

        self.playback.speed = clamp_f64(self.playback.speed, 0.5, 3.0);
        self.playback.pause_sec = clamp_f64(self.playback.pause_sec, 0.0, 10.0);

        self.limits.max_assets = self.limits.max_assets.clamp(1, 16);
        self.limits.max_concurrent_jobs = self.limits.max_concurrent_jobs.clamp(0, 32);
    }

    /// Effective transcode concurrency, resolving "auto".
    pub fn effective_concurrency(&self) -> usize {
        if self.limits.max_concurrent_jobs == 0 {
            num_cpus::get().max(2)
        } else {
            self.limits.max_concurrent_jobs
        }
    }

    /// Default settings file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bannerloop").join(SETTINGS_FILE))
    }

    /// Loads settings from a file, falling back to defaults on any problem.
    pub fn load(path: &std::path::Path) -> Self {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<EngineSettings>(&raw) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "settings file corrupt, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        };
        settings.normalize();
        settings
    }

    /// Persists settings atomically.
    pub fn save(&self, path: &std::path::Path) -> CoreResult<()> {
        let mut normalized = self.clone();
        normalized.normalize();
        corefs::atomic_write_json_pretty(path, &normalized)
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: &str) -> String {
    if allowed.contains(&value) {
        value.to_string()
    } else {
        warn!(value, fallback, "unknown setting value, falling back");
        fallback.to_string()
    }
}
