//! BannerLoop Core Library
//!
//! Engine for previewing banner compositions built from multiple
//! independently-controlled video overlays. Clips configured for ping-pong
//! playback alternate forward and backward traversal forever; the backward
//! half is served from a pre-encoded reverse copy produced asynchronously by
//! an ffmpeg pipeline while the forward copy already plays.
//!
//! The crate is headless: windowing, file dialogs and drag interactions live
//! in the embedding application, which implements the
//! [`core::playback::VideoStream`] seam and consumes the engine's event
//! surface.

pub mod core;
pub mod events;

pub use crate::core::assets::{MediaAsset, ReverseStatus, StorageHandle};
pub use crate::core::jobs::{ConversionJob, JobState, TranscodePipeline};
pub use crate::core::playback::{
    Direction, PlayMode, PlayState, PlaybackConfig, PlaybackController, VideoStream,
};
pub use crate::core::session::PreviewSession;
pub use crate::core::{CoreError, CoreResult};
pub use crate::events::{EventBus, PipelineEvent, PipelinePhase};
