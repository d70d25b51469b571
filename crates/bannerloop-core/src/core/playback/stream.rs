//! Decodable Stream Seam
//!
//! The engine never touches pixels; the embedding application implements
//! [`VideoStream`] over whatever decode surface it uses (a `<video>`
//! element, a GStreamer sink, a texture uploader). The controller holds one
//! implementation per direction and keeps the inactive one paused and
//! hidden, never destroyed, so switching direction costs no re-open latency.

use async_trait::async_trait;
use thiserror::Error;

/// Stream-level error types
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Stream source unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StreamResult<T> = Result<T, StreamError>;

/// One decodable video stream owned by a playback controller.
///
/// Implementations open their backing file lazily: the reverse stream's file
/// does not exist until the pipeline publishes it, so `prepare` is the point
/// where a missing or undecodable source surfaces as an error.
#[async_trait]
pub trait VideoStream: Send {
    /// Bring the stream to a "ready to display a frame" condition.
    ///
    /// Must be complete before the stream is made visible so a torn or
    /// undecoded frame is never shown.
    async fn prepare(&mut self) -> StreamResult<()>;

    /// Begin or resume playback at the given rate multiplier.
    async fn play(&mut self, rate: f64) -> StreamResult<()>;

    /// Pause playback, retaining the decode state.
    async fn pause(&mut self) -> StreamResult<()>;

    /// Seek back to the first frame.
    async fn rewind(&mut self) -> StreamResult<()>;

    /// Show or hide the stream. Cheap and synchronous; the controller hides
    /// the old stream and shows the new one in the same update.
    fn set_visible(&mut self, visible: bool);

    /// Whether the stream is currently shown.
    fn is_visible(&self) -> bool;
}
