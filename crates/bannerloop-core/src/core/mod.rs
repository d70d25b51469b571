//! BannerLoop Core Engine
//!
//! Core engine module. Handles asset storage, reverse transcoding,
//! playback state machines and session wiring.

pub mod assets;
pub mod ffmpeg;
pub mod fs;
pub mod jobs;
pub mod layout;
pub mod playback;
pub mod process;
pub mod session;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;
