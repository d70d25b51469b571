//! Playback Module
//!
//! Per-asset ping-pong playback: a pure transition table
//! ([`PingPongMachine`]) drives which of two decodable streams is visible and
//! playing, and an async controller ([`PlaybackController`]) owns the
//! streams, timers and event subscriptions that realize those transitions.

mod controller;
mod machine;
mod stream;

pub use controller::*;
pub use machine::*;
pub use stream::*;
