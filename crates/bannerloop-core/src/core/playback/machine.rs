//! Ping-Pong Transition Table
//!
//! Pure state machine for one asset's playback. It performs no I/O: every
//! input returns the list of effects the driver must apply. Scheduled pauses
//! capture the generation counter at schedule time; a pause that fires after
//! the machine was reset is recognized as stale and ignored.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::assets::ReverseStatus;

// =============================================================================
// Configuration
// =============================================================================

/// Playback mode
///
/// Serialized as `"loop"` / `"ping-pong"`, the labels the parameter UI uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    /// Restart from the beginning on every stream end
    #[default]
    Loop,
    /// Alternate forward and reverse traversal
    PingPong,
}

/// Per-asset playback configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Playback mode
    pub mode: PlayMode,
    /// Speed multiplier, strictly positive
    pub speed: f64,
    /// Pause inserted at each direction change or loop restart, in seconds
    pub pause_sec: f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            mode: PlayMode::Loop,
            speed: 1.0,
            pause_sec: 0.0,
        }
    }
}

impl PlaybackConfig {
    /// Corrects invalid values instead of failing, so a bad config from the
    /// parameter UI can never wedge a controller.
    pub fn normalize(&mut self) {
        if !self.speed.is_finite() || self.speed <= 0.0 {
            warn!(speed = self.speed, "invalid speed multiplier, resetting to 1.0");
            self.speed = 1.0;
        }
        if !self.pause_sec.is_finite() || self.pause_sec < 0.0 {
            warn!(pause_sec = self.pause_sec, "invalid pause, resetting to 0");
            self.pause_sec = 0.0;
        }
    }
}

// =============================================================================
// States and Effects
// =============================================================================

/// Traversal direction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    Forward,
    Reverse,
}

/// Machine state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    /// Forward leg of a ping-pong cycle
    Forward,
    /// Waiting out the configured pause before the reverse leg
    PausedToReverse,
    /// Reverse leg, served from the pre-encoded reverse asset
    Reverse,
    /// Waiting out the configured pause before the forward leg
    PausedToForward,
    /// Plain loop mode (also the permanent fallback after a failed reverse)
    LoopForward,
}

/// Observable phase, as reported to the UI
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlayPhase {
    Playing,
    PausedBetween,
}

/// Effect the driver must apply after a transition
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Seek the stream for `direction` to its start, swap visibility to it
    /// and play at `rate`
    Play { direction: Direction, rate: f64 },
    /// Arm the pause timer; the firing callback must pass `generation` back
    SchedulePause { seconds: f64, generation: u64 },
}

// =============================================================================
// Machine
// =============================================================================

/// Transition table for one asset's playback.
#[derive(Debug)]
pub struct PingPongMachine {
    state: PlayState,
    config: PlaybackConfig,
    reverse: ReverseStatus,
    generation: u64,
    /// Pause pending inside `LoopForward` (the paused-between phase of a
    /// plain loop, which does not get its own state)
    loop_pause_pending: bool,
}

impl PingPongMachine {
    /// Creates the machine and returns the effects that start playback.
    pub fn new(mut config: PlaybackConfig, reverse: ReverseStatus) -> (Self, Vec<Action>) {
        config.normalize();
        let machine = Self {
            state: initial_state(&config),
            config,
            reverse,
            generation: 0,
            loop_pause_pending: false,
        };
        let actions = vec![machine.play(Direction::Forward)];
        (machine, actions)
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn reverse_status(&self) -> ReverseStatus {
        self.reverse
    }

    /// Current traversal direction.
    pub fn direction(&self) -> Direction {
        match self.state {
            PlayState::Reverse => Direction::Reverse,
            _ => Direction::Forward,
        }
    }

    /// Observable phase.
    pub fn phase(&self) -> PlayPhase {
        match self.state {
            PlayState::PausedToReverse | PlayState::PausedToForward => PlayPhase::PausedBetween,
            PlayState::LoopForward if self.loop_pause_pending => PlayPhase::PausedBetween,
            _ => PlayPhase::Playing,
        }
    }

    /// The visible stream finished its clip.
    pub fn on_stream_ended(&mut self) -> Vec<Action> {
        match self.state {
            PlayState::Forward => {
                if self.reverse.is_ready() {
                    self.enter_pause_or(PlayState::PausedToReverse, PlayState::Reverse)
                } else {
                    // Reverse copy still encoding or failed: restart forward
                    // from time zero immediately. This is the degraded loop
                    // the engine serves until the reverse asset arrives.
                    debug!(reverse = ?self.reverse, "reverse asset not ready, looping forward");
                    self.state = PlayState::Forward;
                    vec![self.play(Direction::Forward)]
                }
            }
            PlayState::Reverse => {
                self.enter_pause_or(PlayState::PausedToForward, PlayState::Forward)
            }
            PlayState::LoopForward => {
                if self.config.pause_sec > 0.0 {
                    self.loop_pause_pending = true;
                    vec![Action::SchedulePause {
                        seconds: self.config.pause_sec,
                        generation: self.generation,
                    }]
                } else {
                    vec![self.play(Direction::Forward)]
                }
            }
            // A stream cannot end while everything is paused; ignore.
            PlayState::PausedToReverse | PlayState::PausedToForward => Vec::new(),
        }
    }

    /// A previously scheduled pause elapsed.
    pub fn on_pause_elapsed(&mut self, generation: u64) -> Vec<Action> {
        if generation != self.generation {
            debug!(
                fired = generation,
                current = self.generation,
                "ignoring stale pause timer"
            );
            return Vec::new();
        }

        match self.state {
            PlayState::PausedToReverse => {
                self.state = PlayState::Reverse;
                vec![self.play(Direction::Reverse)]
            }
            PlayState::PausedToForward => {
                self.state = PlayState::Forward;
                vec![self.play(Direction::Forward)]
            }
            PlayState::LoopForward if self.loop_pause_pending => {
                self.loop_pause_pending = false;
                vec![self.play(Direction::Forward)]
            }
            _ => Vec::new(),
        }
    }

    /// The reverse asset became playable. Arms the reverse leg; takes effect
    /// on the next direction change.
    pub fn on_reverse_ready(&mut self) -> Vec<Action> {
        self.reverse = ReverseStatus::Ready;
        Vec::new()
    }

    /// The reverse asset can never arrive (pipeline failure or a reverse
    /// stream that refuses to decode). If a reverse entry was pending or
    /// active, resolve to forward without stalling.
    pub fn on_reverse_failed(&mut self) -> Vec<Action> {
        self.reverse = ReverseStatus::Failed;

        match self.state {
            PlayState::PausedToReverse | PlayState::Reverse => {
                // Invalidate any armed pause timer before restarting.
                self.generation += 1;
                self.state = initial_state(&self.config);
                self.loop_pause_pending = false;
                vec![self.play(Direction::Forward)]
            }
            // Already traversing forward; keep playing, no restart glitch.
            _ => Vec::new(),
        }
    }

    /// Applies a new configuration atomically, restarting from a clean
    /// forward state.
    pub fn reconfigure(&mut self, mut config: PlaybackConfig) -> Vec<Action> {
        config.normalize();
        self.generation += 1;
        self.config = config;
        self.state = initial_state(&self.config);
        self.loop_pause_pending = false;
        vec![self.play(Direction::Forward)]
    }

    fn play(&self, direction: Direction) -> Action {
        Action::Play {
            direction,
            rate: self.config.speed,
        }
    }

    fn enter_pause_or(&mut self, paused: PlayState, immediate: PlayState) -> Vec<Action> {
        if self.config.pause_sec > 0.0 {
            self.state = paused;
            vec![Action::SchedulePause {
                seconds: self.config.pause_sec,
                generation: self.generation,
            }]
        } else {
            self.state = immediate;
            let direction = match immediate {
                PlayState::Reverse => Direction::Reverse,
                _ => Direction::Forward,
            };
            vec![self.play(direction)]
        }
    }
}

fn initial_state(config: &PlaybackConfig) -> PlayState {
    match config.mode {
        PlayMode::Loop => PlayState::LoopForward,
        PlayMode::PingPong => PlayState::Forward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping_pong(speed: f64, pause_sec: f64) -> PlaybackConfig {
        PlaybackConfig {
            mode: PlayMode::PingPong,
            speed,
            pause_sec,
        }
    }

    fn assert_play(actions: &[Action], direction: Direction, rate: f64) {
        assert_eq!(
            actions,
            &[Action::Play { direction, rate }],
            "expected a single play action"
        );
    }

    #[test]
    fn starts_forward_and_plays() {
        let (machine, actions) = PingPongMachine::new(ping_pong(1.0, 0.0), ReverseStatus::Absent);
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 1.0);
    }

    #[test]
    fn loop_mode_starts_in_loop_forward() {
        let (machine, _) = PingPongMachine::new(PlaybackConfig::default(), ReverseStatus::Absent);
        assert_eq!(machine.state(), PlayState::LoopForward);
    }

    #[test]
    fn reverse_not_ready_self_loops_forward() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(2.0, 0.0), ReverseStatus::Pending);

        for _ in 0..3 {
            let actions = machine.on_stream_ended();
            assert_eq!(machine.state(), PlayState::Forward);
            assert_play(&actions, Direction::Forward, 2.0);
        }
    }

    #[test]
    fn zero_pause_enters_reverse_immediately() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.5, 0.0), ReverseStatus::Ready);

        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::Reverse);
        assert_eq!(machine.direction(), Direction::Reverse);
        assert_play(&actions, Direction::Reverse, 1.5);

        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 1.5);
    }

    #[test]
    fn pause_is_scheduled_between_directions() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 2.5), ReverseStatus::Ready);

        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::PausedToReverse);
        assert_eq!(machine.phase(), PlayPhase::PausedBetween);
        assert_eq!(
            actions,
            vec![Action::SchedulePause {
                seconds: 2.5,
                generation: 0
            }]
        );

        let actions = machine.on_pause_elapsed(0);
        assert_eq!(machine.state(), PlayState::Reverse);
        assert_play(&actions, Direction::Reverse, 1.0);
    }

    #[test]
    fn stale_pause_timer_is_ignored() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 5.0), ReverseStatus::Ready);

        machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::PausedToReverse);

        // Reconfigure supersedes the armed timer.
        let actions = machine.reconfigure(ping_pong(1.0, 5.0));
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 1.0);

        // The old timer fires afterwards; nothing may happen.
        assert!(machine.on_pause_elapsed(0).is_empty());
        assert_eq!(machine.state(), PlayState::Forward);
    }

    #[test]
    fn reverse_failure_mid_forward_keeps_looping() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 0.0), ReverseStatus::Pending);

        // Failure arrives while the forward leg is still playing.
        assert!(machine.on_reverse_failed().is_empty());

        // On forward end the machine must loop forward, never pause-to-reverse.
        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 1.0);
    }

    #[test]
    fn reverse_failure_during_pause_resolves_forward_without_stall() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 3.0), ReverseStatus::Ready);

        machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::PausedToReverse);
        let pause_generation = machine.generation();

        let actions = machine.on_reverse_failed();
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 1.0);

        // The superseded pause timer is now stale.
        assert!(machine.on_pause_elapsed(pause_generation).is_empty());
    }

    #[test]
    fn reverse_ready_arms_next_direction_change() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 0.0), ReverseStatus::Pending);

        // Still looping: the arming itself causes no transition.
        assert!(machine.on_reverse_ready().is_empty());
        assert_eq!(machine.state(), PlayState::Forward);

        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::Reverse);
        assert_play(&actions, Direction::Reverse, 1.0);
    }

    #[test]
    fn loop_mode_pauses_between_restarts() {
        let config = PlaybackConfig {
            mode: PlayMode::Loop,
            speed: 1.0,
            pause_sec: 1.0,
        };
        let (mut machine, _) = PingPongMachine::new(config, ReverseStatus::Absent);

        let actions = machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::LoopForward);
        assert_eq!(machine.phase(), PlayPhase::PausedBetween);
        assert!(matches!(actions[0], Action::SchedulePause { .. }));

        let actions = machine.on_pause_elapsed(machine.generation());
        assert_eq!(machine.phase(), PlayPhase::Playing);
        assert_play(&actions, Direction::Forward, 1.0);
    }

    #[test]
    fn loop_mode_never_enters_reverse_even_when_ready() {
        let config = PlaybackConfig {
            mode: PlayMode::Loop,
            speed: 1.0,
            pause_sec: 0.0,
        };
        let (mut machine, _) = PingPongMachine::new(config, ReverseStatus::Ready);

        for _ in 0..3 {
            let actions = machine.on_stream_ended();
            assert_eq!(machine.state(), PlayState::LoopForward);
            assert_play(&actions, Direction::Forward, 1.0);
        }
    }

    #[test]
    fn reconfigure_applies_new_speed_from_clean_state() {
        let (mut machine, _) = PingPongMachine::new(ping_pong(1.0, 0.0), ReverseStatus::Ready);
        machine.on_stream_ended();
        assert_eq!(machine.state(), PlayState::Reverse);

        let actions = machine.reconfigure(ping_pong(2.5, 0.0));
        assert_eq!(machine.state(), PlayState::Forward);
        assert_play(&actions, Direction::Forward, 2.5);

        // Reverse stays armed across reconfiguration.
        let actions = machine.on_stream_ended();
        assert_play(&actions, Direction::Reverse, 2.5);
    }

    #[test]
    fn normalize_corrects_bad_values() {
        let mut config = ping_pong(-3.0, f64::NAN);
        config.normalize();
        assert_eq!(config.speed, 1.0);
        assert_eq!(config.pause_sec, 0.0);
    }

    #[test]
    fn mode_serialization_uses_ui_labels() {
        assert_eq!(serde_json::to_string(&PlayMode::Loop).unwrap(), "\"loop\"");
        assert_eq!(
            serde_json::to_string(&PlayMode::PingPong).unwrap(),
            "\"ping-pong\""
        );
        let parsed: PlayMode = serde_json::from_str("\"ping-pong\"").unwrap();
        assert_eq!(parsed, PlayMode::PingPong);
    }
}
