//! Playback Controller
//!
//! Async driver for one asset's [`PingPongMachine`]. Owns the forward and
//! reverse stream handles, the pause timer and the pipeline event
//! subscription. All transitions for one controller run on a single task, so
//! no two ever execute concurrently; stale pause timers are filtered by the
//! machine's generation counter.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::core::assets::ReverseStatus;
use crate::core::AssetId;
use crate::events::{PipelineEvent, PipelinePhase};

use super::{Action, Direction, PingPongMachine, PlaybackConfig, StreamResult, VideoStream};

/// Commands accepted by a running controller
#[derive(Debug)]
enum ControllerCommand {
    /// Re-apply mode/speed/pause atomically, restarting forward
    Reconfigure(PlaybackConfig),
    /// The visible stream finished its clip
    StreamEnded,
    /// Stop all timers and streams and exit
    Dispose,
}

/// Handle to a running per-asset playback controller.
///
/// Dropping the handle disposes the controller; calling [`dispose`] any
/// number of times, in any state, is safe.
///
/// [`dispose`]: PlaybackController::dispose
pub struct PlaybackController {
    asset_id: AssetId,
    command_tx: mpsc::UnboundedSender<ControllerCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackController {
    /// Spawns the controller task and starts forward playback.
    pub fn spawn(
        asset_id: &str,
        config: PlaybackConfig,
        reverse_status: ReverseStatus,
        forward: Box<dyn VideoStream>,
        reverse: Box<dyn VideoStream>,
        pipeline_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (machine, initial) = PingPongMachine::new(config, reverse_status);

        let driver = Driver {
            asset_id: asset_id.to_string(),
            machine,
            forward,
            reverse,
            pending_pause: None,
        };
        let task = tokio::spawn(run(driver, command_rx, pipeline_rx, initial));

        Self {
            asset_id: asset_id.to_string(),
            command_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Applies a new configuration atomically. Playback restarts from a
    /// clean forward state; any armed pause timer is superseded.
    pub fn reconfigure(&self, config: PlaybackConfig) {
        let _ = self.command_tx.send(ControllerCommand::Reconfigure(config));
    }

    /// Notifies the controller that the visible stream reached its end.
    pub fn notify_stream_ended(&self) {
        let _ = self.command_tx.send(ControllerCommand::StreamEnded);
    }

    /// Stops timers and streams and releases the task. Idempotent, safe to
    /// call in any state, and never blocked by an in-flight transcode.
    pub fn dispose(&self) {
        let _ = self.command_tx.send(ControllerCommand::Dispose);
    }

    /// Waits for the controller task to finish (after [`dispose`]).
    ///
    /// [`dispose`]: PlaybackController::dispose
    pub async fn join(&self) {
        let task = self.task.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.dispose();
    }
}

// =============================================================================
// Driver
// =============================================================================

struct Driver {
    asset_id: AssetId,
    machine: PingPongMachine,
    forward: Box<dyn VideoStream>,
    reverse: Box<dyn VideoStream>,
    /// Armed pause timer: deadline plus the generation captured at schedule
    /// time
    pending_pause: Option<(Instant, u64)>,
}

async fn run(
    mut driver: Driver,
    mut command_rx: mpsc::UnboundedReceiver<ControllerCommand>,
    mut pipeline_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    initial: Vec<Action>,
) {
    driver.apply(initial).await;
    let mut pipeline_open = true;

    loop {
        let pause_deadline = driver.pending_pause.map(|(deadline, _)| deadline);

        tokio::select! {
            command = command_rx.recv() => match command {
                Some(ControllerCommand::Reconfigure(config)) => {
                    driver.pending_pause = None;
                    let actions = driver.machine.reconfigure(config);
                    driver.apply(actions).await;
                }
                Some(ControllerCommand::StreamEnded) => {
                    let actions = driver.machine.on_stream_ended();
                    driver.apply(actions).await;
                }
                Some(ControllerCommand::Dispose) | None => break,
            },
            event = pipeline_rx.recv(), if pipeline_open => match event {
                Some(event) => driver.on_pipeline_event(event).await,
                None => pipeline_open = false,
            },
            _ = sleep_until_deadline(pause_deadline), if pause_deadline.is_some() => {
                if let Some((_, generation)) = driver.pending_pause.take() {
                    let actions = driver.machine.on_pause_elapsed(generation);
                    driver.apply(actions).await;
                }
            }
        }
    }

    driver.shutdown().await;
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

impl Driver {
    async fn apply(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Play { direction, rate } => {
                    if let Err(err) = self.swap_to(direction, rate).await {
                        match direction {
                            // A reverse stream that refuses to decode is the
                            // same as a reverse asset that never arrived.
                            Direction::Reverse => {
                                warn!(
                                    asset_id = %self.asset_id,
                                    error = %err,
                                    "reverse stream failed to start, falling back to forward loop"
                                );
                                queue.extend(self.machine.on_reverse_failed());
                            }
                            Direction::Forward => {
                                error!(
                                    asset_id = %self.asset_id,
                                    error = %err,
                                    "forward stream failed to start"
                                );
                            }
                        }
                    }
                }
                Action::SchedulePause {
                    seconds,
                    generation,
                } => {
                    let deadline = Instant::now() + Duration::from_secs_f64(seconds);
                    self.pending_pause = Some((deadline, generation));
                }
            }
        }
    }

    /// Seek the target stream to its start, swap visibility to it and play.
    ///
    /// The new stream must report ready-to-display before it is shown; the
    /// old stream is hidden in the same update, so the swap is atomic from
    /// the caller's perspective.
    async fn swap_to(&mut self, direction: Direction, rate: f64) -> StreamResult<()> {
        let Driver {
            forward, reverse, ..
        } = self;
        let (next, prev) = match direction {
            Direction::Forward => (forward, reverse),
            Direction::Reverse => (reverse, forward),
        };

        next.rewind().await?;
        next.prepare().await?;

        let _ = prev.pause().await;
        prev.set_visible(false);
        next.set_visible(true);
        next.play(rate).await?;
        Ok(())
    }

    async fn on_pipeline_event(&mut self, event: PipelineEvent) {
        match event.phase {
            PipelinePhase::Completed => {
                debug!(asset_id = %self.asset_id, "reverse asset ready, arming reverse leg");
                let actions = self.machine.on_reverse_ready();
                self.apply(actions).await;
            }
            PipelinePhase::Failed => {
                warn!(
                    asset_id = %self.asset_id,
                    error = event.error.as_deref().unwrap_or("unknown"),
                    "reverse transcode failed, staying in forward loop"
                );
                let actions = self.machine.on_reverse_failed();
                self.apply(actions).await;
            }
            PipelinePhase::Started | PipelinePhase::Progress => {
                trace!(
                    asset_id = %self.asset_id,
                    percent = ?event.percent,
                    "reverse transcode progress"
                );
            }
        }
    }

    /// Stops both decodes. Hidden is not enough on teardown.
    async fn shutdown(&mut self) {
        self.pending_pause = None;
        let _ = self.forward.pause().await;
        self.forward.set_visible(false);
        let _ = self.reverse.pause().await;
        self.reverse.set_visible(false);
        debug!(asset_id = %self.asset_id, "playback controller disposed");
    }
}
