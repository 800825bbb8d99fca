//! Seek coordination between a logical "jump to" request and a player.
//!
//! A seek flips the loading overlay on immediately, repositions the player and
//! resumes playback. The overlay clears [`SETTLE_DELAY`] after playback is
//! known to have resumed: after the player's seek-completed notification when
//! the backend has one, otherwise after a countdown started together with the
//! seek. Only one countdown is ever pending; a newer seek supersedes it and
//! dropping the coordinator cancels it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::catalog::Asset;
use crate::timecode::{TimeValue, ZERO_LABEL, format_seconds, format_short, parse_timecode};

pub const SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Upper bound on waiting for a completion notification before falling back
/// to the plain countdown.
pub const COMPLETION_GUARD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct SeekRequest {
    pub target_seconds: f64,
    pub label: String,
    /// 1-based chapter position, or 0 when the seek has no chapter context.
    pub segment: u32,
}

impl SeekRequest {
    pub fn new(target_seconds: f64, label: impl Into<String>, segment: u32) -> Self {
        Self {
            target_seconds,
            label: label.into(),
            segment,
        }
    }

    /// Request for a stored timecode, labelled with its short display form.
    pub fn at(value: &TimeValue, segment: u32) -> Self {
        Self::new(parse_timecode(value), format_short(value), segment)
    }

    /// Request for a raw offset, labelled `MM:SS`.
    pub fn at_seconds(seconds: f64) -> Self {
        Self::new(seconds, format_seconds(seconds), 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadingState {
    pub is_loading: bool,
    pub segment: u32,
    pub label: String,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::idle()
    }
}

impl LoadingState {
    pub fn idle() -> Self {
        Self {
            is_loading: false,
            segment: 0,
            label: ZERO_LABEL.to_owned(),
        }
    }

    fn seeking(request: &SeekRequest) -> Self {
        Self {
            is_loading: true,
            segment: request.segment,
            label: request.label.clone(),
        }
    }

    /// Headline for the loading overlay, `None` while idle.
    pub fn overlay_text(&self) -> Option<String> {
        if !self.is_loading {
            return None;
        }
        Some(if self.segment > 0 {
            format!("Loading segment {}", self.segment)
        } else {
            "Seeking to time".to_owned()
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    SeekTo(f64),
    Play,
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player is no longer attached")]
    Detached,
}

/// A playback surface the coordinator can drive.
pub trait Player: Send + Sync {
    fn seek_to(&self, seconds: f64) -> Result<(), PlayerError>;

    fn play(&self) -> Result<(), PlayerError>;

    /// Arms a one-time notification for the next finished seek. Backends that
    /// cannot report one return `None`.
    fn seek_completion(&self) -> Option<oneshot::Receiver<()>>;

    /// Called by whatever drives the real player once a seek has landed.
    fn seeked(&self) {}
}

/// Forwards commands to whatever drives the real player.
#[derive(Clone)]
struct CommandSink(mpsc::UnboundedSender<PlayerCommand>);

impl CommandSink {
    fn send(&self, command: PlayerCommand) -> Result<(), PlayerError> {
        self.0.send(command).map_err(|_| PlayerError::Detached)
    }
}

/// Native media element: reports finished seeks.
pub struct ElementPlayer {
    commands: CommandSink,
    pending: Mutex<Option<oneshot::Sender<()>>>,
}

impl ElementPlayer {
    pub fn new(commands: mpsc::UnboundedSender<PlayerCommand>) -> Self {
        Self {
            commands: CommandSink(commands),
            pending: Mutex::new(None),
        }
    }
}

impl Player for ElementPlayer {
    fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        self.commands.send(PlayerCommand::SeekTo(seconds))
    }

    fn play(&self) -> Result<(), PlayerError> {
        self.commands.send(PlayerCommand::Play)
    }

    fn seek_completion(&self) -> Option<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        // Replacing drops any earlier sender, which resolves its receiver.
        *self.pending.lock() = Some(tx);
        Some(rx)
    }

    fn seeked(&self) {
        if let Some(tx) = self.pending.lock().take() {
            let _ = tx.send(());
        }
    }
}

/// Embedded third-party widget: accepts commands, never confirms them.
pub struct EmbedPlayer {
    commands: CommandSink,
}

impl EmbedPlayer {
    pub fn new(commands: mpsc::UnboundedSender<PlayerCommand>) -> Self {
        Self {
            commands: CommandSink(commands),
        }
    }
}

impl Player for EmbedPlayer {
    fn seek_to(&self, seconds: f64) -> Result<(), PlayerError> {
        self.commands.send(PlayerCommand::SeekTo(seconds))
    }

    fn play(&self) -> Result<(), PlayerError> {
        self.commands.send(PlayerCommand::Play)
    }

    fn seek_completion(&self) -> Option<oneshot::Receiver<()>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Element,
    Embed,
}

/// External assets with a resolvable video id play in the embed, everything
/// else in a native element.
pub fn player_kind(asset: &Asset) -> PlayerKind {
    if asset.is_external() && asset.youtube_id().is_some() {
        PlayerKind::Embed
    } else {
        PlayerKind::Element
    }
}

pub fn player_for(
    asset: &Asset,
    commands: mpsc::UnboundedSender<PlayerCommand>,
) -> Arc<dyn Player> {
    match player_kind(asset) {
        PlayerKind::Element => Arc::new(ElementPlayer::new(commands)),
        PlayerKind::Embed => Arc::new(EmbedPlayer::new(commands)),
    }
}

#[derive(Default)]
struct Countdown {
    generation: u64,
    closed: bool,
    task: Option<JoinHandle<()>>,
}

pub struct SeekCoordinator {
    player: Arc<dyn Player>,
    state: Arc<watch::Sender<LoadingState>>,
    countdown: Arc<Mutex<Countdown>>,
    settle: Duration,
    guard: Duration,
}

impl SeekCoordinator {
    pub fn new(player: Arc<dyn Player>) -> Self {
        Self::with_delays(player, SETTLE_DELAY, COMPLETION_GUARD)
    }

    pub fn with_delays(player: Arc<dyn Player>, settle: Duration, guard: Duration) -> Self {
        let (state, _) = watch::channel(LoadingState::idle());
        Self {
            player,
            state: Arc::new(state),
            countdown: Arc::new(Mutex::new(Countdown::default())),
            settle,
            guard,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadingState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LoadingState {
        self.state.borrow().clone()
    }

    /// Whether a countdown (or a wait for seek completion) is outstanding.
    pub fn has_pending(&self) -> bool {
        self.countdown
            .lock()
            .task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Starts a seek. Must be called from within a tokio runtime.
    pub fn seek(&self, request: SeekRequest) {
        let generation = {
            let mut countdown = self.countdown.lock();
            if let Some(task) = countdown.task.take() {
                task.abort();
            }
            countdown.generation += 1;
            countdown.generation
        };

        self.state.send_replace(LoadingState::seeking(&request));

        let completion = self.player.seek_completion();
        let repositioned = match self.player.seek_to(request.target_seconds) {
            Ok(()) => true,
            Err(err) => {
                warn!(seconds = request.target_seconds, "seek command failed: {err}");
                false
            }
        };
        if let Err(err) = self.player.play() {
            debug!("play command failed: {err}");
        }

        let completion = completion.filter(|_| repositioned);
        let player = self.player.clone();
        let state = self.state.clone();
        let countdown = self.countdown.clone();
        let settle = self.settle;
        let guard = self.guard;

        let task = tokio::spawn(async move {
            if let Some(completion) = completion {
                match tokio::time::timeout(guard, completion).await {
                    Ok(Ok(())) => {
                        if let Err(err) = player.play() {
                            debug!("resume after seek failed: {err}");
                        }
                    }
                    Ok(Err(_)) => debug!("seek completion was abandoned"),
                    Err(_) => debug!("no seek completion within {guard:?}"),
                }
            }

            tokio::time::sleep(settle).await;

            let countdown = countdown.lock();
            if countdown.generation == generation && !countdown.closed {
                state.send_replace(LoadingState::idle());
            }
        });

        let mut countdown = self.countdown.lock();
        if countdown.generation == generation {
            countdown.task = Some(task);
        } else {
            task.abort();
        }
    }
}

impl Drop for SeekCoordinator {
    fn drop(&mut self) {
        let mut countdown = self.countdown.lock();
        countdown.closed = true;
        if let Some(task) = countdown.task.take() {
            task.abort();
        }
    }
}
