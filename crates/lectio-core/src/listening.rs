//! Listening session controller.
//!
//! Owns the audio output and drives the narration cache for one listening
//! session at a time. Two generation counters guard asynchronous work: the
//! session token is bumped by `start`/`stop` and invalidates prefetch and every
//! pending play; the attempt token is bumped by each foreground play so a newer
//! chunk supersedes an older one. Results are committed under the state lock
//! only when both tokens are still current.

use crate::audio::AudioCache;
use crate::audio::output::AudioOutput;
use crate::cancellation::Generation;
use crate::error::{AudioError, PlaybackError};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    Inactive,
    Unlocking,
    Synthesizing(usize),
    Starting(usize),
    Playing(usize),
    Paused,
}

/// Coarse playback state exposed to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PlaybackState {
    Idle,
    Synthesizing,
    Starting,
    Playing,
    Paused,
}

impl From<ListeningState> for PlaybackState {
    fn from(state: ListeningState) -> Self {
        match state {
            ListeningState::Inactive => PlaybackState::Idle,
            ListeningState::Synthesizing(_) => PlaybackState::Synthesizing,
            ListeningState::Unlocking | ListeningState::Starting(_) => PlaybackState::Starting,
            ListeningState::Playing(_) => PlaybackState::Playing,
            ListeningState::Paused => PlaybackState::Paused,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ListeningView {
    pub state: PlaybackState,
    pub active: bool,
    pub chunk_index: Option<usize>,
    pub needs_tap: bool,
}

/// How a foreground play attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    Started(usize),
    /// The output wants a user gesture first.
    NeedsTap(usize),
    Failed(usize),
    /// A newer attempt or a stop overtook this one.
    Superseded,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeAction {
    Resumed,
    /// Nothing was loaded on the device; the chunk has to be played again.
    Replay(usize),
    Nothing,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    chunk: usize,
    session: u64,
    attempt: u64,
}

struct ControllerState {
    listening: ListeningState,
    foreground: Option<usize>,
    needs_tap: bool,
    paused_audio: bool,
    notice: Option<String>,
    notice_raised: bool,
    prefetch: Option<JoinHandle<()>>,
}

struct ControllerShared {
    cache: Arc<AudioCache>,
    output: Arc<dyn AudioOutput>,
    session: Generation,
    attempts: Generation,
    unlocked: AtomicBool,
    prefetch_ahead: bool,
    state: Mutex<ControllerState>,
}

impl ControllerShared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, attempt: &Attempt) -> bool {
        self.session.is_current(attempt.session) && self.attempts.is_current(attempt.attempt)
    }
}

#[derive(Clone)]
pub struct ListeningController {
    shared: Arc<ControllerShared>,
}

impl ListeningController {
    pub fn new(cache: Arc<AudioCache>, output: Arc<dyn AudioOutput>, prefetch_ahead: bool) -> Self {
        Self {
            shared: Arc::new(ControllerShared {
                cache,
                output,
                session: Generation::new(),
                attempts: Generation::new(),
                unlocked: AtomicBool::new(false),
                prefetch_ahead,
                state: Mutex::new(ControllerState {
                    listening: ListeningState::Inactive,
                    foreground: None,
                    needs_tap: false,
                    paused_audio: false,
                    notice: None,
                    notice_raised: false,
                    prefetch: None,
                }),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.shared.cache
    }

    pub fn state(&self) -> ListeningState {
        self.shared.lock().listening
    }

    pub fn is_active(&self) -> bool {
        self.state() != ListeningState::Inactive
    }

    pub fn is_unlocked(&self) -> bool {
        self.shared.unlocked.load(Ordering::Acquire)
    }

    pub fn view(&self) -> ListeningView {
        let state = self.shared.lock();
        ListeningView {
            state: state.listening.into(),
            active: state.listening != ListeningState::Inactive,
            chunk_index: state.foreground,
            needs_tap: state.needs_tap,
        }
    }

    /// The pending recoverable notice, left in place.
    pub fn notice(&self) -> Option<String> {
        self.shared.lock().notice.clone()
    }

    /// One-time recoverable notice, cleared once read.
    pub fn take_notice(&self) -> Option<String> {
        self.shared.lock().notice.take()
    }

    /// Muted priming playback from a user gesture. Remembered once it works;
    /// failures are tolerated.
    pub async fn unlock(&self) {
        if self.is_unlocked() {
            return;
        }
        {
            let mut state = self.shared.lock();
            if state.listening == ListeningState::Inactive {
                state.listening = ListeningState::Unlocking;
            }
        }
        match self.shared.output.unlock().await {
            Ok(()) => {
                self.shared.unlocked.store(true, Ordering::Release);
                debug!("Audio output unlocked");
            }
            Err(err) => debug!("Audio unlock attempt failed: {err}"),
        }
        let mut state = self.shared.lock();
        if state.listening == ListeningState::Unlocking {
            state.listening = ListeningState::Inactive;
        }
    }

    /// Start a session at `chunk` and play it.
    pub async fn start(&self, chunk: usize, total: usize) -> PlayOutcome {
        match self.begin(chunk, total) {
            Some(attempt) => self.run_attempt(attempt).await,
            None => PlayOutcome::Inactive,
        }
    }

    /// Like [`ListeningController::start`], with the foreground play running
    /// as its own task. State changes are visible before this returns.
    pub fn start_detached(&self, chunk: usize, total: usize) -> JoinHandle<PlayOutcome> {
        let attempt = self.begin(chunk, total);
        self.spawn_attempt(attempt)
    }

    fn begin(&self, chunk: usize, total: usize) -> Option<Attempt> {
        let session = self.shared.session.bump();
        self.shared.attempts.bump();
        self.shared.output.stop();
        self.shared.cache.release_all();
        self.shared.cache.set_header_chunk(chunk);
        {
            let mut state = self.shared.lock();
            state.listening = ListeningState::Synthesizing(chunk);
            state.foreground = Some(chunk);
            state.needs_tap = false;
            state.paused_audio = false;
            state.notice = None;
            state.notice_raised = false;
            if self.shared.prefetch_ahead && chunk + 1 < total {
                state.prefetch = Some(tokio::spawn(prefetch_ahead(
                    self.shared.clone(),
                    session,
                    chunk + 1,
                    total,
                )));
            }
        }
        info!(chunk, total, "Listening session started");
        self.prepare(chunk)
    }

    /// End the session: cancel everything, stop the device, free the cache.
    pub fn stop(&self) {
        let prefetch = {
            let mut state = self.shared.lock();
            self.shared.session.bump();
            self.shared.attempts.bump();
            let was_active = state.listening != ListeningState::Inactive;
            state.listening = ListeningState::Inactive;
            state.foreground = None;
            state.needs_tap = false;
            state.paused_audio = false;
            if was_active {
                info!("Listening session stopped");
            }
            state.prefetch.take()
        };
        drop(prefetch);
        self.shared.output.stop();
        self.shared.cache.release_all();
    }

    /// Stop the current audio but keep the session, e.g. after stepping back.
    pub fn interrupt(&self) {
        {
            let mut state = self.shared.lock();
            if state.listening == ListeningState::Inactive {
                return;
            }
            self.shared.attempts.bump();
            state.listening = ListeningState::Paused;
            state.paused_audio = false;
        }
        self.shared.output.stop();
    }

    /// Interrupt and move the foreground marker without playing.
    pub fn park_at(&self, chunk: usize) {
        self.interrupt();
        let mut state = self.shared.lock();
        if state.listening != ListeningState::Inactive {
            state.foreground = Some(chunk);
        }
    }

    pub fn pause(&self) -> bool {
        {
            let mut state = self.shared.lock();
            if !matches!(state.listening, ListeningState::Playing(_)) {
                return false;
            }
            state.listening = ListeningState::Paused;
            state.paused_audio = true;
        }
        self.shared.output.pause();
        true
    }

    pub fn resume(&self) -> ResumeAction {
        let action = {
            let mut state = self.shared.lock();
            match (state.listening, state.foreground) {
                (ListeningState::Paused, Some(chunk)) if state.paused_audio => {
                    state.listening = ListeningState::Playing(chunk);
                    state.paused_audio = false;
                    ResumeAction::Resumed
                }
                (ListeningState::Paused, Some(chunk)) => ResumeAction::Replay(chunk),
                _ => ResumeAction::Nothing,
            }
        };
        if action == ResumeAction::Resumed {
            self.shared.output.resume();
        }
        action
    }

    /// Stop the foreground audio, then synthesize if needed and play `chunk`.
    pub async fn play_chunk(&self, chunk: usize) -> PlayOutcome {
        match self.prepare(chunk) {
            Some(attempt) => self.run_attempt(attempt).await,
            None => PlayOutcome::Inactive,
        }
    }

    pub fn play_detached(&self, chunk: usize) -> JoinHandle<PlayOutcome> {
        let attempt = self.prepare(chunk);
        self.spawn_attempt(attempt)
    }

    fn spawn_attempt(&self, attempt: Option<Attempt>) -> JoinHandle<PlayOutcome> {
        let controller = self.clone();
        tokio::spawn(async move {
            match attempt {
                Some(attempt) => controller.run_attempt(attempt).await,
                None => PlayOutcome::Inactive,
            }
        })
    }

    fn prepare(&self, chunk: usize) -> Option<Attempt> {
        let attempt = {
            let mut state = self.shared.lock();
            if state.listening == ListeningState::Inactive {
                return None;
            }
            let attempt = Attempt {
                chunk,
                session: self.shared.session.current(),
                attempt: self.shared.attempts.bump(),
            };
            state.listening = ListeningState::Synthesizing(chunk);
            state.foreground = Some(chunk);
            state.needs_tap = false;
            state.paused_audio = false;
            attempt
        };
        self.shared.output.stop();
        Some(attempt)
    }

    async fn run_attempt(&self, attempt: Attempt) -> PlayOutcome {
        let chunk = attempt.chunk;
        let handle = match self.shared.cache.get(chunk).await {
            Ok(handle) => handle,
            Err(AudioError::Stale(_)) => {
                debug!(chunk, "Foreground synthesis went stale");
                return PlayOutcome::Superseded;
            }
            Err(err) => return self.fail(&attempt, err.to_string()),
        };

        {
            let mut state = self.shared.lock();
            if !self.shared.is_current(&attempt) {
                debug!(chunk, "Dropping superseded narration");
                return PlayOutcome::Superseded;
            }
            state.listening = ListeningState::Starting(chunk);
        }

        let result = self.shared.output.play(&handle, attempt.attempt).await;

        let mut state = self.shared.lock();
        if !self.shared.is_current(&attempt) {
            drop(state);
            if result.is_ok() {
                self.shared.output.cancel(attempt.attempt);
            }
            debug!(chunk, "Playback started after being superseded");
            return PlayOutcome::Superseded;
        }
        match result {
            Ok(()) => {
                state.listening = ListeningState::Playing(chunk);
                debug!(chunk, "Playing narration");
                PlayOutcome::Started(chunk)
            }
            Err(PlaybackError::Blocked) => {
                state.listening = ListeningState::Paused;
                state.needs_tap = true;
                debug!(chunk, "Playback needs a tap");
                PlayOutcome::NeedsTap(chunk)
            }
            Err(err) => {
                drop(state);
                self.fail(&attempt, err.to_string())
            }
        }
    }

    fn fail(&self, attempt: &Attempt, reason: String) -> PlayOutcome {
        let mut state = self.shared.lock();
        if !self.shared.is_current(attempt) {
            return PlayOutcome::Superseded;
        }
        state.listening = ListeningState::Paused;
        state.paused_audio = false;
        if state.notice_raised {
            debug!(chunk = attempt.chunk, "Narration failed again: {reason}");
        } else {
            warn!(chunk = attempt.chunk, "Narration failed: {reason}");
            state.notice = Some(format!("Narration is unavailable right now ({reason})."));
            state.notice_raised = true;
        }
        PlayOutcome::Failed(attempt.chunk)
    }

    /// Handle the device reporting the end of `attempt`'s audio. Returns the
    /// chunk that finished when the event is current.
    pub fn playback_ended(&self, attempt: u64) -> Option<usize> {
        let state = self.shared.lock();
        match state.listening {
            ListeningState::Playing(chunk) if self.shared.attempts.is_current(attempt) => {
                Some(chunk)
            }
            _ => {
                debug!(attempt, "Ignoring stale playback event");
                None
            }
        }
    }

    /// Wait for the current prefetch task to finish.
    pub async fn wait_for_prefetch(&self) {
        let prefetch = self.shared.lock().prefetch.take();
        if let Some(prefetch) = prefetch {
            let _ = prefetch.await;
        }
    }
}

async fn prefetch_ahead(shared: Arc<ControllerShared>, session: u64, from: usize, total: usize) {
    for index in from..total {
        tokio::task::yield_now().await;
        if !shared.session.is_current(session) {
            debug!(index, "Prefetch cancelled");
            return;
        }
        let foreground = shared.lock().foreground;
        if foreground.is_some_and(|current| index <= current) || shared.cache.contains(index) {
            continue;
        }
        match shared.cache.get(index).await {
            Ok(_) => debug!(chunk = index, "Prefetched narration"),
            Err(AudioError::Stale(_)) => return,
            Err(err) => {
                debug!(chunk = index, "Prefetch stopped: {err}");
                return;
            }
        }
    }
}
