//! Reading session coordinator.
//!
//! Binds reader intents to the cursor, the progress store, and the listening
//! controller. Every operation that moves the cursor records the new position
//! exactly once; rejected operations record nothing.

use crate::api::{NoteDraft, NoteType, ReadingApi};
use crate::audio::NarrationContext;
use crate::audio::output::PlaybackEvent;
use crate::cursor::{CheckpointKind, CursorState, PassageCursor};
use crate::error::SessionError;
use crate::listening::{
    ListeningController, ListeningView, PlayOutcome, PlaybackState, ResumeAction,
};
use crate::passage::{Bootstrap, ListeningPreferences, Passage, ReadingPosition, SectionKind};
use crate::progress::ProgressStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CursorView {
    Reading,
    AtCheckpoint,
    Complete,
}

impl From<CursorState> for CursorView {
    fn from(state: CursorState) -> Self {
        match state {
            CursorState::Reading(_) => CursorView::Reading,
            CursorState::AtCheckpoint(_) => CursorView::AtCheckpoint,
            CursorState::Complete => CursorView::Complete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PassageView {
    pub section: SectionKind,
    pub reference: String,
    pub translation: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub chunk_text: String,
    pub verses: Vec<String>,
    pub cursor: CursorView,
    pub checkpoint_kind: Option<CheckpointKind>,
    pub next_checkpoint: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReaderSnapshot {
    pub load_error: Option<String>,
    pub passage: Option<PassageView>,
    pub listening: ListeningView,
    pub notice: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SessionCommand {
    GetSnapshot,
    LoadToday {
        section: SectionKind,
    },
    LoadPassage {
        section: SectionKind,
        reference: String,
        translation: Option<String>,
    },
    GoNext,
    GoPrevious,
    ReachCheckpoint,
    ResolveCheckpoint {
        response: Option<String>,
    },
    CompleteSection,
    ToggleListening,
    RetryPlayback,
    PauseResume,
    SetPreferences {
        preferences: ListeningPreferences,
    },
}

impl SessionCommand {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetSnapshot => "reader_get_snapshot",
            Self::LoadToday { .. } => "reader_load_today",
            Self::LoadPassage { .. } => "reader_load_passage",
            Self::GoNext => "reader_go_next",
            Self::GoPrevious => "reader_go_previous",
            Self::ReachCheckpoint => "reader_reach_checkpoint",
            Self::ResolveCheckpoint { .. } => "reader_resolve_checkpoint",
            Self::CompleteSection => "reader_complete_section",
            Self::ToggleListening => "reader_toggle_listening",
            Self::RetryPlayback => "reader_retry_playback",
            Self::PauseResume => "reader_pause_resume",
            Self::SetPreferences { .. } => "reader_set_preferences",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub action: &'static str,
    pub snapshot: ReaderSnapshot,
}

/// Result of a cursor operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Moved(CursorState),
    Unchanged,
}

struct LoadedPassage {
    section: SectionKind,
    passage: Arc<Passage>,
    cursor: PassageCursor,
}

impl LoadedPassage {
    fn position(&self) -> ReadingPosition {
        ReadingPosition::new(
            self.section,
            self.passage.reference.clone(),
            self.cursor.position_index(),
        )
    }
}

pub struct ReadingSession {
    api: Arc<dyn ReadingApi>,
    progress: ProgressStore,
    listening: ListeningController,
    bootstrap: Option<Bootstrap>,
    preferences: ListeningPreferences,
    default_translation: String,
    loaded: Option<LoadedPassage>,
    load_error: Option<String>,
    foreground: Option<JoinHandle<PlayOutcome>>,
    pending_notes: Vec<JoinHandle<()>>,
}

impl ReadingSession {
    pub fn new(
        api: Arc<dyn ReadingApi>,
        progress: ProgressStore,
        listening: ListeningController,
        default_translation: impl Into<String>,
    ) -> Self {
        Self {
            api,
            progress,
            listening,
            bootstrap: None,
            preferences: ListeningPreferences::default(),
            default_translation: default_translation.into(),
            loaded: None,
            load_error: None,
            foreground: None,
            pending_notes: Vec::new(),
        }
    }

    pub fn listening(&self) -> &ListeningController {
        &self.listening
    }

    pub fn cursor_state(&self) -> Option<CursorState> {
        self.loaded.as_ref().map(|loaded| loaded.cursor.state())
    }

    pub fn bootstrap_data(&self) -> Option<&Bootstrap> {
        self.bootstrap.as_ref()
    }

    /// Fetch the resume record, listening preferences and today's references.
    pub async fn bootstrap(&mut self) -> Result<(), SessionError> {
        let bootstrap = match self.api.fetch_bootstrap().await {
            Ok(bootstrap) => bootstrap,
            Err(err) => {
                let err = SessionError::load("bootstrap", err);
                self.load_error = Some(err.to_string());
                return Err(err);
            }
        };
        info!(
            readings = bootstrap.today_references.len(),
            resume = bootstrap.resume_position.is_some(),
            "Bootstrapped reader"
        );
        self.progress.set_remote(bootstrap.resume_position.clone());
        self.set_preferences(bootstrap.listening_preferences.clone());
        self.load_error = None;
        self.bootstrap = Some(bootstrap);
        Ok(())
    }

    /// Load today's reading for `section`, bootstrapping first if needed.
    pub async fn load_today(&mut self, section: SectionKind) -> Result<(), SessionError> {
        if self.bootstrap.is_none() {
            self.bootstrap().await?;
        }
        let today = self
            .bootstrap
            .as_ref()
            .and_then(|bootstrap| bootstrap.today_for(section))
            .cloned();
        let Some(today) = today else {
            let err = SessionError::load(section.to_string(), "no reading scheduled for today");
            self.load_error = Some(err.to_string());
            return Err(err);
        };
        self.load_passage(section, &today.reference, today.translation.as_deref())
            .await
    }

    pub async fn load_passage(
        &mut self,
        section: SectionKind,
        reference: &str,
        translation: Option<&str>,
    ) -> Result<(), SessionError> {
        self.listening.stop();
        self.foreground = None;
        self.loaded = None;
        self.load_error = None;

        let translation = translation.unwrap_or(&self.default_translation).to_string();
        let passage = match self.api.fetch_passage(reference, Some(&translation)).await {
            Ok(passage) => passage.validated().map_err(|err| SessionError::load(reference, err)),
            Err(err) => Err(SessionError::load(reference, err)),
        };
        let passage = match passage {
            Ok(passage) => Arc::new(passage),
            Err(err) => {
                warn!(%section, reference, "Failed to load passage: {err}");
                self.load_error = Some(err.to_string());
                return Err(err);
            }
        };

        let total = passage.len();
        let start = self.progress.start_index(section, &passage.reference, total);
        let cursor = PassageCursor::resume(section, total, start);
        self.listening.cache().bind(NarrationContext {
            section,
            passage: passage.clone(),
            preferences: self.preferences.clone(),
        });
        info!(
            %section,
            reference = %passage.reference,
            total,
            start,
            "Loaded passage"
        );
        self.loaded = Some(LoadedPassage {
            section,
            passage,
            cursor,
        });
        self.record();
        Ok(())
    }

    pub fn go_next(&mut self) -> Transition {
        let Some(loaded) = self.loaded.as_mut() else {
            debug!("go_next ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let before = loaded.cursor.state();
        let after = loaded.cursor.advance();
        if after == before {
            debug!(?before, "go_next rejected");
            return Transition::Unchanged;
        }
        self.record();
        self.follow_with_audio(after);
        Transition::Moved(after)
    }

    /// Step back one chunk. Never auto-plays.
    pub fn go_previous(&mut self) -> Transition {
        let Some(loaded) = self.loaded.as_mut() else {
            debug!("go_previous ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let before = loaded.cursor.state();
        let after = loaded.cursor.retreat();
        if after == before {
            return Transition::Unchanged;
        }
        let index = loaded.cursor.position_index();
        self.record();
        self.listening.park_at(index);
        Transition::Moved(after)
    }

    /// Open the prompt of the trigger chunk being read.
    pub fn reach_checkpoint(&mut self) -> Transition {
        let Some(loaded) = self.loaded.as_mut() else {
            debug!("reach_checkpoint ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let before = loaded.cursor.state();
        let after = loaded.cursor.enter_checkpoint();
        if after == before {
            debug!(?before, "reach_checkpoint rejected");
            return Transition::Unchanged;
        }
        self.record();
        self.follow_with_audio(after);
        Transition::Moved(after)
    }

    /// Answer the open prompt and continue. A non-blank response is saved as
    /// a note in the background.
    pub fn resolve_checkpoint(&mut self, response: Option<String>) -> Transition {
        let Some(loaded) = self.loaded.as_mut() else {
            debug!("resolve_checkpoint ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let CursorState::AtCheckpoint(index) = loaded.cursor.state() else {
            debug!("resolve_checkpoint rejected: no open checkpoint");
            return Transition::Unchanged;
        };
        let kind = loaded.cursor.checkpoint_kind();
        let verse_ref = loaded
            .passage
            .chunk(index)
            .and_then(|chunk| chunk.verses.first().cloned())
            .unwrap_or_else(|| loaded.passage.reference.clone());
        let after = loaded.cursor.resolve_checkpoint();

        self.record();
        if let Some(body) = response.map(|body| body.trim().to_string()) {
            if !body.is_empty() {
                let note_type = match kind {
                    Some(CheckpointKind::Reflection) => NoteType::Reflection,
                    _ => NoteType::Response,
                };
                self.spawn_note(NoteDraft {
                    note_type,
                    verse_ref,
                    body,
                });
            }
        }
        self.follow_with_audio(after);
        Transition::Moved(after)
    }

    /// Finish the section from its last chunk.
    pub fn complete_section(&mut self) -> Transition {
        let Some(loaded) = self.loaded.as_mut() else {
            debug!("complete_section ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let before = loaded.cursor.state();
        let after = loaded.cursor.finish();
        if after == before {
            debug!(?before, "complete_section rejected");
            return Transition::Unchanged;
        }
        self.record();
        self.listening.stop();
        Transition::Moved(after)
    }

    /// Start narrating from the current chunk, or end the listening session.
    pub async fn toggle_listening(&mut self) -> Transition {
        let Some(loaded) = self.loaded.as_ref() else {
            debug!("toggle_listening ignored: no passage loaded");
            return Transition::Unchanged;
        };
        let state = loaded.cursor.state();
        let index = loaded.cursor.position_index();
        let total = loaded.cursor.total_chunks();

        if self.listening.is_active() {
            self.listening.stop();
            self.foreground = None;
        } else {
            self.listening.unlock().await;
            self.foreground = Some(self.listening.start_detached(index, total));
        }
        self.record();
        Transition::Moved(state)
    }

    /// Explicit tap after playback was blocked or failed.
    pub fn retry_playback(&mut self) {
        if !self.listening.is_active() {
            return;
        }
        let Some(loaded) = self.loaded.as_ref() else {
            return;
        };
        let index = self
            .listening
            .view()
            .chunk_index
            .unwrap_or_else(|| loaded.cursor.position_index());
        self.foreground = Some(self.listening.play_detached(index));
    }

    pub fn pause_resume(&mut self) {
        if self.listening.pause() {
            return;
        }
        if let ResumeAction::Replay(index) = self.listening.resume() {
            self.foreground = Some(self.listening.play_detached(index));
        }
    }

    /// Output notifications. A finished chunk advances the cursor, which
    /// plays the next chunk. A finished checkpoint chunk parks until the
    /// reader answers the prompt.
    pub fn on_playback_event(&mut self, event: PlaybackEvent) -> Transition {
        match event {
            PlaybackEvent::Ended { attempt } => {
                let Some(chunk) = self.listening.playback_ended(attempt) else {
                    return Transition::Unchanged;
                };
                match self.loaded.as_ref().map(|loaded| loaded.cursor.state()) {
                    Some(CursorState::Reading(index)) if index == chunk => self.go_next(),
                    Some(CursorState::AtCheckpoint(index)) if index == chunk => {
                        debug!(chunk, "Checkpoint narrated; waiting for the reader");
                        self.listening.park_at(chunk);
                        Transition::Unchanged
                    }
                    _ => {
                        debug!(chunk, "Narration ended away from the cursor");
                        Transition::Unchanged
                    }
                }
            }
        }
    }

    pub fn set_preferences(&mut self, preferences: ListeningPreferences) {
        let disabled = !preferences.enabled;
        self.listening.cache().set_preferences(preferences.clone());
        self.preferences = preferences;
        if disabled && self.listening.is_active() {
            info!("Listening disabled; ending session");
            self.listening.stop();
            self.foreground = None;
        }
    }

    /// Wait for the latest foreground play to settle.
    pub async fn settle_playback(&mut self) -> Option<PlayOutcome> {
        let foreground = self.foreground.take()?;
        match foreground.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                warn!("Foreground playback task failed: {err}");
                None
            }
        }
    }

    /// Current view state. A pending notice is included but left in place;
    /// [`ReadingSession::apply_command`] hands it out once.
    pub fn snapshot(&self) -> ReaderSnapshot {
        let passage = self.loaded.as_ref().map(|loaded| {
            let index = loaded.cursor.position_index();
            let chunk = loaded.passage.chunk(index);
            PassageView {
                section: loaded.section,
                reference: loaded.passage.reference.clone(),
                translation: loaded.passage.translation.clone(),
                chunk_index: index,
                total_chunks: loaded.cursor.total_chunks(),
                chunk_text: chunk.map(|chunk| chunk.text.clone()).unwrap_or_default(),
                verses: chunk.map(|chunk| chunk.verses.clone()).unwrap_or_default(),
                cursor: loaded.cursor.state().into(),
                checkpoint_kind: loaded.cursor.checkpoint_kind(),
                next_checkpoint: loaded.cursor.next_checkpoint(),
            }
        });
        ReaderSnapshot {
            load_error: self.load_error.clone(),
            passage,
            listening: self.listening.view(),
            notice: self.listening.notice(),
        }
    }

    pub async fn apply_command(&mut self, command: SessionCommand) -> SessionEvent {
        let action = command.action();
        match command {
            SessionCommand::GetSnapshot => {}
            SessionCommand::LoadToday { section } => {
                if let Err(err) = self.load_today(section).await {
                    debug!(action, "{err}");
                }
            }
            SessionCommand::LoadPassage {
                section,
                reference,
                translation,
            } => {
                if let Err(err) = self
                    .load_passage(section, &reference, translation.as_deref())
                    .await
                {
                    debug!(action, "{err}");
                }
            }
            SessionCommand::GoNext => {
                self.go_next();
            }
            SessionCommand::GoPrevious => {
                self.go_previous();
            }
            SessionCommand::ReachCheckpoint => {
                self.reach_checkpoint();
            }
            SessionCommand::ResolveCheckpoint { response } => {
                self.resolve_checkpoint(response);
            }
            SessionCommand::CompleteSection => {
                self.complete_section();
            }
            SessionCommand::ToggleListening => {
                self.toggle_listening().await;
            }
            SessionCommand::RetryPlayback => self.retry_playback(),
            SessionCommand::PauseResume => self.pause_resume(),
            SessionCommand::SetPreferences { preferences } => self.set_preferences(preferences),
        }
        let mut snapshot = self.snapshot();
        snapshot.notice = self.listening.take_notice();
        SessionEvent { action, snapshot }
    }

    /// Stop listening, wait for background notes, and flush remote saves.
    pub async fn shutdown(&mut self) {
        self.listening.stop();
        self.foreground = None;
        for note in self.pending_notes.drain(..) {
            if let Err(err) = note.await {
                warn!("Note task failed: {err}");
            }
        }
        self.progress.close().await;
        info!("Reading session closed");
    }

    fn record(&mut self) {
        if let Some(loaded) = &self.loaded {
            let position = loaded.position();
            debug!(
                section = %position.section,
                passage = %position.passage_ref,
                chunk = position.chunk_index,
                "Recording position"
            );
            self.progress.record_position(position);
        }
    }

    fn follow_with_audio(&mut self, state: CursorState) {
        if !self.listening.is_active() {
            return;
        }
        match state {
            CursorState::Reading(index) => {
                self.foreground = Some(self.listening.play_detached(index));
            }
            CursorState::AtCheckpoint(index) => {
                let view = self.listening.view();
                let narrating = view.chunk_index == Some(index)
                    && matches!(
                        view.state,
                        PlaybackState::Synthesizing | PlaybackState::Starting | PlaybackState::Playing
                    );
                if !narrating {
                    self.foreground = Some(self.listening.play_detached(index));
                }
            }
            CursorState::Complete => {
                self.listening.stop();
                self.foreground = None;
            }
        }
    }

    fn spawn_note(&mut self, note: NoteDraft) {
        self.pending_notes.retain(|task| !task.is_finished());
        let api = self.api.clone();
        self.pending_notes.push(tokio::spawn(async move {
            match api.create_note(&note).await {
                Ok(()) => debug!(verse = %note.verse_ref, "Saved checkpoint note"),
                Err(err) => warn!(verse = %note.verse_ref, "Failed to save checkpoint note: {err}"),
            }
        }));
    }
}
