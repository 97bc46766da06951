//! In-memory collaborators for unit tests.

use crate::api::{NarrationRequest, Narrator, NoteDraft, ReadingApi};
use crate::audio::AudioHandle;
use crate::audio::output::AudioOutput;
use crate::error::{ApiError, PlaybackError};
use crate::passage::{Bootstrap, Chunk, Passage, ReadingPosition, SectionKind};
use crate::progress::LocalPositions;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore};

pub fn sample_passage(reference: &str, chunks: usize) -> Passage {
    Passage {
        reference: reference.to_string(),
        translation: "TEST".to_string(),
        chunks: (0..chunks)
            .map(|index| Chunk {
                index,
                verses: vec![format!("{reference}:{}", index + 1)],
                text: format!("Chunk {index} of {reference}."),
            })
            .collect(),
    }
}

/// Local store that keeps every write, so tests can count records.
#[derive(Clone, Default)]
pub struct RecordingPositions {
    writes: Arc<Mutex<Vec<ReadingPosition>>>,
}

impl RecordingPositions {
    pub fn writes(&self) -> Vec<ReadingPosition> {
        self.writes.lock().unwrap().clone()
    }

    pub fn seed(&self, position: ReadingPosition) {
        self.writes.lock().unwrap().push(position);
    }
}

impl LocalPositions for RecordingPositions {
    fn load(&self, section: SectionKind, passage_ref: &str) -> Option<usize> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|position| position.matches(section, passage_ref))
            .map(|position| position.chunk_index)
    }

    fn save(&self, position: &ReadingPosition) -> anyhow::Result<()> {
        self.writes.lock().unwrap().push(position.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeApi {
    bootstrap: Mutex<Bootstrap>,
    passages: Mutex<HashMap<String, Passage>>,
    saved: Mutex<Vec<ReadingPosition>>,
    notes: Mutex<Vec<NoteDraft>>,
    fail_saves: AtomicBool,
    fail_notes: AtomicBool,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_passage(&self, passage: Passage) {
        self.passages
            .lock()
            .unwrap()
            .insert(passage.reference.clone(), passage);
    }

    pub fn set_bootstrap(&self, bootstrap: Bootstrap) {
        *self.bootstrap.lock().unwrap() = bootstrap;
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_notes(&self, fail: bool) {
        self.fail_notes.store(fail, Ordering::SeqCst);
    }

    pub fn saved_positions(&self) -> Vec<ReadingPosition> {
        self.saved.lock().unwrap().clone()
    }

    pub fn notes(&self) -> Vec<NoteDraft> {
        self.notes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingApi for FakeApi {
    async fn fetch_bootstrap(&self) -> Result<Bootstrap, ApiError> {
        Ok(self.bootstrap.lock().unwrap().clone())
    }

    async fn fetch_passage(
        &self,
        reference: &str,
        _translation: Option<&str>,
    ) -> Result<Passage, ApiError> {
        self.passages
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| ApiError::Status {
                status: 404,
                body: format!("no passage {reference}"),
            })
    }

    async fn save_resume_position(&self, position: &ReadingPosition) -> Result<(), ApiError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("offline".into()));
        }
        self.saved.lock().unwrap().push(position.clone());
        Ok(())
    }

    async fn create_note(&self, note: &NoteDraft) -> Result<(), ApiError> {
        if self.fail_notes.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("offline".into()));
        }
        self.notes.lock().unwrap().push(note.clone());
        Ok(())
    }
}

/// Narrator that echoes the script back as audio bytes.
#[derive(Default)]
pub struct FakeNarrator {
    requests: Mutex<Vec<NarrationRequest>>,
    calls_changed: Notify,
    failing: AtomicBool,
    fail_containing: Mutex<Option<String>>,
    gate: Option<Semaphore>,
}

impl FakeNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every synthesis blocks until [`FakeNarrator::open_gate`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        // A closed semaphore fails every acquire immediately, releasing all waiters.
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fail_text_containing(&self, needle: &str) {
        *self.fail_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.text.clone())
            .collect()
    }

    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let changed = self.calls_changed.notified();
            if self.calls() >= count {
                return;
            }
            changed.await;
        }
    }
}

#[async_trait]
impl Narrator for FakeNarrator {
    async fn synthesize(&self, request: &NarrationRequest) -> Result<Vec<u8>, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        self.calls_changed.notify_waiters();
        if let Some(gate) = &self.gate {
            let _ = gate.acquire().await;
        }
        let fails_on_text = self
            .fail_containing
            .lock()
            .unwrap()
            .as_deref()
            .is_some_and(|needle| request.text.contains(needle));
        if self.failing.load(Ordering::SeqCst) || fails_on_text {
            return Err(ApiError::Status {
                status: 503,
                body: "narration offline".into(),
            });
        }
        Ok(request.text.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Normal,
    Blocked,
    Failing,
}

/// Output that records what it was asked to play.
#[derive(Default)]
pub struct FakeOutput {
    mode: Mutex<OutputMode>,
    plays: Mutex<Vec<(usize, u64)>>,
    playing: Mutex<Option<(usize, u64)>>,
    paused: AtomicBool,
    unlocks: AtomicUsize,
    stops: AtomicUsize,
    cancels: Mutex<Vec<u64>>,
    play_calls: AtomicUsize,
    play_calls_changed: Notify,
    play_gate: Option<Semaphore>,
}

impl FakeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `play` blocks until [`FakeOutput::open_gate`].
    pub fn gated() -> Self {
        Self {
            play_gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn open_gate(&self) {
        if let Some(gate) = &self.play_gate {
            gate.close();
        }
    }

    pub async fn wait_for_play_calls(&self, count: usize) {
        loop {
            let changed = self.play_calls_changed.notified();
            if self.play_calls.load(Ordering::SeqCst) >= count {
                return;
            }
            changed.await;
        }
    }

    pub fn set_mode(&self, mode: OutputMode) {
        *self.mode.lock().unwrap() = mode;
    }

    /// `(chunk_index, attempt)` for every successful `play`.
    pub fn plays(&self) -> Vec<(usize, u64)> {
        self.plays.lock().unwrap().clone()
    }

    pub fn played_chunks(&self) -> Vec<usize> {
        self.plays().into_iter().map(|(chunk, _)| chunk).collect()
    }

    pub fn playing(&self) -> Option<(usize, u64)> {
        *self.playing.lock().unwrap()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn unlocks(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> Vec<u64> {
        self.cancels.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioOutput for FakeOutput {
    async fn unlock(&self) -> Result<(), PlaybackError> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn play(&self, handle: &AudioHandle, attempt: u64) -> Result<(), PlaybackError> {
        self.play_calls.fetch_add(1, Ordering::SeqCst);
        self.play_calls_changed.notify_waiters();
        if let Some(gate) = &self.play_gate {
            let _ = gate.acquire().await;
        }
        let mode = *self.mode.lock().unwrap();
        match mode {
            OutputMode::Blocked => Err(PlaybackError::Blocked),
            OutputMode::Failing => Err(PlaybackError::Failed("device lost".into())),
            OutputMode::Normal => {
                let entry = (handle.chunk_index(), attempt);
                self.plays.lock().unwrap().push(entry);
                *self.playing.lock().unwrap() = Some(entry);
                self.paused.store(false, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        *self.playing.lock().unwrap() = None;
    }

    fn cancel(&self, attempt: u64) {
        self.cancels.lock().unwrap().push(attempt);
        let mut playing = self.playing.lock().unwrap();
        if playing.is_some_and(|(_, current)| current == attempt) {
            *playing = None;
        }
    }
}
