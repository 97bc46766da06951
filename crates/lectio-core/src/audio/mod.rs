//! Per-passage narration cache.
//!
//! Synthesized chunks are spooled to disk and handed out as cheap shared
//! handles. Concurrent requests for the same chunk join one in-flight
//! synthesis. [`AudioCache::release_all`] bumps the cache epoch, so work that
//! finishes afterwards is discarded instead of repopulating the map.

pub mod output;
pub mod rodio_output;

use crate::api::{NarrationRequest, Narrator};
use crate::cancellation::Generation;
use crate::error::AudioError;
use crate::narration::script_for_chunk;
use crate::passage::{ListeningPreferences, Passage, SectionKind};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// A playable narration resource. Clones share the same underlying file.
#[derive(Clone, Debug)]
pub struct AudioHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    chunk_index: usize,
    epoch: u64,
    path: PathBuf,
    byte_len: usize,
}

impl AudioHandle {
    fn new(chunk_index: usize, epoch: u64, path: PathBuf, byte_len: usize) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                chunk_index,
                epoch,
                path,
                byte_len,
            }),
        }
    }

    pub fn chunk_index(&self) -> usize {
        self.inner.chunk_index
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn byte_len(&self) -> usize {
        self.inner.byte_len
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch
    }

    /// True when both handles came from the same synthesis.
    pub fn same_resource(&self, other: &AudioHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.inner.path).await
    }
}

/// What the cache builds scripts from.
#[derive(Clone, Debug)]
pub struct NarrationContext {
    pub section: SectionKind,
    pub passage: Arc<Passage>,
    pub preferences: ListeningPreferences,
}

type SynthesisFuture = Shared<BoxFuture<'static, Result<AudioHandle, AudioError>>>;

enum Slot {
    Ready(AudioHandle),
    Pending { ticket: u64, future: SynthesisFuture },
}

#[derive(Default)]
struct CacheState {
    next_ticket: u64,
    context: Option<NarrationContext>,
    header_chunk: Option<usize>,
    slots: HashMap<usize, Slot>,
}

pub struct AudioCache {
    narrator: Arc<dyn Narrator>,
    spool_dir: PathBuf,
    epoch: Generation,
    state: Mutex<CacheState>,
}

impl AudioCache {
    pub fn new(narrator: Arc<dyn Narrator>, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            narrator,
            spool_dir: spool_dir.into(),
            epoch: Generation::new(),
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Point the cache at a new passage. Drops everything cached for the
    /// previous one.
    pub fn bind(&self, context: NarrationContext) {
        self.release_all();
        self.lock().context = Some(context);
    }

    pub fn set_preferences(&self, preferences: ListeningPreferences) {
        if let Some(context) = self.lock().context.as_mut() {
            context.preferences = preferences;
        }
    }

    /// Chunk whose script carries the spoken header.
    pub fn set_header_chunk(&self, index: usize) {
        self.lock().header_chunk = Some(index);
    }

    pub fn contains(&self, index: usize) -> bool {
        matches!(self.lock().slots.get(&index), Some(Slot::Ready(_)))
    }

    /// Number of completed handles.
    pub fn len(&self) -> usize {
        self.lock()
            .slots
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the handle for chunk `index`, synthesizing it on a miss.
    pub async fn get(&self, index: usize) -> Result<AudioHandle, AudioError> {
        let (ticket, future) = {
            let mut state = self.lock();
            let context = state.context.clone().ok_or_else(|| {
                AudioError::SynthesisUnavailable("no passage is bound".to_string())
            })?;
            if !context.preferences.enabled {
                return Err(AudioError::SynthesisUnavailable(
                    "listening is disabled".to_string(),
                ));
            }
            match state.slots.get(&index) {
                Some(Slot::Ready(handle)) => return Ok(handle.clone()),
                Some(Slot::Pending { ticket, future }) => {
                    debug!(chunk = index, "Joining in-flight synthesis");
                    (*ticket, future.clone())
                }
                None => {
                    let chunk = context.passage.chunk(index).ok_or_else(|| {
                        AudioError::SynthesisUnavailable(format!(
                            "chunk {index} is outside {}",
                            context.passage.reference
                        ))
                    })?;
                    let with_header = state.header_chunk == Some(index);
                    let request = NarrationRequest {
                        text: script_for_chunk(
                            context.section,
                            &context.passage,
                            chunk,
                            with_header,
                        ),
                        voice: context.preferences.voice.clone(),
                        style: context.preferences.style.clone(),
                        speed: context.preferences.speed,
                    };
                    let token = self.epoch.current();
                    let path = self
                        .spool_dir
                        .join(format!("chunk-{index:03}-e{token}.audio"));
                    let ticket = state.next_ticket;
                    state.next_ticket += 1;
                    let future = synthesize_to_file(
                        self.narrator.clone(),
                        request,
                        path,
                        index,
                        token,
                        self.epoch.clone(),
                    )
                    .boxed()
                    .shared();
                    state.slots.insert(
                        index,
                        Slot::Pending {
                            ticket,
                            future: future.clone(),
                        },
                    );
                    debug!(chunk = index, with_header, "Starting synthesis");
                    (ticket, future)
                }
            }
        };

        let result = future.await;
        self.settle(index, ticket, result).await
    }

    async fn settle(
        &self,
        index: usize,
        ticket: u64,
        result: Result<AudioHandle, AudioError>,
    ) -> Result<AudioHandle, AudioError> {
        let stale = {
            let mut state = self.lock();
            let owns_slot = matches!(
                state.slots.get(&index),
                Some(Slot::Pending { ticket: pending, .. }) if *pending == ticket
            );
            match &result {
                Ok(handle) if !self.epoch.is_current(handle.epoch()) => {
                    Some(handle.path().to_path_buf())
                }
                Ok(handle) => {
                    if owns_slot {
                        state.slots.insert(index, Slot::Ready(handle.clone()));
                    }
                    None
                }
                Err(_) => {
                    if owns_slot {
                        state.slots.remove(&index);
                    }
                    None
                }
            }
        };

        if let Some(path) = stale {
            debug!(chunk = index, "Discarding narration finished after release");
            remove_spool_file(&path);
            return Err(AudioError::Stale(index));
        }
        result
    }

    /// Invalidate and free every handle. In-flight synthesis finishes as
    /// [`AudioError::Stale`].
    pub fn release_all(&self) -> usize {
        let paths: Vec<PathBuf> = {
            let mut state = self.lock();
            self.epoch.bump();
            state.header_chunk = None;
            state
                .slots
                .drain()
                .filter_map(|(_, slot)| match slot {
                    Slot::Ready(handle) => Some(handle.path().to_path_buf()),
                    Slot::Pending { .. } => None,
                })
                .collect()
        };
        for path in &paths {
            remove_spool_file(path);
        }
        if !paths.is_empty() {
            debug!(released = paths.len(), "Released narration cache");
        }
        paths.len()
    }
}

async fn synthesize_to_file(
    narrator: Arc<dyn Narrator>,
    request: NarrationRequest,
    path: PathBuf,
    index: usize,
    token: u64,
    epoch: Generation,
) -> Result<AudioHandle, AudioError> {
    let bytes = narrator
        .synthesize(&request)
        .await
        .map_err(|err| AudioError::SynthesisUnavailable(err.to_string()))?;
    if !epoch.is_current(token) {
        return Err(AudioError::Stale(index));
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|err| {
            AudioError::SynthesisUnavailable(format!("failed to create spool dir: {err}"))
        })?;
    }
    tokio::fs::write(&path, &bytes).await.map_err(|err| {
        AudioError::SynthesisUnavailable(format!("failed to spool narration: {err}"))
    })?;
    Ok(AudioHandle::new(index, token, path, bytes.len()))
}

fn remove_spool_file(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove spooled narration: {err}");
        }
    }
}
