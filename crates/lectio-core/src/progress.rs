//! Local and remote reading positions.
//!
//! The local store answers "where was I in this passage on this device"; the
//! server keeps a single resume record for the user. Starting a passage takes
//! the furthest of the two, and every recorded move writes both: the local
//! write happens inline, the remote one goes through an ordered worker that
//! coalesces bursts so only the newest position is sent.

use crate::api::ReadingApi;
use crate::cache;
use crate::passage::{ReadingPosition, RemotePosition, SectionKind};
use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Pick the chunk to open a passage at.
///
/// Takes the maximum of the stored indices, then clamps into `[0, total - 1]`.
/// Missing values count as 0. Never fails.
pub fn resolve_start_index(local: Option<usize>, remote: Option<usize>, total: usize) -> usize {
    let furthest = local.unwrap_or(0).max(remote.unwrap_or(0));
    furthest.min(total.saturating_sub(1))
}

/// Device-local position storage, one entry per `(section, passage)`.
pub trait LocalPositions: Send + Sync {
    fn load(&self, section: SectionKind, passage_ref: &str) -> Option<usize>;
    fn save(&self, position: &ReadingPosition) -> Result<()>;
}

/// TOML files under the cache directory.
pub struct FilePositions {
    root: PathBuf,
}

impl FilePositions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl LocalPositions for FilePositions {
    fn load(&self, section: SectionKind, passage_ref: &str) -> Option<usize> {
        cache::load_chunk_index(&self.root, section, passage_ref)
    }

    fn save(&self, position: &ReadingPosition) -> Result<()> {
        cache::save_chunk_index(&self.root, position)
    }
}

/// Process-lifetime storage for ephemeral sessions.
#[derive(Default)]
pub struct MemoryPositions {
    entries: Mutex<HashMap<(SectionKind, String), usize>>,
}

impl LocalPositions for MemoryPositions {
    fn load(&self, section: SectionKind, passage_ref: &str) -> Option<usize> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&(section, passage_ref.to_string())).copied()
    }

    fn save(&self, position: &ReadingPosition) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            (position.section, position.passage_ref.clone()),
            position.chunk_index,
        );
        Ok(())
    }
}

pub struct ProgressStore {
    local: Box<dyn LocalPositions>,
    remote: Option<RemotePosition>,
    sync: Option<UnboundedSender<ReadingPosition>>,
    worker: Option<JoinHandle<()>>,
}

impl ProgressStore {
    /// Must be called from inside a tokio runtime; the remote writer runs as a
    /// task on it.
    pub fn new(local: Box<dyn LocalPositions>, api: Arc<dyn ReadingApi>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_remote_sync(api, rx));
        Self {
            local,
            remote: None,
            sync: Some(tx),
            worker: Some(worker),
        }
    }

    /// Seed the remote mirror from the bootstrap payload.
    pub fn set_remote(&mut self, remote: Option<RemotePosition>) {
        self.remote = remote;
    }

    pub fn remote(&self) -> Option<&RemotePosition> {
        self.remote.as_ref()
    }

    /// Start index for a passage of `total` chunks. The remote record only
    /// counts when it names the same section and passage.
    pub fn start_index(&self, section: SectionKind, passage_ref: &str, total: usize) -> usize {
        let local = self.local.load(section, passage_ref);
        let remote = self
            .remote
            .as_ref()
            .filter(|remote| remote.position.matches(section, passage_ref))
            .map(|remote| remote.position.chunk_index);
        let start = resolve_start_index(local, remote, total);
        debug!(%section, passage_ref, ?local, ?remote, start, "Resolved start index");
        start
    }

    /// Persist a position locally and queue it for the server. Failures are
    /// logged and never reach the caller.
    pub fn record_position(&mut self, position: ReadingPosition) {
        if let Err(err) = self.local.save(&position) {
            warn!(
                section = %position.section,
                passage = %position.passage_ref,
                "Failed to save local position: {err:#}"
            );
        }

        self.remote = Some(RemotePosition {
            position: position.clone(),
            updated_at: Some(Utc::now()),
            verse_anchor: None,
        });

        match &self.sync {
            Some(tx) => {
                if tx.send(position).is_err() {
                    warn!("Remote position writer has stopped");
                }
            }
            None => debug!("Progress store closed; skipping remote write"),
        }
    }

    /// Flush queued remote writes and stop the writer.
    pub async fn close(&mut self) {
        self.sync.take();
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                warn!("Remote position writer panicked: {err}");
            }
        }
    }
}

async fn run_remote_sync(api: Arc<dyn ReadingApi>, mut rx: UnboundedReceiver<ReadingPosition>) {
    while let Some(mut position) = rx.recv().await {
        while let Ok(newer) = rx.try_recv() {
            position = newer;
        }
        match api.save_resume_position(&position).await {
            Ok(()) => debug!(
                section = %position.section,
                passage = %position.passage_ref,
                chunk = position.chunk_index,
                "Saved remote position"
            ),
            Err(err) => warn!(
                section = %position.section,
                passage = %position.passage_ref,
                "Failed to save remote position: {err}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeApi;
    use pretty_assertions::assert_eq;

    #[test]
    fn start_index_takes_furthest_and_clamps() {
        assert_eq!(resolve_start_index(Some(3), Some(1), 5), 3);
        assert_eq!(resolve_start_index(Some(1), Some(4), 5), 4);
        assert_eq!(resolve_start_index(Some(9), Some(0), 5), 4);
        assert_eq!(resolve_start_index(Some(3), Some(7), 10), 7);
        assert_eq!(resolve_start_index(Some(8), Some(2), 10), 8);
        assert_eq!(resolve_start_index(Some(12), None, 10), 9);
        assert_eq!(resolve_start_index(None, None, 10), 0);
        assert_eq!(resolve_start_index(Some(4), None, 1), 0);
        assert_eq!(resolve_start_index(Some(4), Some(9), 0), 0);
    }

    #[test]
    fn start_index_is_bounded_for_all_inputs() {
        for total in 1..=12 {
            for local in [None, Some(0), Some(5), Some(40)] {
                for remote in [None, Some(0), Some(3), Some(usize::MAX)] {
                    let start = resolve_start_index(local, remote, total);
                    assert!(start < total);
                    let furthest = local.unwrap_or(0).max(remote.unwrap_or(0));
                    assert!(start <= furthest);
                }
            }
        }
    }

    #[tokio::test]
    async fn remote_only_counts_for_matching_passage() {
        let api = Arc::new(FakeApi::new());
        let mut store = ProgressStore::new(Box::new(MemoryPositions::default()), api);
        store.set_remote(Some(RemotePosition {
            position: ReadingPosition::new(SectionKind::Chapter, "John 3", 6),
            updated_at: None,
            verse_anchor: None,
        }));

        assert_eq!(store.start_index(SectionKind::Chapter, "John 3", 10), 6);
        assert_eq!(store.start_index(SectionKind::Chapter, "John 4", 10), 0);
        assert_eq!(store.start_index(SectionKind::Psalm, "John 3", 10), 0);
        store.close().await;
    }

    #[tokio::test]
    async fn record_writes_local_and_remote() {
        let api = Arc::new(FakeApi::new());
        let mut store = ProgressStore::new(Box::new(MemoryPositions::default()), api.clone());

        store.record_position(ReadingPosition::new(SectionKind::Psalm, "Psalm 23", 2));
        store.close().await;

        assert_eq!(store.start_index(SectionKind::Psalm, "Psalm 23", 3), 2);
        assert_eq!(
            api.saved_positions().last(),
            Some(&ReadingPosition::new(SectionKind::Psalm, "Psalm 23", 2))
        );
        let mirror = store.remote().expect("mirror updated");
        assert!(mirror.updated_at.is_some());
    }

    #[tokio::test]
    async fn remote_failures_are_swallowed() {
        let api = Arc::new(FakeApi::new());
        api.set_fail_saves(true);
        let mut store = ProgressStore::new(Box::new(MemoryPositions::default()), api.clone());

        store.record_position(ReadingPosition::new(SectionKind::Chapter, "Mark 1", 1));
        store.close().await;

        assert!(api.saved_positions().is_empty());
        assert_eq!(store.start_index(SectionKind::Chapter, "Mark 1", 5), 1);
    }

    #[tokio::test]
    async fn burst_of_records_ends_on_latest() {
        let api = Arc::new(FakeApi::new());
        let mut store = ProgressStore::new(Box::new(MemoryPositions::default()), api.clone());

        for index in 0..20 {
            store.record_position(ReadingPosition::new(SectionKind::Chapter, "Luke 15", index));
        }
        store.close().await;

        let saved = api.saved_positions();
        assert!(!saved.is_empty());
        assert!(saved.len() <= 20);
        assert_eq!(saved.last().map(|p| p.chunk_index), Some(19));
        let indices: Vec<usize> = saved.iter().map(|p| p.chunk_index).collect();
        let mut sorted = indices.clone();
        sorted.sort_unstable();
        assert_eq!(indices, sorted, "remote writes stay in issue order");
    }

    #[test]
    fn file_positions_round_trip_through_cache_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let positions = FilePositions::new(dir.path());
        positions
            .save(&ReadingPosition::new(SectionKind::Chapter, "Ruth 1", 3))
            .expect("save");
        assert_eq!(positions.load(SectionKind::Chapter, "Ruth 1"), Some(3));
    }
}
