//! On-disk layout for per-passage state.
//!
//! Each `(section, passage)` pair gets a directory named after a hash of its
//! key so references with spaces and colons never reach the filesystem. The
//! reading position is a tiny TOML file inside it; spooled narration lives in
//! a shared `audio/` directory next to them.

use crate::passage::{ReadingPosition, SectionKind};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

pub const POSITION_FILE: &str = "position.toml";
pub const AUDIO_DIR: &str = "audio";

#[derive(serde::Serialize, serde::Deserialize)]
struct PositionEntry {
    section: SectionKind,
    passage_ref: String,
    chunk_index: usize,
}

pub fn hash_dir(root: &Path, section: SectionKind, passage_ref: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(section.as_key().as_bytes());
    hasher.update(b"|");
    hasher.update(passage_ref.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    root.join(hash)
}

fn position_path(root: &Path, section: SectionKind, passage_ref: &str) -> PathBuf {
    hash_dir(root, section, passage_ref).join(POSITION_FILE)
}

pub fn audio_dir(root: &Path) -> PathBuf {
    root.join(AUDIO_DIR)
}

/// Load the stored chunk index for a passage. Missing, unreadable, or
/// mismatched files read as "nothing stored".
pub fn load_chunk_index(root: &Path, section: SectionKind, passage_ref: &str) -> Option<usize> {
    let path = position_path(root, section, passage_ref);
    let data = fs::read_to_string(path).ok()?;
    let entry: PositionEntry = toml::from_str(&data).ok()?;
    (entry.section == section && entry.passage_ref == passage_ref).then_some(entry.chunk_index)
}

pub fn save_chunk_index(root: &Path, position: &ReadingPosition) -> Result<()> {
    let path = position_path(root, position.section, &position.passage_ref);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let entry = PositionEntry {
        section: position.section,
        passage_ref: position.passage_ref.clone(),
        chunk_index: position.chunk_index,
    };
    let contents = toml::to_string(&entry).context("failed to serialize position")?;
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
