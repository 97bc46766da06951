//! Passage and position data model shared by every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use ts_rs::TS;

/// Which daily section a passage belongs to. `Chapter` is the long-form
/// section (midpoint and final checkpoints), `Psalm` the short-form one (final
/// checkpoint only).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SectionKind {
    Chapter,
    Psalm,
}

impl SectionKind {
    pub fn is_long_form(self) -> bool {
        matches!(self, SectionKind::Chapter)
    }

    pub fn as_key(self) -> &'static str {
        match self {
            SectionKind::Chapter => "chapter",
            SectionKind::Psalm => "psalm",
        }
    }

    /// Label read aloud at the start of a listening session.
    pub fn spoken_label(self) -> &'static str {
        match self {
            SectionKind::Chapter => "Today's chapter",
            SectionKind::Psalm => "Today's psalm",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_key())
    }
}

impl std::str::FromStr for SectionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chapter" => Ok(SectionKind::Chapter),
            "psalm" => Ok(SectionKind::Psalm),
            other => Err(format!("unknown section '{other}'")),
        }
    }
}

/// One reading unit: a contiguous slice of verses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: usize,
    #[serde(default)]
    pub verses: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub reference: String,
    pub translation: String,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PassageError {
    #[error("passage {reference} has no chunks")]
    Empty { reference: String },
    #[error("passage {reference} is missing chunk {expected} (found {found})")]
    Gap {
        reference: String,
        expected: usize,
        found: usize,
    },
}

impl Passage {
    /// Sort chunks by index and check that the indices form `[0, N)` with
    /// `N > 0`.
    pub fn validated(mut self) -> Result<Self, PassageError> {
        if self.chunks.is_empty() {
            return Err(PassageError::Empty {
                reference: self.reference,
            });
        }
        self.chunks.sort_by_key(|chunk| chunk.index);
        for (expected, chunk) in self.chunks.iter().enumerate() {
            if chunk.index != expected {
                return Err(PassageError::Gap {
                    reference: self.reference.clone(),
                    expected,
                    found: chunk.index,
                });
            }
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }
}

/// Where the reader is within one passage of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReadingPosition {
    pub section: SectionKind,
    pub passage_ref: String,
    pub chunk_index: usize,
}

impl ReadingPosition {
    pub fn new(section: SectionKind, passage_ref: impl Into<String>, chunk_index: usize) -> Self {
        Self {
            section,
            passage_ref: passage_ref.into(),
            chunk_index,
        }
    }

    pub fn matches(&self, section: SectionKind, passage_ref: &str) -> bool {
        self.section == section && self.passage_ref == passage_ref
    }
}

/// The server's single resume record for the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePosition {
    #[serde(flatten)]
    pub position: ReadingPosition,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verse_anchor: Option<String>,
}

/// Narration settings. Owned by the settings collaborator; the core only
/// reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningPreferences {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_speed")]
    pub speed: f32,
}

impl Default for ListeningPreferences {
    fn default() -> Self {
        Self {
            enabled: false,
            voice: default_voice(),
            style: default_style(),
            speed: default_speed(),
        }
    }
}

fn default_voice() -> String {
    "default".to_string()
}

fn default_style() -> String {
    "calm".to_string()
}

fn default_speed() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayReading {
    pub section: SectionKind,
    pub reference: String,
    #[serde(default)]
    pub translation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bootstrap {
    #[serde(default)]
    pub resume_position: Option<RemotePosition>,
    #[serde(default)]
    pub listening_preferences: ListeningPreferences,
    #[serde(default)]
    pub today_references: Vec<TodayReading>,
    #[serde(default)]
    pub section_totals: HashMap<SectionKind, usize>,
}

impl Bootstrap {
    pub fn today_for(&self, section: SectionKind) -> Option<&TodayReading> {
        self.today_references
            .iter()
            .find(|reading| reading.section == section)
    }
}
