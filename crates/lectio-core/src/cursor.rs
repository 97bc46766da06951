//! Linear walk over a passage's chunks with checkpoint stops.
//!
//! Trigger positions are derived from `(section, total_chunks)` in exactly one
//! place, [`Checkpoints::for_section`]; both the forward gate and the
//! "next checkpoint" display hint read from it.

use crate::passage::SectionKind;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What a checkpoint asks of the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CheckpointKind {
    /// Long-form midpoint pause.
    Reflection,
    /// Final trigger at the end of the content.
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoints {
    midpoint: Option<usize>,
    last: Option<usize>,
}

impl Checkpoints {
    pub fn for_section(section: SectionKind, total_chunks: usize) -> Self {
        let last = if section.is_long_form() && total_chunks < 2 {
            None
        } else {
            total_chunks.checked_sub(1)
        };
        let midpoint = if section.is_long_form() && total_chunks >= 2 {
            Some(total_chunks / 2).filter(|mid| Some(*mid) != last)
        } else {
            None
        };
        Self { midpoint, last }
    }

    pub fn kind_at(&self, index: usize) -> Option<CheckpointKind> {
        if self.last == Some(index) {
            Some(CheckpointKind::Response)
        } else if self.midpoint == Some(index) {
            Some(CheckpointKind::Reflection)
        } else {
            None
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.kind_at(index).is_some()
    }

    /// Trigger indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.midpoint.into_iter().chain(self.last).collect()
    }

    /// First trigger strictly after `index`.
    pub fn next_after(&self, index: usize) -> Option<usize> {
        self.indices().into_iter().find(|trigger| *trigger > index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Reading(usize),
    AtCheckpoint(usize),
    Complete,
}

#[derive(Debug, Clone)]
pub struct PassageCursor {
    section: SectionKind,
    total_chunks: usize,
    checkpoints: Checkpoints,
    state: CursorState,
}

impl PassageCursor {
    pub fn new(section: SectionKind, total_chunks: usize) -> Self {
        Self::resume(section, total_chunks, 0)
    }

    /// Restore a cursor at `start`. A resume index sitting on a trigger means
    /// the prompt was reached but never answered, so it reopens.
    pub fn resume(section: SectionKind, total_chunks: usize, start: usize) -> Self {
        let checkpoints = Checkpoints::for_section(section, total_chunks);
        let state = if total_chunks == 0 {
            CursorState::Complete
        } else {
            let start = start.min(total_chunks - 1);
            if start > 0 && checkpoints.contains(start) {
                CursorState::AtCheckpoint(start)
            } else {
                CursorState::Reading(start)
            }
        };
        Self {
            section,
            total_chunks,
            checkpoints,
            state,
        }
    }

    pub fn section(&self) -> SectionKind {
        self.section
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Chunk to show and persist. `Complete` maps to the last chunk.
    pub fn position_index(&self) -> usize {
        match self.state {
            CursorState::Reading(index) | CursorState::AtCheckpoint(index) => index,
            CursorState::Complete => self.total_chunks.saturating_sub(1),
        }
    }

    pub fn checkpoint_kind(&self) -> Option<CheckpointKind> {
        match self.state {
            CursorState::AtCheckpoint(index) => self.checkpoints.kind_at(index),
            _ => None,
        }
    }

    /// Display hint for the pager.
    pub fn next_checkpoint(&self) -> Option<usize> {
        match self.state {
            CursorState::Reading(index) | CursorState::AtCheckpoint(index) => {
                self.checkpoints.next_after(index)
            }
            CursorState::Complete => None,
        }
    }

    /// Move forward one chunk. Blocked while a checkpoint is open.
    pub fn advance(&mut self) -> CursorState {
        if let CursorState::Reading(index) = self.state {
            self.state = self.step_forward(index);
        }
        self.state
    }

    /// Move back one chunk. Checkpoints never block backward motion.
    pub fn retreat(&mut self) -> CursorState {
        self.state = match self.state {
            CursorState::Reading(index) | CursorState::AtCheckpoint(index) => {
                CursorState::Reading(index.saturating_sub(1))
            }
            CursorState::Complete => CursorState::Reading(self.total_chunks.saturating_sub(1)),
        };
        self.state
    }

    pub fn resolve_checkpoint(&mut self) -> CursorState {
        if let CursorState::AtCheckpoint(index) = self.state {
            self.state = if index + 1 >= self.total_chunks {
                CursorState::Complete
            } else {
                CursorState::Reading(index + 1)
            };
        }
        self.state
    }

    /// Open the prompt of the trigger chunk the reader is sitting on.
    pub fn enter_checkpoint(&mut self) -> CursorState {
        if let CursorState::Reading(index) = self.state {
            if self.checkpoints.contains(index) {
                self.state = CursorState::AtCheckpoint(index);
            }
        }
        self.state
    }

    /// Finish from the last chunk without answering its prompt.
    pub fn finish(&mut self) -> CursorState {
        let last = self.total_chunks.saturating_sub(1);
        match self.state {
            CursorState::Reading(index) | CursorState::AtCheckpoint(index) if index == last => {
                self.state = CursorState::Complete;
            }
            _ => {}
        }
        self.state
    }

    fn step_forward(&self, index: usize) -> CursorState {
        let next = index + 1;
        if next >= self.total_chunks {
            CursorState::Complete
        } else if self.checkpoints.contains(next) {
            CursorState::AtCheckpoint(next)
        } else {
            CursorState::Reading(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    const SECTIONS: [SectionKind; 2] = [SectionKind::Chapter, SectionKind::Psalm];

    /// Drive the cursor forward, answering checkpoints, and return the number
    /// of forward steps plus the indices visited on the way.
    fn walk_to_completion(cursor: &mut PassageCursor) -> (usize, Vec<usize>) {
        let mut steps = 0;
        let mut visited = vec![cursor.position_index()];
        loop {
            let next = match cursor.state() {
                CursorState::Reading(_) => cursor.advance(),
                CursorState::AtCheckpoint(_) => cursor.resolve_checkpoint(),
                CursorState::Complete => break,
            };
            steps += 1;
            match next {
                CursorState::Reading(index) | CursorState::AtCheckpoint(index) => {
                    visited.push(index)
                }
                CursorState::Complete => {}
            }
            assert!(steps <= 100, "cursor failed to terminate");
        }
        (steps, visited)
    }

    #[test]
    fn long_form_triggers_at_midpoint_and_end() {
        let checkpoints = Checkpoints::for_section(SectionKind::Chapter, 5);
        assert_eq!(checkpoints.indices(), vec![2, 4]);
        assert_eq!(checkpoints.kind_at(2), Some(CheckpointKind::Reflection));
        assert_eq!(checkpoints.kind_at(4), Some(CheckpointKind::Response));
    }

    #[test]
    fn short_form_triggers_only_at_end() {
        let checkpoints = Checkpoints::for_section(SectionKind::Psalm, 3);
        assert_eq!(checkpoints.indices(), vec![2]);
    }

    #[test]
    fn two_chunk_long_form_collapses_to_single_trigger() {
        let checkpoints = Checkpoints::for_section(SectionKind::Chapter, 2);
        assert_eq!(checkpoints.indices(), vec![1]);
        assert_eq!(checkpoints.kind_at(1), Some(CheckpointKind::Response));
    }

    #[test]
    fn advance_stops_at_checkpoints_then_completes() {
        let mut cursor = PassageCursor::new(SectionKind::Chapter, 5);
        assert_eq!(cursor.advance(), CursorState::Reading(1));
        assert_eq!(cursor.advance(), CursorState::AtCheckpoint(2));
        assert_eq!(cursor.advance(), CursorState::AtCheckpoint(2), "gate holds");
        assert_eq!(cursor.resolve_checkpoint(), CursorState::Reading(3));
        assert_eq!(cursor.advance(), CursorState::AtCheckpoint(4));
        assert_eq!(cursor.resolve_checkpoint(), CursorState::Complete);
        assert_eq!(cursor.advance(), CursorState::Complete);
    }

    #[test]
    fn single_chunk_passages_complete_on_first_advance() {
        for section in SECTIONS {
            let mut cursor = PassageCursor::new(section, 1);
            assert_eq!(cursor.advance(), CursorState::Complete, "{section}");
        }
    }

    #[test]
    fn forward_walk_takes_exactly_total_chunks_steps() {
        for section in SECTIONS {
            for total in 1..=50 {
                let mut cursor = PassageCursor::new(section, total);
                let (steps, visited) = walk_to_completion(&mut cursor);
                assert_eq!(steps, total, "{section} total={total}");
                let unique: HashSet<usize> = visited.iter().copied().collect();
                assert_eq!(unique.len(), visited.len(), "{section} total={total} revisited");
            }
        }
    }

    #[test]
    fn forward_walk_from_any_start_never_revisits() {
        for section in SECTIONS {
            for total in 1..=50 {
                for start in 0..total {
                    let mut cursor = PassageCursor::resume(section, total, start);
                    let (steps, visited) = walk_to_completion(&mut cursor);
                    assert_eq!(steps, total - start, "{section} total={total} start={start}");
                    let unique: HashSet<usize> = visited.iter().copied().collect();
                    assert_eq!(unique.len(), visited.len());
                }
            }
        }
    }

    #[test]
    fn retreat_never_lands_on_a_checkpoint() {
        for section in SECTIONS {
            for total in 1..=20 {
                for start in 1..total {
                    let mut cursor = PassageCursor::resume(section, total, start);
                    let state = cursor.retreat();
                    assert_eq!(state, CursorState::Reading(start - 1));
                }
            }
        }
    }

    #[test]
    fn retreat_from_first_chunk_stays_put_and_from_complete_shows_last() {
        let mut cursor = PassageCursor::new(SectionKind::Psalm, 3);
        assert_eq!(cursor.retreat(), CursorState::Reading(0));

        let mut finished = PassageCursor::resume(SectionKind::Psalm, 3, 2);
        finished.resolve_checkpoint();
        assert_eq!(finished.state(), CursorState::Complete);
        assert_eq!(finished.retreat(), CursorState::Reading(2));
    }

    #[test]
    fn resume_on_trigger_reopens_the_prompt() {
        let cursor = PassageCursor::resume(SectionKind::Chapter, 5, 2);
        assert_eq!(cursor.state(), CursorState::AtCheckpoint(2));
        assert_eq!(cursor.checkpoint_kind(), Some(CheckpointKind::Reflection));

        let clamped = PassageCursor::resume(SectionKind::Chapter, 5, 9);
        assert_eq!(clamped.state(), CursorState::AtCheckpoint(4));
    }

    #[test]
    fn enter_checkpoint_only_works_on_trigger_chunks() {
        let mut cursor = PassageCursor::resume(SectionKind::Chapter, 5, 3);
        assert_eq!(cursor.retreat(), CursorState::Reading(2));
        assert_eq!(cursor.enter_checkpoint(), CursorState::AtCheckpoint(2));

        let mut off_trigger = PassageCursor::resume(SectionKind::Chapter, 5, 1);
        assert_eq!(off_trigger.enter_checkpoint(), CursorState::Reading(1));
    }

    #[test]
    fn next_checkpoint_hint_follows_trigger_set() {
        let mut cursor = PassageCursor::new(SectionKind::Chapter, 5);
        assert_eq!(cursor.next_checkpoint(), Some(2));
        cursor.advance();
        cursor.advance();
        assert_eq!(cursor.next_checkpoint(), Some(4));
        cursor.resolve_checkpoint();
        cursor.advance();
        assert_eq!(cursor.next_checkpoint(), None);
    }

    #[test]
    fn finish_requires_last_chunk() {
        let mut early = PassageCursor::new(SectionKind::Psalm, 3);
        assert_eq!(early.finish(), CursorState::Reading(0));

        let mut last = PassageCursor::resume(SectionKind::Psalm, 3, 2);
        assert_eq!(last.finish(), CursorState::Complete);
    }
}
