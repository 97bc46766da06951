//! Plain-text rendering of reader snapshots.

use lectio_core::cursor::CheckpointKind;
use lectio_core::listening::{ListeningView, PlaybackState};
use lectio_core::session::{CursorView, PassageView, ReaderSnapshot};
use std::fmt::Write;

pub fn render(snapshot: &ReaderSnapshot) -> String {
    let mut out = String::new();
    if let Some(error) = &snapshot.load_error {
        let _ = writeln!(out, "! {error}");
        let _ = writeln!(out, "  (retry with `today <section>` or `open ...`)");
    }
    if let Some(passage) = &snapshot.passage {
        render_passage(&mut out, passage);
    }
    if let Some(line) = listening_line(&snapshot.listening) {
        let _ = writeln!(out, "{line}");
    }
    if let Some(notice) = &snapshot.notice {
        let _ = writeln!(out, "* {notice}");
    }
    out
}

fn render_passage(out: &mut String, passage: &PassageView) {
    let _ = writeln!(
        out,
        "== {} ({}) [{}/{}] ==",
        passage.reference,
        passage.translation,
        passage.chunk_index + 1,
        passage.total_chunks
    );
    if let (Some(first), Some(last)) = (passage.verses.first(), passage.verses.last()) {
        if first == last {
            let _ = writeln!(out, "{first}");
        } else {
            let _ = writeln!(out, "{first} to {last}");
        }
    }
    let _ = writeln!(out, "{}", passage.chunk_text);
    match (passage.cursor, passage.checkpoint_kind) {
        (CursorView::AtCheckpoint, Some(CheckpointKind::Reflection)) => {
            let _ = writeln!(out, "-- Pause and reflect. Answer with `r <thoughts>` or just `r`.");
        }
        (CursorView::AtCheckpoint, _) => {
            let _ = writeln!(out, "-- How will you respond? Answer with `r <response>` or just `r`.");
        }
        (CursorView::Complete, _) => {
            let _ = writeln!(out, "-- Section complete.");
        }
        (CursorView::Reading, _) => {
            if let Some(next) = passage.next_checkpoint {
                let _ = writeln!(out, "   (next pause at {}/{})", next + 1, passage.total_chunks);
            }
        }
    }
}

fn listening_line(view: &ListeningView) -> Option<String> {
    if !view.active {
        return None;
    }
    let chunk = view
        .chunk_index
        .map(|index| format!(" chunk {}", index + 1))
        .unwrap_or_default();
    let state = match view.state {
        PlaybackState::Idle => "idle",
        PlaybackState::Synthesizing => "preparing",
        PlaybackState::Starting => "starting",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
    };
    let tap = if view.needs_tap {
        " (press `t` to start audio)"
    } else {
        ""
    };
    Some(format!("~ listening: {state}{chunk}{tap}"))
}
