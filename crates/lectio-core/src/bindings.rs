//! TypeScript bindings for the snapshot types a web view consumes.

use crate::cursor::CheckpointKind;
use crate::listening::{ListeningView, PlaybackState};
use crate::passage::{ReadingPosition, SectionKind};
use crate::session::{CursorView, PassageView, ReaderSnapshot};
use std::fs;
use std::path::Path;
use ts_rs::TS;

const EXPORTED: &[&str] = &[
    "SectionKind",
    "ReadingPosition",
    "CheckpointKind",
    "CursorView",
    "PlaybackState",
    "ListeningView",
    "PassageView",
    "ReaderSnapshot",
];

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<(), String> {
    T::export_all_to(out_dir).map_err(|err| err.to_string())
}

/// Replace every `.ts` file in `out_dir` with freshly generated bindings and
/// an `index.ts` re-exporting them.
pub fn export_ts_bindings(out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir)
        .map_err(|err| format!("Failed to list {}: {err}", out_dir.display()))?
    {
        let entry = entry.map_err(|err| format!("Failed to read entry: {err}"))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove {}: {err}", path.display()))?;
        }
    }

    export_single_type::<SectionKind>(out_dir)?;
    export_single_type::<ReadingPosition>(out_dir)?;
    export_single_type::<CheckpointKind>(out_dir)?;
    export_single_type::<CursorView>(out_dir)?;
    export_single_type::<PlaybackState>(out_dir)?;
    export_single_type::<ListeningView>(out_dir)?;
    export_single_type::<PassageView>(out_dir)?;
    export_single_type::<ReaderSnapshot>(out_dir)?;

    let index_content: String = EXPORTED
        .iter()
        .map(|name| format!("export type {{ {name} }} from \"./{name}\";\n"))
        .collect();
    let index_path = out_dir.join("index.ts");
    fs::write(&index_path, index_content)
        .map_err(|err| format!("Failed to write {}: {err}", index_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exports_snapshot_types_with_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = dir.path().join("Old.ts");
        fs::write(&stale, "export type Old = never;").expect("write stale");

        export_ts_bindings(dir.path()).expect("export");

        assert!(!stale.exists());
        assert!(dir.path().join("ReaderSnapshot.ts").exists());
        let index = fs::read_to_string(dir.path().join("index.ts")).expect("index");
        for name in EXPORTED {
            assert!(index.contains(&format!("\"./{name}\"")), "{name} missing");
        }
    }
}
